//! # Relationship Error Types
//!
//! Errors raised while building relationship descriptors and planning or
//! applying relationship mutations.
//!
//! None of these are retryable: they describe a descriptor the backend can
//! never satisfy (a polymorphic edge), or a write that found nothing to
//! attach to. Inside a managed transaction they abort the attempt and roll
//! back every mutation already applied.

use thiserror::Error;

use super::descriptor::StorageMode;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum RelationshipError {
    /// Permanent limitation, not a defect: an edge cannot encode a dynamic
    /// target type without losing type-based traversal.
    #[error("Polymorphic relationship `{relationship}` cannot use `{requested}` storage (polymorphic relationships are stored as foreign keys only)")]
    PolymorphicEdgeUnsupported {
        relationship: String,
        requested: StorageMode,
    },
    #[error("Relationship `{relationship}`: no {side} node with key {key}")]
    EndpointNotFound {
        relationship: String,
        side: String,
        key: String,
    },
    #[error("Relationship `{relationship}`: property `{property}` is not part of the edge property schema")]
    EdgePropertyNotInSchema {
        relationship: String,
        property: String,
    },
    #[error("Relationship `{relationship}`: property `{property}` must be a primitive or a homogeneous list of primitives")]
    NonScalarEdgeProperty {
        relationship: String,
        property: String,
    },
    #[error("Relationship `{relationship}` ({kind}) does not carry edge properties")]
    EdgePropertiesUnsupported { relationship: String, kind: String },
    #[error("Invalid relationship descriptor `{relationship}`: {message}")]
    InvalidDescriptor {
        relationship: String,
        message: String,
    },
    #[error("Write on relationship `{relationship}` rejected by observer: {reason}")]
    RejectedByObserver {
        relationship: String,
        reason: String,
    },
}

impl RelationshipError {
    pub fn invalid_descriptor(relationship: impl Into<String>, message: impl Into<String>) -> Self {
        RelationshipError::InvalidDescriptor {
            relationship: relationship.into(),
            message: message.into(),
        }
    }

    pub fn endpoint_not_found(
        relationship: impl Into<String>,
        side: impl Into<String>,
        key: &serde_json::Value,
    ) -> Self {
        RelationshipError::EndpointNotFound {
            relationship: relationship.into(),
            side: side.into(),
            key: key.to_string(),
        }
    }
}

/// Unrecognised spelling of a configuration enum
#[derive(Debug, Clone, Error, PartialEq)]
#[error("Invalid value '{value}' for {field}")]
pub struct ParseEnumError {
    pub field: String,
    pub value: String,
}

impl ParseEnumError {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        ParseEnumError {
            field: field.into(),
            value: value.into(),
        }
    }
}
