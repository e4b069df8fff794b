/// Relationship descriptors
///
/// A descriptor fixes, at construction time, how one relationship between two
/// labels is represented in the graph:
///
/// - `foreign_key`: the child node holds the parent's key as a property
///   (many-to-many uses a pivot node, the join-table analogue)
/// - `native_edge`: a typed, directed edge between parent and child
/// - `hybrid`: both, written in the same transaction
///
/// The storage mode is an explicit field chosen when the descriptor is
/// built. Polymorphic relationships always resolve to `foreign_key`; asking
/// for an edge-based mode on one fails immediately.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::edge_naming::{snake_case, EdgeNamingConvention};
use super::errors::{ParseEnumError, RelationshipError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageMode {
    #[default]
    #[serde(alias = "fk")]
    ForeignKey,
    #[serde(alias = "edge")]
    NativeEdge,
    Hybrid,
}

impl StorageMode {
    pub fn uses_edges(self) -> bool {
        matches!(self, StorageMode::NativeEdge | StorageMode::Hybrid)
    }

    pub fn uses_foreign_key(self) -> bool {
        matches!(self, StorageMode::ForeignKey | StorageMode::Hybrid)
    }
}

impl fmt::Display for StorageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageMode::ForeignKey => f.write_str("foreign_key"),
            StorageMode::NativeEdge => f.write_str("native_edge"),
            StorageMode::Hybrid => f.write_str("hybrid"),
        }
    }
}

impl FromStr for StorageMode {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "foreign_key" | "fk" => Ok(StorageMode::ForeignKey),
            "native_edge" | "edge" => Ok(StorageMode::NativeEdge),
            "hybrid" => Ok(StorageMode::Hybrid),
            _ => Err(ParseEnumError::new("default_relationship_storage", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipKind {
    OneToMany,
    /// Declared on the child; the child holds the parent's key
    ManyToOne,
    ManyToMany,
    MorphOne,
    MorphMany,
}

impl RelationshipKind {
    pub fn is_polymorphic(self) -> bool {
        matches!(self, RelationshipKind::MorphOne | RelationshipKind::MorphMany)
    }

    /// A child can only belong to one parent through this relationship
    pub fn is_single_parent(self) -> bool {
        !matches!(self, RelationshipKind::ManyToMany)
    }

    /// Loading from the declaring side yields at most one related node
    pub fn is_single_valued(self) -> bool {
        matches!(self, RelationshipKind::ManyToOne | RelationshipKind::MorphOne)
    }

    /// The declaring model is the child (it holds the key)
    pub fn declared_on_child(self) -> bool {
        matches!(self, RelationshipKind::ManyToOne)
    }
}

impl fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RelationshipKind::OneToMany => "one_to_many",
            RelationshipKind::ManyToOne => "many_to_one",
            RelationshipKind::ManyToMany => "many_to_many",
            RelationshipKind::MorphOne => "morph_one",
            RelationshipKind::MorphMany => "morph_many",
        };
        f.write_str(name)
    }
}

/// Edge orientation relative to the parent node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EdgeDirection {
    /// `(parent)-[:TYPE]->(child)`
    #[default]
    ParentToChild,
    /// `(parent)<-[:TYPE]-(child)`
    ChildToParent,
}

/// Process-wide defaults applied when a descriptor does not choose explicitly
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationshipDefaults {
    pub storage: StorageMode,
    pub naming: EdgeNamingConvention,
    pub auto_create_edges: bool,
}

impl Default for RelationshipDefaults {
    fn default() -> Self {
        RelationshipDefaults {
            storage: StorageMode::ForeignKey,
            naming: EdgeNamingConvention::UpperSnake,
            auto_create_edges: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipDescriptor {
    name: String,
    kind: RelationshipKind,
    storage: StorageMode,
    edge_type: String,
    direction: EdgeDirection,
    parent_label: String,
    child_label: String,
    parent_key: String,
    child_key: String,
    foreign_key: String,
    related_key: Option<String>,
    pivot_label: Option<String>,
    morph_type_key: Option<String>,
    morph_type_value: Option<String>,
    edge_properties: Vec<String>,
    allow_duplicate_edges: bool,
}

impl RelationshipDescriptor {
    pub fn one_to_many(
        name: impl Into<String>,
        parent_label: impl Into<String>,
        child_label: impl Into<String>,
    ) -> RelationshipBuilder {
        RelationshipBuilder::new(name, RelationshipKind::OneToMany, parent_label, child_label)
    }

    /// `name` is declared on the child, e.g. `Post.author` with parent `User`
    pub fn many_to_one(
        name: impl Into<String>,
        parent_label: impl Into<String>,
        child_label: impl Into<String>,
    ) -> RelationshipBuilder {
        RelationshipBuilder::new(name, RelationshipKind::ManyToOne, parent_label, child_label)
    }

    pub fn many_to_many(
        name: impl Into<String>,
        parent_label: impl Into<String>,
        child_label: impl Into<String>,
    ) -> RelationshipBuilder {
        RelationshipBuilder::new(name, RelationshipKind::ManyToMany, parent_label, child_label)
    }

    /// `morph_name` prefixes the discriminator columns (`<morph>_id`, `<morph>_type`)
    pub fn morph_one(
        name: impl Into<String>,
        parent_label: impl Into<String>,
        child_label: impl Into<String>,
        morph_name: impl Into<String>,
    ) -> RelationshipBuilder {
        RelationshipBuilder::new(name, RelationshipKind::MorphOne, parent_label, child_label)
            .morph_name(morph_name)
    }

    pub fn morph_many(
        name: impl Into<String>,
        parent_label: impl Into<String>,
        child_label: impl Into<String>,
        morph_name: impl Into<String>,
    ) -> RelationshipBuilder {
        RelationshipBuilder::new(name, RelationshipKind::MorphMany, parent_label, child_label)
            .morph_name(morph_name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> RelationshipKind {
        self.kind
    }

    pub fn storage(&self) -> StorageMode {
        self.storage
    }

    pub fn edge_type(&self) -> &str {
        &self.edge_type
    }

    pub fn direction(&self) -> EdgeDirection {
        self.direction
    }

    pub fn parent_label(&self) -> &str {
        &self.parent_label
    }

    pub fn child_label(&self) -> &str {
        &self.child_label
    }

    pub fn parent_key(&self) -> &str {
        &self.parent_key
    }

    pub fn child_key(&self) -> &str {
        &self.child_key
    }

    /// Child property holding the parent key (pivot property for many-to-many)
    pub fn foreign_key(&self) -> &str {
        &self.foreign_key
    }

    /// Pivot property holding the child key (many-to-many only)
    pub fn related_key(&self) -> Option<&str> {
        self.related_key.as_deref()
    }

    pub fn pivot_label(&self) -> Option<&str> {
        self.pivot_label.as_deref()
    }

    pub fn morph_type_key(&self) -> Option<&str> {
        self.morph_type_key.as_deref()
    }

    pub fn morph_type_value(&self) -> Option<&str> {
        self.morph_type_value.as_deref()
    }

    pub fn edge_properties(&self) -> &[String] {
        &self.edge_properties
    }

    pub fn allow_duplicate_edges(&self) -> bool {
        self.allow_duplicate_edges
    }
}

#[derive(Debug, Clone)]
pub struct RelationshipBuilder {
    name: String,
    kind: RelationshipKind,
    parent_label: String,
    child_label: String,
    storage: Option<StorageMode>,
    edge_type: Option<String>,
    direction: EdgeDirection,
    parent_key: String,
    child_key: String,
    foreign_key: Option<String>,
    related_key: Option<String>,
    pivot_label: Option<String>,
    morph_name: Option<String>,
    morph_type_value: Option<String>,
    edge_properties: Vec<String>,
    allow_duplicate_edges: bool,
}

impl RelationshipBuilder {
    fn new(
        name: impl Into<String>,
        kind: RelationshipKind,
        parent_label: impl Into<String>,
        child_label: impl Into<String>,
    ) -> Self {
        RelationshipBuilder {
            name: name.into(),
            kind,
            parent_label: parent_label.into(),
            child_label: child_label.into(),
            storage: None,
            edge_type: None,
            direction: EdgeDirection::ParentToChild,
            parent_key: "id".to_string(),
            child_key: "id".to_string(),
            foreign_key: None,
            related_key: None,
            pivot_label: None,
            morph_name: None,
            morph_type_value: None,
            edge_properties: Vec::new(),
            allow_duplicate_edges: false,
        }
    }

    pub fn storage(mut self, mode: StorageMode) -> Self {
        self.storage = Some(mode);
        self
    }

    /// Explicit edge type; takes precedence over the naming convention
    pub fn edge_type(mut self, edge_type: impl Into<String>) -> Self {
        self.edge_type = Some(edge_type.into());
        self
    }

    pub fn direction(mut self, direction: EdgeDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn parent_key(mut self, key: impl Into<String>) -> Self {
        self.parent_key = key.into();
        self
    }

    pub fn child_key(mut self, key: impl Into<String>) -> Self {
        self.child_key = key.into();
        self
    }

    pub fn foreign_key(mut self, column: impl Into<String>) -> Self {
        self.foreign_key = Some(column.into());
        self
    }

    pub fn related_key(mut self, column: impl Into<String>) -> Self {
        self.related_key = Some(column.into());
        self
    }

    pub fn pivot_label(mut self, label: impl Into<String>) -> Self {
        self.pivot_label = Some(label.into());
        self
    }

    fn morph_name(mut self, morph_name: impl Into<String>) -> Self {
        self.morph_name = Some(morph_name.into());
        self
    }

    /// Discriminator stored in `<morph>_type`; defaults to the parent label
    pub fn morph_type_value(mut self, value: impl Into<String>) -> Self {
        self.morph_type_value = Some(value.into());
        self
    }

    pub fn edge_properties<I, S>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.edge_properties = properties.into_iter().map(Into::into).collect();
        self
    }

    /// Many-to-many only: CREATE a new edge per attach instead of MERGE
    pub fn allow_duplicate_edges(mut self, allow: bool) -> Self {
        self.allow_duplicate_edges = allow;
        self
    }

    pub fn build(self, defaults: &RelationshipDefaults) -> Result<RelationshipDescriptor, RelationshipError> {
        if self.name.trim().is_empty() {
            return Err(RelationshipError::invalid_descriptor(
                &self.name,
                "relationship name is empty",
            ));
        }
        if self.parent_label.is_empty() || self.child_label.is_empty() {
            return Err(RelationshipError::invalid_descriptor(
                &self.name,
                "parent and child labels are required",
            ));
        }

        let storage = match (self.storage, self.kind.is_polymorphic()) {
            (Some(StorageMode::ForeignKey), _) => StorageMode::ForeignKey,
            (Some(requested), true) => {
                return Err(RelationshipError::PolymorphicEdgeUnsupported {
                    relationship: self.name,
                    requested,
                })
            }
            // Polymorphic ignores the configured default
            (None, true) => StorageMode::ForeignKey,
            (Some(requested), false) => requested,
            (None, false) => defaults.storage,
        };

        let edge_type = match self.edge_type {
            Some(explicit) => explicit,
            None => defaults.naming.apply(&self.name),
        };
        if edge_type.is_empty() {
            return Err(RelationshipError::invalid_descriptor(
                &self.name,
                "edge type resolves to an empty name",
            ));
        }

        if !self.edge_properties.is_empty()
            && self.kind != RelationshipKind::ManyToMany
            && !storage.uses_edges()
        {
            return Err(RelationshipError::EdgePropertiesUnsupported {
                relationship: self.name,
                kind: self.kind.to_string(),
            });
        }

        let parent_fk = format!("{}_{}", snake_case(&self.parent_label), self.parent_key);
        let (foreign_key, related_key, pivot_label, morph_type_key, morph_type_value) =
            match self.kind {
                RelationshipKind::OneToMany | RelationshipKind::ManyToOne => (
                    self.foreign_key.unwrap_or(parent_fk),
                    None,
                    None,
                    None,
                    None,
                ),
                RelationshipKind::ManyToMany => {
                    let related = self.related_key.unwrap_or_else(|| {
                        format!("{}_{}", snake_case(&self.child_label), self.child_key)
                    });
                    let pivot = self.pivot_label.unwrap_or_else(|| {
                        let mut labels = [self.parent_label.clone(), self.child_label.clone()];
                        labels.sort();
                        labels.concat()
                    });
                    (
                        self.foreign_key.unwrap_or(parent_fk),
                        Some(related),
                        Some(pivot),
                        None,
                        None,
                    )
                }
                RelationshipKind::MorphOne | RelationshipKind::MorphMany => {
                    let morph = self.morph_name.ok_or_else(|| {
                        RelationshipError::invalid_descriptor(
                            &self.name,
                            "polymorphic relationships need a morph name",
                        )
                    })?;
                    (
                        self.foreign_key.unwrap_or_else(|| format!("{}_id", morph)),
                        None,
                        None,
                        Some(format!("{}_type", morph)),
                        Some(
                            self.morph_type_value
                                .unwrap_or_else(|| self.parent_label.clone()),
                        ),
                    )
                }
            };

        Ok(RelationshipDescriptor {
            name: self.name,
            kind: self.kind,
            storage,
            edge_type,
            direction: self.direction,
            parent_label: self.parent_label,
            child_label: self.child_label,
            parent_key: self.parent_key,
            child_key: self.child_key,
            foreign_key,
            related_key,
            pivot_label,
            morph_type_key,
            morph_type_value,
            edge_properties: self.edge_properties,
            allow_duplicate_edges: self.allow_duplicate_edges,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults(storage: StorageMode) -> RelationshipDefaults {
        RelationshipDefaults {
            storage,
            ..RelationshipDefaults::default()
        }
    }

    #[test]
    fn test_default_storage_and_naming() {
        let rel = RelationshipDescriptor::one_to_many("authoredPosts", "User", "Post")
            .build(&defaults(StorageMode::Hybrid))
            .unwrap();
        assert_eq!(rel.storage(), StorageMode::Hybrid);
        assert_eq!(rel.edge_type(), "AUTHORED_POSTS");
        assert_eq!(rel.foreign_key(), "user_id");
    }

    #[test]
    fn test_explicit_edge_type_overrides_convention() {
        let rel = RelationshipDescriptor::one_to_many("posts", "User", "Post")
            .edge_type("WROTE")
            .build(&RelationshipDefaults {
                naming: EdgeNamingConvention::Camel,
                ..RelationshipDefaults::default()
            })
            .unwrap();
        assert_eq!(rel.edge_type(), "WROTE");
    }

    #[test]
    fn test_polymorphic_ignores_edge_default() {
        let rel = RelationshipDescriptor::morph_many("comments", "Post", "Comment", "commentable")
            .build(&defaults(StorageMode::NativeEdge))
            .unwrap();
        assert_eq!(rel.storage(), StorageMode::ForeignKey);
        assert_eq!(rel.foreign_key(), "commentable_id");
        assert_eq!(rel.morph_type_key(), Some("commentable_type"));
        assert_eq!(rel.morph_type_value(), Some("Post"));
    }

    #[test]
    fn test_polymorphic_edge_request_fails_fast() {
        for requested in [StorageMode::NativeEdge, StorageMode::Hybrid] {
            let err = RelationshipDescriptor::morph_one("image", "User", "Image", "imageable")
                .storage(requested)
                .build(&RelationshipDefaults::default())
                .unwrap_err();
            assert_eq!(
                err,
                RelationshipError::PolymorphicEdgeUnsupported {
                    relationship: "image".to_string(),
                    requested,
                }
            );
        }
    }

    #[test]
    fn test_many_to_many_pivot_defaults() {
        let rel = RelationshipDescriptor::many_to_many("tags", "Post", "Tag")
            .edge_properties(["tagged_at"])
            .build(&RelationshipDefaults::default())
            .unwrap();
        assert_eq!(rel.pivot_label(), Some("PostTag"));
        assert_eq!(rel.foreign_key(), "post_id");
        assert_eq!(rel.related_key(), Some("tag_id"));
        assert_eq!(rel.edge_properties(), ["tagged_at".to_string()]);
    }

    #[test]
    fn test_edge_properties_need_an_edge_or_pivot() {
        let err = RelationshipDescriptor::one_to_many("posts", "User", "Post")
            .edge_properties(["weight"])
            .build(&RelationshipDefaults::default())
            .unwrap_err();
        assert!(matches!(err, RelationshipError::EdgePropertiesUnsupported { .. }));
    }

    #[test]
    fn test_storage_mode_parsing() {
        assert_eq!("edge".parse::<StorageMode>().unwrap(), StorageMode::NativeEdge);
        assert_eq!("FK".parse::<StorageMode>().unwrap(), StorageMode::ForeignKey);
        assert!("graph".parse::<StorageMode>().is_err());
    }
}
