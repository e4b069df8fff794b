/// Edge type naming conventions
///
/// Edge types are derived from the relationship name, re-cased from whatever
/// casing it was declared in. An explicit override on the descriptor
/// bypasses this entirely.
use std::fmt;
use std::str::FromStr;

use convert_case::{Case, Casing};
use serde::{Deserialize, Serialize};

use super::errors::ParseEnumError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeNamingConvention {
    /// `AUTHORED_POSTS`
    #[default]
    #[serde(alias = "screaming_snake", alias = "constant")]
    UpperSnake,
    /// `authored_posts`
    #[serde(alias = "snake")]
    LowerSnake,
    /// `authoredPosts`
    #[serde(alias = "camel_case")]
    Camel,
    /// `AuthoredPosts`
    #[serde(alias = "studly")]
    Pascal,
    /// `authored-posts`
    Kebab,
}

impl EdgeNamingConvention {
    pub fn apply(self, relationship_name: &str) -> String {
        let case = match self {
            EdgeNamingConvention::UpperSnake => Case::UpperSnake,
            EdgeNamingConvention::LowerSnake => Case::Snake,
            EdgeNamingConvention::Camel => Case::Camel,
            EdgeNamingConvention::Pascal => Case::Pascal,
            EdgeNamingConvention::Kebab => Case::Kebab,
        };
        relationship_name.trim().to_case(case)
    }
}

impl fmt::Display for EdgeNamingConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EdgeNamingConvention::UpperSnake => "upper_snake",
            EdgeNamingConvention::LowerSnake => "lower_snake",
            EdgeNamingConvention::Camel => "camel",
            EdgeNamingConvention::Pascal => "pascal",
            EdgeNamingConvention::Kebab => "kebab",
        };
        f.write_str(name)
    }
}

impl FromStr for EdgeNamingConvention {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "upper_snake" | "screaming_snake" | "constant" => Ok(EdgeNamingConvention::UpperSnake),
            "lower_snake" | "snake" => Ok(EdgeNamingConvention::LowerSnake),
            "camel" | "camel_case" => Ok(EdgeNamingConvention::Camel),
            "pascal" | "studly" => Ok(EdgeNamingConvention::Pascal),
            "kebab" => Ok(EdgeNamingConvention::Kebab),
            _ => Err(ParseEnumError::new("edge_naming_convention", s)),
        }
    }
}

/// `BlogPost` -> `blog_post`, used for default foreign-key column names
pub fn snake_case(name: &str) -> String {
    name.to_case(Case::Snake)
}
