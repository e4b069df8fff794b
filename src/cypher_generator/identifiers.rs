/// Identifier quoting and parameter allocation for generated Cypher
///
/// Labels, relationship types and property names are emitted bare when they
/// are plain identifiers and backtick-quoted otherwise. Values never reach the
/// statement text; they are bound through a `ParamAllocator`.
use serde_json::Value;

use super::errors::CypherGeneratorError;
use super::statement::Params;

/// True when `name` can be emitted without backticks
pub fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Quote an identifier for use as a label, type or property key
///
/// Embedded backticks are doubled, which is how Cypher escapes them inside a
/// quoted identifier.
pub fn quote_identifier(name: &str) -> String {
    if is_plain_identifier(name) {
        name.to_string()
    } else {
        format!("`{}`", name.replace('`', "``"))
    }
}

/// `alias.property` with the property quoted when needed
pub fn property_ref(alias: &str, property: &str) -> String {
    format!("{}.{}", alias, quote_identifier(property))
}

/// `:A:B` label expression for a node pattern
pub fn label_expression(labels: &[String]) -> String {
    labels
        .iter()
        .map(|label| format!(":{}", quote_identifier(label)))
        .collect()
}

/// Variables are generated by the compiler and must stay plain identifiers
pub fn validate_alias(alias: &str) -> Result<(), CypherGeneratorError> {
    if is_plain_identifier(alias) {
        Ok(())
    } else {
        Err(CypherGeneratorError::InvalidAlias(alias.to_string()))
    }
}

/// Hands out `$p0, $p1, ...` placeholders and collects their bindings
#[derive(Debug, Default)]
pub struct ParamAllocator {
    next: usize,
    params: Params,
}

impl ParamAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a value under a fresh name, returning the `$name` placeholder
    pub fn bind(&mut self, value: Value) -> String {
        loop {
            let name = format!("p{}", self.next);
            self.next += 1;
            if !self.params.contains_key(&name) {
                self.params.insert(name.clone(), value);
                return format!("${}", name);
            }
        }
    }

    /// Bind a caller-chosen name (raw fragments, follow-up keys)
    pub fn bind_named(&mut self, name: &str, value: Value) -> Result<String, CypherGeneratorError> {
        if !is_plain_identifier(name) {
            return Err(CypherGeneratorError::InvalidParameterName(name.to_string()));
        }
        if self.params.contains_key(name) {
            return Err(CypherGeneratorError::DuplicateParameter(name.to_string()));
        }
        self.params.insert(name.to_string(), value);
        Ok(format!("${}", name))
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn into_params(self) -> Params {
        self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_identifiers_stay_bare() {
        assert_eq!(quote_identifier("created_at"), "created_at");
        assert_eq!(quote_identifier("User2"), "User2");
    }

    #[test]
    fn test_odd_identifiers_are_quoted() {
        assert_eq!(quote_identifier("first name"), "`first name`");
        assert_eq!(quote_identifier("2fa"), "`2fa`");
        assert_eq!(quote_identifier("we`ird"), "`we``ird`");
        assert_eq!(property_ref("n", "e-mail"), "n.`e-mail`");
    }

    #[test]
    fn test_label_expression() {
        let labels = vec!["User".to_string(), "Admin User".to_string()];
        assert_eq!(label_expression(&labels), ":User:`Admin User`");
    }

    #[test]
    fn test_allocator_skips_names_taken_by_raw_bindings() {
        let mut params = ParamAllocator::new();
        assert_eq!(params.bind_named("p0", json!(1)).unwrap(), "$p0");
        assert_eq!(params.bind(json!(2)), "$p1");
        assert!(matches!(
            params.bind_named("p1", json!(3)),
            Err(CypherGeneratorError::DuplicateParameter(_))
        ));
        assert_eq!(params.len(), 2);
    }
}
