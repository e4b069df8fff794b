use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Named parameters bound to a statement (`$name` placeholders).
///
/// Backed by the insertion-ordered JSON map so the rendered parameter list
/// follows placeholder allocation order.
pub type Params = Map<String, Value>;

/// A compiled Cypher statement: text with `$name` placeholders plus bindings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CypherStatement {
    pub text: String,
    #[serde(default)]
    pub params: Params,
}

impl CypherStatement {
    pub fn new(text: impl Into<String>) -> Self {
        CypherStatement {
            text: text.into(),
            params: Params::new(),
        }
    }

    pub fn with_params(text: impl Into<String>, params: Params) -> Self {
        CypherStatement {
            text: text.into(),
            params,
        }
    }

    /// Add or replace a single binding
    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Render the bindings as compact JSON for error reports and logs
    pub fn params_json(&self) -> String {
        serde_json::to_string(&self.params).unwrap_or_else(|_| "{}".to_string())
    }
}

impl fmt::Display for CypherStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_param_builder_keeps_insertion_order() {
        let stmt = CypherStatement::new("MATCH (n) WHERE n.a = $b AND n.c = $a RETURN n")
            .param("b", 1)
            .param("a", "x");
        let keys: Vec<&String> = stmt.params.keys().collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert_eq!(stmt.params_json(), r#"{"b":1,"a":"x"}"#);
    }

    #[test]
    fn test_display_is_text() {
        let stmt = CypherStatement::new("RETURN 1").param("unused", json!(null));
        assert_eq!(stmt.to_string(), "RETURN 1");
    }
}
