/// Predicate to Cypher boolean-expression translation
///
/// Every predicate becomes one boolean fragment over a pattern variable:
///
/// - inequality uses `<>`
/// - `like` patterns become `CONTAINS` / `STARTS WITH` / `ENDS WITH` / `=~`
/// - `eq NULL` becomes `IS NULL`, `neq NULL` becomes `IS NOT NULL`; any other
///   operator compared with NULL is rejected
/// - negated operators are prefixed with `<col> IS NOT NULL AND` so a missing
///   property can never satisfy them
/// - temporal operators always start with `<col> IS NOT NULL AND`
/// - groups are parenthesized recursively
/// - inside a negated group those guards are hoisted in front of the `NOT`,
///   so negation never turns a missing property into a match
///
/// Values are never inlined; they are bound through the shared
/// `ParamAllocator` of the statement being compiled.
use serde_json::Value;

use super::errors::CypherGeneratorError;
use super::identifiers::{property_ref, validate_alias, ParamAllocator};
use super::predicate::{ColumnRef, Comparison, Operand, Operator, Predicate};
use super::statement::Params;
use super::temporal_functions::{get_temporal_function, normalized_source};

/// A translated predicate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub text: String,
    /// Top-level AND/OR inside the text; needs parentheses when joined
    pub composite: bool,
}

impl Fragment {
    fn simple(text: String) -> Self {
        Fragment {
            text,
            composite: false,
        }
    }

    fn composite(text: String) -> Self {
        Fragment {
            text,
            composite: true,
        }
    }
}

/// Translate a single predicate against variable `alias` with its own
/// parameter namespace.
///
/// # Example
/// ```ignore
/// let (text, params) = translate(&Predicate::gt("age", 25), "n")?;
/// assert_eq!(text, "n.age > $p0");
/// ```
pub fn translate(predicate: &Predicate, alias: &str) -> Result<(String, Params), CypherGeneratorError> {
    let mut params = ParamAllocator::new();
    let fragment = ClauseTranslator::new(alias, &mut params).translate(predicate)?;
    Ok((fragment.text, params.into_params()))
}

pub struct ClauseTranslator<'a> {
    alias: &'a str,
    params: &'a mut ParamAllocator,
    /// Guarded columns collected while inside a negated group
    hoisted: Option<Vec<String>>,
}

impl<'a> ClauseTranslator<'a> {
    pub fn new(alias: &'a str, params: &'a mut ParamAllocator) -> Self {
        ClauseTranslator {
            alias,
            params,
            hoisted: None,
        }
    }

    /// Translate sibling predicates, one fragment per predicate
    pub fn translate_all(&mut self, predicates: &[Predicate]) -> Result<Vec<Fragment>, CypherGeneratorError> {
        predicates.iter().map(|p| self.translate(p)).collect()
    }

    /// Join sibling fragments with the connector each predicate carries
    pub fn join(fragments: &[Fragment], predicates: &[Predicate]) -> String {
        let many = fragments.len() > 1;
        let mut out = String::new();
        for (i, fragment) in fragments.iter().enumerate() {
            if i > 0 {
                out.push(' ');
                out.push_str(predicates[i - 1].connector().keyword());
                out.push(' ');
            }
            if many && fragment.composite {
                out.push('(');
                out.push_str(&fragment.text);
                out.push(')');
            } else {
                out.push_str(&fragment.text);
            }
        }
        out
    }

    pub fn translate(&mut self, predicate: &Predicate) -> Result<Fragment, CypherGeneratorError> {
        validate_alias(self.alias)?;
        match predicate {
            Predicate::Condition {
                column,
                operator,
                operand,
                ..
            } => self.condition(column, *operator, operand),
            Predicate::Group {
                predicates,
                negated,
                ..
            } => {
                if predicates.is_empty() {
                    return Err(CypherGeneratorError::EmptyPredicateGroup);
                }
                if !*negated {
                    let fragments = self.translate_all(predicates)?;
                    return Ok(Fragment::simple(format!("({})", Self::join(&fragments, predicates))));
                }

                let enclosing = self.hoisted.replace(Vec::new());
                let translated = self.translate_all(predicates);
                let guards = self.hoisted.take().unwrap_or_default();
                self.hoisted = enclosing;

                let negation = format!("NOT ({})", Self::join(&translated?, predicates));
                match self.hoisted.as_mut() {
                    Some(outer) => {
                        for guard in guards {
                            if !outer.contains(&guard) {
                                outer.push(guard);
                            }
                        }
                        Ok(Fragment::simple(negation))
                    }
                    None if guards.is_empty() => Ok(Fragment::simple(negation)),
                    None => {
                        let checks: Vec<String> = guards.iter().map(|g| format!("{} IS NOT NULL", g)).collect();
                        Ok(Fragment::composite(format!("{} AND {}", checks.join(" AND "), negation)))
                    }
                }
            }
            Predicate::Raw {
                fragment, bindings, ..
            } => {
                for (name, value) in bindings {
                    self.params.bind_named(name, value.clone())?;
                }
                Ok(Fragment::simple(format!(
                    "({})",
                    fragment.replace("{alias}", self.alias)
                )))
            }
        }
    }

    /// `<col> IS NOT NULL AND <body>`, or just `<body>` with `col` recorded
    /// when an enclosing negated group owns the guard
    fn guarded(&mut self, col: &str, body: String) -> Fragment {
        match self.hoisted.as_mut() {
            Some(guards) => {
                if !guards.iter().any(|g| g == col) {
                    guards.push(col.to_string());
                }
                Fragment::simple(body)
            }
            None if body == "true" => Fragment::simple(format!("{} IS NOT NULL", col)),
            None => Fragment::composite(format!("{} IS NOT NULL AND {}", col, body)),
        }
    }

    fn column(&self, column: &ColumnRef) -> Result<String, CypherGeneratorError> {
        let alias = column.alias.as_deref().unwrap_or(self.alias);
        validate_alias(alias)?;
        Ok(property_ref(alias, &column.property))
    }

    /// Right-hand side for a plain comparison
    fn value_expr(
        &mut self,
        column: &ColumnRef,
        operator: Operator,
        operand: &Operand,
    ) -> Result<String, CypherGeneratorError> {
        match operand {
            Operand::Literal(Value::Null) => Err(CypherGeneratorError::NullComparison {
                column: column.to_string(),
                operator: operator.to_string(),
            }),
            Operand::Literal(value) => Ok(self.params.bind(value.clone())),
            Operand::Parameter(name) => Ok(format!("${}", name)),
            Operand::Column(other) => self.column(other),
            Operand::Range(..) | Operand::None => Err(CypherGeneratorError::invalid_operand(
                column.to_string(),
                operator.to_string(),
                "expected a single value",
            )),
        }
    }

    /// String-only right-hand side (contains, starts with, regex, ...)
    fn text_expr(
        &mut self,
        column: &ColumnRef,
        operator: Operator,
        operand: &Operand,
    ) -> Result<String, CypherGeneratorError> {
        match operand {
            Operand::Literal(Value::String(s)) => Ok(self.params.bind(Value::String(s.clone()))),
            Operand::Parameter(name) => Ok(format!("${}", name)),
            Operand::Literal(Value::Null) => Err(CypherGeneratorError::NullComparison {
                column: column.to_string(),
                operator: operator.to_string(),
            }),
            _ => Err(CypherGeneratorError::invalid_operand(
                column.to_string(),
                operator.to_string(),
                "expected a string",
            )),
        }
    }

    fn condition(
        &mut self,
        column: &ColumnRef,
        operator: Operator,
        operand: &Operand,
    ) -> Result<Fragment, CypherGeneratorError> {
        let col = self.column(column)?;

        match operator {
            Operator::IsNull => Ok(Fragment::simple(format!("{} IS NULL", col))),
            Operator::NotNull => Ok(Fragment::simple(format!("{} IS NOT NULL", col))),

            // NULL equality is rewritten to the null-aware form
            Operator::Eq if operand.is_null_literal() => {
                Ok(Fragment::simple(format!("{} IS NULL", col)))
            }
            Operator::Neq if operand.is_null_literal() => {
                Ok(Fragment::simple(format!("{} IS NOT NULL", col)))
            }

            Operator::Neq => {
                let rhs = self.value_expr(column, operator, operand)?;
                Ok(self.guarded(&col, format!("{} {} {}", col, Comparison::Neq.token(), rhs)))
            }

            Operator::Eq | Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte => {
                let rhs = self.value_expr(column, operator, operand)?;
                let token = operator.comparison().map(Comparison::token).unwrap_or("=");
                Ok(Fragment::simple(format!("{} {} {}", col, token, rhs)))
            }

            Operator::In | Operator::NotIn => self.membership(&col, column, operator, operand),

            Operator::Like | Operator::ILike | Operator::NotLike => {
                let pattern = match operand {
                    Operand::Literal(Value::String(s)) => s,
                    Operand::Literal(Value::Null) => {
                        return Err(CypherGeneratorError::NullComparison {
                            column: column.to_string(),
                            operator: operator.to_string(),
                        })
                    }
                    _ => {
                        return Err(CypherGeneratorError::invalid_operand(
                            column.to_string(),
                            operator.to_string(),
                            "LIKE needs a literal pattern",
                        ))
                    }
                };
                let case_insensitive = operator == Operator::ILike;
                match (self.like(&col, pattern, case_insensitive), operator == Operator::NotLike) {
                    (Some(positive), false) => Ok(Fragment::simple(positive)),
                    (Some(positive), true) => Ok(self.guarded(&col, format!("NOT ({})", positive))),
                    // a lone '%' matches any present value
                    (None, false) => Ok(self.guarded(&col, "true".to_string())),
                    (None, true) => Ok(self.guarded(&col, "false".to_string())),
                }
            }

            Operator::Contains => {
                let rhs = self.text_expr(column, operator, operand)?;
                Ok(Fragment::simple(format!("{} CONTAINS {}", col, rhs)))
            }
            Operator::StartsWith => {
                let rhs = self.text_expr(column, operator, operand)?;
                Ok(Fragment::simple(format!("{} STARTS WITH {}", col, rhs)))
            }
            Operator::EndsWith => {
                let rhs = self.text_expr(column, operator, operand)?;
                Ok(Fragment::simple(format!("{} ENDS WITH {}", col, rhs)))
            }
            Operator::Regex => {
                let rhs = self.text_expr(column, operator, operand)?;
                Ok(Fragment::simple(format!("{} =~ {}", col, rhs)))
            }

            Operator::Between | Operator::NotBetween => {
                let (low, high) = match operand {
                    Operand::Range(low, high) => (low, high),
                    Operand::Literal(Value::Array(bounds)) if bounds.len() == 2 => {
                        (&bounds[0], &bounds[1])
                    }
                    _ => {
                        return Err(CypherGeneratorError::invalid_operand(
                            column.to_string(),
                            operator.to_string(),
                            "expected exactly two bounds",
                        ))
                    }
                };
                if low.is_null() || high.is_null() {
                    return Err(CypherGeneratorError::NullComparison {
                        column: column.to_string(),
                        operator: operator.to_string(),
                    });
                }
                let low = self.params.bind(low.clone());
                let high = self.params.bind(high.clone());
                let range = format!("{col} >= {low} AND {col} <= {high}");
                if operator == Operator::NotBetween {
                    Ok(self.guarded(&col, format!("NOT ({})", range)))
                } else {
                    Ok(Fragment::composite(range))
                }
            }

            Operator::Temporal(part, comparison) => {
                let function = get_temporal_function(part).ok_or_else(|| {
                    CypherGeneratorError::UnknownOperator(operator.to_string())
                })?;
                let rhs = match operand {
                    Operand::Literal(Value::Null) => {
                        return Err(CypherGeneratorError::NullComparison {
                            column: column.to_string(),
                            operator: operator.to_string(),
                        })
                    }
                    Operand::Literal(value) if function.accepts(value) => {
                        self.params.bind(value.clone())
                    }
                    Operand::Parameter(name) => format!("${}", name),
                    _ => {
                        return Err(CypherGeneratorError::invalid_operand(
                            column.to_string(),
                            operator.to_string(),
                            format!("unsupported value for {} extraction", part.name()),
                        ))
                    }
                };
                let extracted = (function.extract)(&normalized_source(&col));
                let body = format!("{} {} {}", extracted, comparison.token(), (function.wrap_param)(&rhs));
                Ok(self.guarded(&col, body))
            }
        }
    }

    fn membership(
        &mut self,
        col: &str,
        column: &ColumnRef,
        operator: Operator,
        operand: &Operand,
    ) -> Result<Fragment, CypherGeneratorError> {
        let negated = operator == Operator::NotIn;
        let rhs = match operand {
            Operand::Literal(Value::Array(values)) if values.is_empty() => {
                // IN [] never matches; NOT IN [] matches every present value
                return Ok(if negated {
                    self.guarded(col, "true".to_string())
                } else {
                    Fragment::simple("false".to_string())
                });
            }
            Operand::Literal(Value::Array(values)) => self.params.bind(Value::Array(values.clone())),
            Operand::Parameter(name) => format!("${}", name),
            _ => {
                return Err(CypherGeneratorError::invalid_operand(
                    column.to_string(),
                    operator.to_string(),
                    "expected a list",
                ))
            }
        };
        if negated {
            Ok(self.guarded(col, format!("NOT {} IN {}", col, rhs)))
        } else {
            Ok(Fragment::simple(format!("{} IN {}", col, rhs)))
        }
    }

    /// SQL LIKE pattern to the cheapest equivalent Cypher string predicate;
    /// `None` when the pattern matches every present value
    fn like(&mut self, col: &str, pattern: &str, case_insensitive: bool) -> Option<String> {
        let (lhs, pattern) = if case_insensitive {
            (format!("toLower({})", col), pattern.to_lowercase())
        } else {
            (col.to_string(), pattern.to_string())
        };

        let tokens = tokenize_like(&pattern);
        let leading_any = matches!(tokens.first(), Some(LikeToken::Any));
        let trailing_any = tokens.len() > 1 && matches!(tokens.last(), Some(LikeToken::Any));
        let start = usize::from(leading_any);
        let end = tokens.len() - usize::from(trailing_any);
        let core = &tokens[start..end.max(start)];

        if core.iter().all(|t| matches!(t, LikeToken::Any)) && (leading_any || trailing_any) {
            return None;
        }

        if core.iter().all(|t| matches!(t, LikeToken::Literal(_))) {
            let literal: String = core
                .iter()
                .filter_map(|t| match t {
                    LikeToken::Literal(c) => Some(*c),
                    _ => None,
                })
                .collect();
            let p = self.params.bind(Value::String(literal));
            return Some(match (leading_any, trailing_any) {
                (true, true) => format!("{} CONTAINS {}", lhs, p),
                (false, true) => format!("{} STARTS WITH {}", lhs, p),
                (true, false) => format!("{} ENDS WITH {}", lhs, p),
                (false, false) => format!("{} = {}", lhs, p),
            });
        }

        let mut regex_pattern = String::from("^");
        let mut literal_run = String::new();
        for token in &tokens {
            match token {
                LikeToken::Literal(c) => literal_run.push(*c),
                LikeToken::Any | LikeToken::One => {
                    regex_pattern.push_str(&regex::escape(&literal_run));
                    literal_run.clear();
                    regex_pattern.push_str(if *token == LikeToken::Any { ".*" } else { "." });
                }
            }
        }
        regex_pattern.push_str(&regex::escape(&literal_run));
        regex_pattern.push('$');
        let p = self.params.bind(Value::String(regex_pattern));
        Some(format!("{} =~ {}", lhs, p))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LikeToken {
    Any,
    One,
    Literal(char),
}

/// `%` and `_` are wildcards, a backslash makes the next character literal
fn tokenize_like(pattern: &str) -> Vec<LikeToken> {
    let mut tokens = Vec::with_capacity(pattern.len());
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(escaped) => tokens.push(LikeToken::Literal(escaped)),
                None => tokens.push(LikeToken::Literal('\\')),
            },
            '%' => {
                if tokens.last() != Some(&LikeToken::Any) {
                    tokens.push(LikeToken::Any);
                }
            }
            '_' => tokens.push(LikeToken::One),
            other => tokens.push(LikeToken::Literal(other)),
        }
    }
    tokens
}
