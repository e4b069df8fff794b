/// Temporal extraction registry
///
/// Maps each temporal predicate part (date/year/month/day/time) to the Cypher
/// expression that extracts it and to the wrapper applied to the bound value.
///
/// Stored values may be native temporal types or ISO-8601 strings written by
/// a host framework. The source expression branches on `valueType()` at
/// runtime and parses strings through `datetime()` before extracting, instead
/// of guessing the encoding from the string contents.
use std::collections::HashMap;

use chrono::{NaiveDate, NaiveTime};
use serde_json::Value;

use super::predicate::TemporalPart;

/// Kind of value a temporal comparison expects on the right-hand side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemporalOperand {
    /// ISO-8601 calendar date, `2024-01-31`
    Date,
    /// Wall-clock time, `14:30` or `14:30:00`
    Time,
    /// Calendar component number
    Integer,
}

#[derive(Clone)]
pub struct TemporalFunction {
    pub part: TemporalPart,
    /// Takes the normalized source expression, returns the extracted component
    pub extract: fn(&str) -> String,
    /// Takes the `$param` placeholder, returns the comparable expression
    pub wrap_param: fn(&str) -> String,
    pub operand: TemporalOperand,
}

impl TemporalFunction {
    pub fn accepts(&self, value: &Value) -> bool {
        match self.operand {
            TemporalOperand::Date => value
                .as_str()
                .is_some_and(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()),
            TemporalOperand::Time => value.as_str().is_some_and(|s| {
                NaiveTime::parse_from_str(s, "%H:%M:%S%.f").is_ok()
                    || NaiveTime::parse_from_str(s, "%H:%M").is_ok()
            }),
            TemporalOperand::Integer => value.is_i64() || value.is_u64(),
        }
    }
}

/// Source expression that tolerates both native temporals and strings
pub fn normalized_source(column: &str) -> String {
    format!(
        "(CASE WHEN valueType({col}) STARTS WITH 'STRING' THEN datetime({col}) ELSE {col} END)",
        col = column
    )
}

pub fn get_temporal_function(part: TemporalPart) -> Option<TemporalFunction> {
    TEMPORAL_FUNCTIONS.get(&part).cloned()
}

lazy_static::lazy_static! {
    static ref TEMPORAL_FUNCTIONS: HashMap<TemporalPart, TemporalFunction> = {
        let mut m = HashMap::new();

        // date(x) = date($p)
        m.insert(TemporalPart::Date, TemporalFunction {
            part: TemporalPart::Date,
            extract: |src| format!("date({})", src),
            wrap_param: |p| format!("date({})", p),
            operand: TemporalOperand::Date,
        });

        // x.year = $p
        m.insert(TemporalPart::Year, TemporalFunction {
            part: TemporalPart::Year,
            extract: |src| format!("{}.year", src),
            wrap_param: |p| p.to_string(),
            operand: TemporalOperand::Integer,
        });

        m.insert(TemporalPart::Month, TemporalFunction {
            part: TemporalPart::Month,
            extract: |src| format!("{}.month", src),
            wrap_param: |p| p.to_string(),
            operand: TemporalOperand::Integer,
        });

        m.insert(TemporalPart::Day, TemporalFunction {
            part: TemporalPart::Day,
            extract: |src| format!("{}.day", src),
            wrap_param: |p| p.to_string(),
            operand: TemporalOperand::Integer,
        });

        // localtime() drops the zone so '14:30:00' compares against wall-clock time
        m.insert(TemporalPart::Time, TemporalFunction {
            part: TemporalPart::Time,
            extract: |src| format!("localtime({})", src),
            wrap_param: |p| format!("localtime({})", p),
            operand: TemporalOperand::Time,
        });

        m
    };
}
