//! Compiles a job type's field descriptors into a flat list of validation
//! rules, and evaluates raw form input against them.
//!
//! Every form carries three fixed fields (`name`, `schedule`,
//! `jobTypeIdentifier`) followed by one rule per configuration field, in
//! declaration order. Input arrives as text; `number` fields are coerced to
//! finite `f64` values once they pass validation.

use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;

use cron::Schedule;

use crate::types::{FieldType, JobType};

pub const FIELD_NAME: &str = "name";
pub const FIELD_SCHEDULE: &str = "schedule";
pub const FIELD_JOB_TYPE_IDENTIFIER: &str = "jobTypeIdentifier";

pub const RESERVED_FIELDS: [&str; 3] = [FIELD_SCHEDULE, FIELD_JOB_TYPE_IDENTIFIER, FIELD_NAME];

pub const MSG_REQUIRED: &str = "Required";
pub const MSG_INVALID_SCHEDULE: &str = "Invalid schedule expression";
pub const MSG_NOT_A_NUMBER: &str = "Must be a number";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("configuration field `{0}` is declared more than once")]
    DuplicateField(String),
    #[error("configuration field `{0}` collides with a built-in form field")]
    ReservedField(String),
    #[error("configuration field name must not be empty")]
    EmptyFieldName,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    /// Non-empty text that parses as a cron expression.
    Schedule,
    /// Non-empty text, kept as is.
    Text,
    /// Non-empty text that parses as a finite number.
    Number,
}

impl From<FieldType> for RuleKind {
    fn from(field_type: FieldType) -> Self {
        match field_type {
            FieldType::String => Self::Text,
            FieldType::Number => Self::Number,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRule {
    pub field: String,
    pub kind: RuleKind,
}

impl FieldRule {
    fn new(field: impl Into<String>, kind: RuleKind) -> Self {
        Self {
            field: field.into(),
            kind,
        }
    }

    #[must_use]
    pub fn is_configuration(&self) -> bool {
        !RESERVED_FIELDS.contains(&self.field.as_str())
    }

    fn check(&self, raw: &str) -> Result<FieldValue, &'static str> {
        match self.kind {
            RuleKind::Text => {
                if raw.is_empty() {
                    return Err(MSG_REQUIRED);
                }
                Ok(FieldValue::Text(raw.to_string()))
            }
            RuleKind::Schedule => {
                if raw.is_empty() {
                    return Err(MSG_REQUIRED);
                }
                if !is_valid_schedule(raw) {
                    return Err(MSG_INVALID_SCHEDULE);
                }
                Ok(FieldValue::Text(raw.to_string()))
            }
            RuleKind::Number => {
                if raw.trim().is_empty() {
                    return Err(MSG_REQUIRED);
                }
                parse_number(raw)
                    .map(FieldValue::Number)
                    .ok_or(MSG_NOT_A_NUMBER)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Number(f64),
}

impl FieldValue {
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value.as_str()),
            Self::Number(_) => None,
        }
    }

    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            Self::Text(_) => None,
        }
    }

    /// Integral numbers become JSON integers so `"5"` is sent as `5`, not `5.0`.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Text(value) => serde_json::Value::String(value.clone()),
            Self::Number(value) => {
                if value.fract() == 0.0 && value.abs() < 9.0e15 {
                    serde_json::Value::from(*value as i64)
                } else {
                    serde_json::Number::from_f64(*value)
                        .map_or(serde_json::Value::Null, serde_json::Value::Number)
                }
            }
        }
    }
}

/// Per-field validation messages, keyed by field name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldErrors {
    errors: BTreeMap<String, String>,
}

impl FieldErrors {
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&str> {
        self.errors.get(field).map(String::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.errors
            .iter()
            .map(|(field, message)| (field.as_str(), message.as_str()))
    }

    pub(crate) fn insert(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.insert(field.into(), message.into());
    }

    pub(crate) fn remove(&mut self, field: &str) {
        self.errors.remove(field);
    }
}

/// Values that passed validation, in rule order.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidRecord {
    values: Vec<(String, FieldValue)>,
}

impl ValidRecord {
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.values
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormSchema {
    job_type_identifier: String,
    rules: Vec<FieldRule>,
}

impl FormSchema {
    pub fn synthesize(job_type: &JobType) -> Result<Self, SchemaError> {
        let mut rules = vec![
            FieldRule::new(FIELD_SCHEDULE, RuleKind::Schedule),
            FieldRule::new(FIELD_JOB_TYPE_IDENTIFIER, RuleKind::Text),
            FieldRule::new(FIELD_NAME, RuleKind::Text),
        ];

        let mut seen = HashSet::new();
        for descriptor in &job_type.configuration_fields {
            let name = descriptor.name.as_str();
            if name.is_empty() {
                return Err(SchemaError::EmptyFieldName);
            }
            if RESERVED_FIELDS.contains(&name) {
                return Err(SchemaError::ReservedField(name.to_string()));
            }
            if !seen.insert(name) {
                return Err(SchemaError::DuplicateField(name.to_string()));
            }
            rules.push(FieldRule::new(name, descriptor.field_type.into()));
        }

        Ok(Self {
            job_type_identifier: job_type.identifier.clone(),
            rules,
        })
    }

    #[must_use]
    pub fn job_type_identifier(&self) -> &str {
        &self.job_type_identifier
    }

    #[must_use]
    pub fn rules(&self) -> &[FieldRule] {
        &self.rules
    }

    #[must_use]
    pub fn rule(&self, field: &str) -> Option<&FieldRule> {
        self.rules.iter().find(|rule| rule.field == field)
    }

    /// Blank values for every field, with the identifier pinned.
    #[must_use]
    pub fn default_values(&self) -> BTreeMap<String, String> {
        self.rules
            .iter()
            .map(|rule| {
                let value = if rule.field == FIELD_JOB_TYPE_IDENTIFIER {
                    self.job_type_identifier.clone()
                } else {
                    String::new()
                };
                (rule.field.clone(), value)
            })
            .collect()
    }

    /// Checks every rule and reports all failures at once. Keys in `values`
    /// that no rule names are ignored; missing keys count as empty input.
    pub fn validate(&self, values: &BTreeMap<String, String>) -> Result<ValidRecord, FieldErrors> {
        let mut errors = FieldErrors::default();
        let mut valid = Vec::with_capacity(self.rules.len());

        for rule in &self.rules {
            let raw = values.get(&rule.field).map_or("", String::as_str);
            match rule.check(raw) {
                Ok(value) => valid.push((rule.field.clone(), value)),
                Err(message) => errors.insert(rule.field.clone(), message),
            }
        }

        if errors.is_empty() {
            Ok(ValidRecord { values: valid })
        } else {
            Err(errors)
        }
    }
}

/// Accepts standard 5-field cron expressions and the 6/7-field forms with
/// seconds and year.
#[must_use]
pub fn is_valid_schedule(expression: &str) -> bool {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    let normalized = match fields.as_slice() {
        [minute, hour, day, month, weekday] => {
            let Some(weekday) = weekdays_as_names(weekday) else {
                return false;
            };
            format!("0 {minute} {hour} {day} {month} {weekday} *")
        }
        fields if matches!(fields.len(), 6 | 7) => fields.join(" "),
        _ => return false,
    };
    Schedule::from_str(&normalized).is_ok()
}

const WEEKDAY_NAMES: [&str; 8] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT", "SUN"];

// Standard cron counts weekdays 0-7 with Sunday at both ends, while the
// `cron` crate counts 1-7 from Sunday. Names mean the same thing to both.
fn weekdays_as_names(field: &str) -> Option<String> {
    let mut items = Vec::new();
    for item in field.split(',') {
        let (range, step) = match item.split_once('/') {
            Some((range, step)) => (range, Some(step)),
            None => (item, None),
        };
        let mut rewritten = match range.split_once('-') {
            Some((start, "7")) => match start.parse::<u8>() {
                Ok(0) => "SUN-SAT".to_string(),
                Ok(7) => "SUN".to_string(),
                Ok(_) if step.is_none() => format!("{}-SAT,SUN", weekday_name(start)?),
                _ => format!("{}-SAT", weekday_name(start)?),
            },
            Some((start, end)) => format!("{}-{}", weekday_name(start)?, weekday_name(end)?),
            None => weekday_name(range)?,
        };
        if let Some(step) = step {
            rewritten = format!("{rewritten}/{step}");
        }
        items.push(rewritten);
    }
    Some(items.join(","))
}

fn weekday_name(token: &str) -> Option<String> {
    match token.parse::<usize>() {
        Ok(day) => WEEKDAY_NAMES.get(day).map(ToString::to_string),
        Err(_) => Some(token.to_string()),
    }
}

#[must_use]
pub fn parse_number(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}
