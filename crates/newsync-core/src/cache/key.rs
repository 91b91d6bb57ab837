//! Canonical cache keys.
//!
//! `KeyCodec` turns a `QueryParams` bag into a `CacheKey`: empty values are
//! dropped, names are sorted, and numbers and booleans are rendered in one
//! stable textual form, so structurally equal parameters always share a key
//! no matter how they were assembled.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::SyncError;

/// Longest accepted text value (search strings, category names).
pub const MAX_TEXT_LENGTH: usize = 512;

/// Floats with no fractional part below this magnitude render as integers.
const MAX_EXACT_FLOAT: f64 = 9.0e15;

#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    pub fn is_empty(&self) -> bool {
        match self {
            ParamValue::Null => true,
            ParamValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(i) => Some(*i as f64),
            ParamValue::Float(f) => Some(*f),
            ParamValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(i) => Some(*i),
            ParamValue::Float(f) if f.fract() == 0.0 && f.abs() < MAX_EXACT_FLOAT => Some(*f as i64),
            ParamValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Stable textual form. Callers drop empty values before asking.
    fn canonical(&self) -> String {
        match self {
            ParamValue::Null => String::new(),
            ParamValue::Bool(b) => b.to_string(),
            ParamValue::Int(i) => i.to_string(),
            ParamValue::Float(f) if f.fract() == 0.0 && f.abs() < MAX_EXACT_FLOAT => {
                (*f as i64).to_string()
            }
            ParamValue::Float(f) => f.to_string(),
            ParamValue::Text(s) => s.clone(),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Text(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        ParamValue::Int(v.into())
    }
}

impl From<u32> for ParamValue {
    fn from(v: u32) -> Self {
        ParamValue::Int(v.into())
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(ParamValue::Null)
    }
}

/// A named bag of query parameters under a scope ("articles", "catalog").
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams {
    scope: String,
    values: BTreeMap<String, ParamValue>,
}

impl QueryParams {
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            values: BTreeMap::new(),
        }
    }

    pub fn from_pairs<I, K, V>(scope: impl Into<String>, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<ParamValue>,
    {
        let mut params = Self::new(scope);
        for (name, value) in pairs {
            params.set(name, value);
        }
        params
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<ParamValue> {
        self.values.remove(name)
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(ParamValue::as_text)
    }

    pub fn float(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(ParamValue::as_f64)
    }

    pub fn uint(&self, name: &str) -> Option<u32> {
        self.get(name)
            .and_then(ParamValue::as_i64)
            .and_then(|v| u32::try_from(v).ok())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Canonical identifier of a cached query. Cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(Arc<str>);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn scope(&self) -> &str {
        self.0.split_once(':').map(|(scope, _)| scope).unwrap_or(&self.0)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Extra validation applied to a named parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamRule {
    /// A number in `[0, 1]`.
    UnitInterval,
    /// An integer in `1..=max`.
    PositiveInt { max: u32 },
    /// Text of at most this many characters.
    MaxLength(usize),
}

#[derive(Debug, Clone, Default)]
pub struct KeyCodec {
    rules: BTreeMap<String, ParamRule>,
}

impl KeyCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule(mut self, name: impl Into<String>, rule: ParamRule) -> Self {
        self.rules.insert(name.into(), rule);
        self
    }

    /// Validate and strip empty values.
    pub fn normalize(&self, params: &QueryParams) -> Result<QueryParams, SyncError> {
        validate_scope(params.scope())?;

        let mut normalized = QueryParams::new(params.scope());
        for (name, value) in params.iter() {
            if name.is_empty() || name.chars().any(char::is_control) {
                return Err(SyncError::Validation(format!(
                    "invalid parameter name {:?}",
                    name
                )));
            }
            if value.is_empty() {
                continue;
            }
            self.validate_value(name, value)?;
            normalized.set(name, value.clone());
        }
        Ok(normalized)
    }

    pub fn encode(&self, params: &QueryParams) -> Result<CacheKey, SyncError> {
        self.prepare(params).map(|(key, _)| key)
    }

    /// Normalize `params` and derive its key in one step.
    pub fn prepare(&self, params: &QueryParams) -> Result<(CacheKey, QueryParams), SyncError> {
        let normalized = self.normalize(params)?;
        let canonical: BTreeMap<&str, String> = normalized
            .iter()
            .map(|(name, value)| (name, value.canonical()))
            .collect();
        let body = serde_json::to_string(&canonical)
            .map_err(|e| SyncError::Validation(format!("unencodable parameters: {}", e)))?;
        let key = CacheKey(Arc::from(format!("{}:{}", normalized.scope(), body)));
        Ok((key, normalized))
    }

    fn validate_value(&self, name: &str, value: &ParamValue) -> Result<(), SyncError> {
        match value {
            ParamValue::Float(f) if !f.is_finite() => {
                return Err(SyncError::Validation(format!("{} must be a finite number", name)));
            }
            ParamValue::Text(s) if s.chars().count() > MAX_TEXT_LENGTH => {
                return Err(SyncError::Validation(format!(
                    "{} exceeds {} characters",
                    name, MAX_TEXT_LENGTH
                )));
            }
            _ => {}
        }

        match self.rules.get(name) {
            None => Ok(()),
            Some(ParamRule::UnitInterval) => match value.as_f64() {
                Some(v) if (0.0..=1.0).contains(&v) => Ok(()),
                _ => Err(SyncError::Validation(format!(
                    "{} must be between 0 and 1",
                    name
                ))),
            },
            Some(ParamRule::PositiveInt { max }) => match value.as_i64() {
                Some(v) if v >= 1 && v <= i64::from(*max) => Ok(()),
                _ => Err(SyncError::Validation(format!(
                    "{} must be an integer between 1 and {}",
                    name, max
                ))),
            },
            Some(ParamRule::MaxLength(max)) => match value {
                ParamValue::Text(s) if s.chars().count() > *max => Err(SyncError::Validation(
                    format!("{} exceeds {} characters", name, max),
                )),
                _ => Ok(()),
            },
        }
    }
}

fn validate_scope(scope: &str) -> Result<(), SyncError> {
    let valid = !scope.is_empty()
        && scope
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
    if valid {
        Ok(())
    } else {
        Err(SyncError::Validation(format!("invalid query scope {:?}", scope)))
    }
}
