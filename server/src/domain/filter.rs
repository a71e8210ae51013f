//! Subscription filter validation
//!
//! A filter is a JSON object mapping payload keys to a set of allowed
//! values: `{ "country": ["BR", "US"], "tier": [1, 2] }`. A payload matches
//! iff every filter key is present in the payload and its value equals at
//! least one allowed value under JSON equality. A null or empty filter
//! matches everything; extra payload keys are ignored.
//!
//! The predicate itself is evaluated in exactly one place: the publish
//! fan-out statement in `data::postgres::repositories::message`, which
//! tests `allowed @> jsonb_build_array(payload -> key)` per filter key.
//! This module only polices the shape of filter documents at
//! subscription-creation time so that statement stays correct: allowed
//! values are restricted to JSON scalars (string, number, boolean, null),
//! because jsonb array containment on scalars is exactly JSON equality
//! while on objects or arrays it would be structural containment.
//! Operator-style documents (`{"$gt": 100}`) are rejected - the broker
//! supports equality-in-set only.

use serde_json::Value;

/// Why a filter document was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    NotAnObject,
    ValuesNotAnArray(String),
    EmptyValueSet(String),
    NonScalarValue(String),
}

impl std::fmt::Display for FilterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterError::NotAnObject => write!(f, "filter must be a JSON object"),
            FilterError::ValuesNotAnArray(key) => {
                write!(f, "filter key '{}' must map to an array of values", key)
            }
            FilterError::EmptyValueSet(key) => {
                write!(f, "filter key '{}' must list at least one value", key)
            }
            FilterError::NonScalarValue(key) => write!(
                f,
                "filter key '{}' may only list scalar values (string, number, boolean, null)",
                key
            ),
        }
    }
}

impl std::error::Error for FilterError {}

/// Validate a filter document at subscription-creation time.
///
/// `None` and `{}` are valid (match-all) filters.
pub fn validate(filter: Option<&Value>) -> Result<(), FilterError> {
    let Some(filter) = filter else {
        return Ok(());
    };
    if filter.is_null() {
        return Ok(());
    }

    let Some(object) = filter.as_object() else {
        return Err(FilterError::NotAnObject);
    };

    for (key, allowed) in object {
        let Some(values) = allowed.as_array() else {
            return Err(FilterError::ValuesNotAnArray(key.clone()));
        };
        if values.is_empty() {
            return Err(FilterError::EmptyValueSet(key.clone()));
        }
        if values.iter().any(|v| v.is_object() || v.is_array()) {
            return Err(FilterError::NonScalarValue(key.clone()));
        }
    }

    Ok(())
}
