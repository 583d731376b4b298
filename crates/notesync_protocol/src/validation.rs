//! Minimal record validation shared by client and server.
//!
//! Every record, whatever its collection, must be a JSON object with a string
//! `id` and an integer `updated_at` (milliseconds). Field-specific checks
//! happen when the record is decoded into its typed form.

use crate::record::Collection;
use serde_json::Value;
use std::fmt;

/// Why a push body failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    /// Collection the offending entry belongs to, if any.
    pub collection: Option<Collection>,
    /// Human-readable reason.
    pub reason: String,
}

impl ValidationFailure {
    fn new(collection: Option<Collection>, reason: impl Into<String>) -> Self {
        Self {
            collection,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.collection {
            Some(collection) => write!(f, "{}: {}", collection, self.reason),
            None => f.write_str(&self.reason),
        }
    }
}

/// Validates one record against the minimal contract.
///
/// Rejects non-objects (including `null` and arrays), a missing or
/// non-string `id`, and a missing or non-integer `updated_at`.
pub fn validate_record(value: &Value) -> Result<(), String> {
    let object = match value {
        Value::Object(map) => map,
        Value::Null => return Err("record is null".into()),
        Value::Array(_) => return Err("record is an array".into()),
        _ => return Err("record is not an object".into()),
    };

    match object.get("id") {
        Some(Value::String(_)) => {}
        Some(_) => return Err("id must be a string".into()),
        None => return Err("id is required".into()),
    }

    match object.get("updated_at") {
        Some(Value::Number(n)) if n.is_i64() => Ok(()),
        Some(Value::Number(_)) => Err("updated_at must be an integer".into()),
        Some(_) => Err("updated_at must be a number".into()),
        None => Err("updated_at is required".into()),
    }
}

/// Validates a whole push body before anything is applied.
///
/// The body must be an object whose only keys are collection names; each
/// batch must be an object with optional `created`/`updated` record arrays
/// and an optional `deleted` array of string ids.
pub fn validate_push_body(body: &Value) -> Result<(), ValidationFailure> {
    let object = body
        .as_object()
        .ok_or_else(|| ValidationFailure::new(None, "body must be an object"))?;

    for (key, batch) in object {
        let collection = Collection::from_name(key)
            .ok_or_else(|| ValidationFailure::new(None, format!("unknown collection: {key}")))?;
        validate_batch(collection, batch)?;
    }
    Ok(())
}

fn validate_batch(collection: Collection, batch: &Value) -> Result<(), ValidationFailure> {
    let fail = |reason: String| ValidationFailure::new(Some(collection), reason);

    let object = batch
        .as_object()
        .ok_or_else(|| fail("batch must be an object".into()))?;

    for bucket in ["created", "updated"] {
        let Some(entries) = object.get(bucket) else {
            continue;
        };
        let records = entries
            .as_array()
            .ok_or_else(|| fail(format!("{bucket} must be an array")))?;
        for (index, record) in records.iter().enumerate() {
            validate_record(record).map_err(|reason| fail(format!("{bucket}[{index}]: {reason}")))?;
        }
    }

    if let Some(deleted) = object.get("deleted") {
        let ids = deleted
            .as_array()
            .ok_or_else(|| fail("deleted must be an array".into()))?;
        if ids.iter().any(|id| !id.is_string()) {
            return Err(fail("deleted ids must be strings".into()));
        }
    }

    Ok(())
}
