//! Strict-JSON float handling.
//!
//! Upstream series occasionally carry NaN or infinite values (missing
//! quotes, zero-denominator ratios). Strict JSON has no spelling for them, so
//! every document passes through `sanitize` before it is written: the result
//! is a `serde_json::Value` tree in which each non-finite float has become
//! `null` and everything else is unchanged.
//!
//! `nan_if_null` is the inverse used when a persisted document is loaded back
//! into typed `f64` fields.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Convert `value` into a JSON tree with every non-finite float replaced by
/// `null`. Maps, sequences and all finite scalars come through untouched.
pub fn sanitize<T: Serialize + ?Sized>(value: &T) -> Result<Value, serde_json::Error> {
    // `Value` has no representation for NaN or infinity: the `Value`
    // serializer emits `Null` for them at any depth.
    serde_json::to_value(value)
}

/// Sanitize and render as UTF-8 JSON with two-space indentation. Non-ASCII
/// text is written as-is, not escaped.
pub fn to_pretty_json<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&sanitize(value)?)
}

/// Deserialize an `f64` that a previous sanitize pass may have nulled.
pub fn nan_if_null<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}
