//! Ownership marker
//!
//! Every schema document the operator sends carries `_meta.managed-by`.
//! The operator only updates or deletes remote resources whose observed
//! schema carries exactly this marker.

use crate::error::{OperatorError, Result};
use serde_json::{Map, Value};

/// Object holding the marker inside the schema document
pub const META_FIELD: &str = "_meta";

/// Marker key inside [`META_FIELD`]
pub const MANAGED_BY_FIELD: &str = "managed-by";

/// Identity written into the marker
pub const MANAGED_BY_VALUE: &str = "elasticsearch-objects-operator.xo.90poe.io";

/// Return a copy of `schema` with the ownership marker set
///
/// Other fields, including other `_meta` entries, are kept as they are.
pub fn annotate(schema: &Value) -> Result<Value> {
    let mut document = match schema {
        Value::Object(map) => map.clone(),
        _ => {
            return Err(OperatorError::Structural(
                "schema document must be a JSON object".to_string(),
            ))
        }
    };

    let meta = document
        .entry(META_FIELD)
        .or_insert_with(|| Value::Object(Map::new()));
    let Value::Object(meta) = meta else {
        return Err(OperatorError::Structural(format!(
            "schema field {META_FIELD} must be a JSON object"
        )));
    };
    meta.insert(
        MANAGED_BY_FIELD.to_string(),
        Value::String(MANAGED_BY_VALUE.to_string()),
    );

    Ok(Value::Object(document))
}

/// Whether `schema` carries our marker as a string with the exact identity
pub fn is_owned(schema: &Value) -> bool {
    schema
        .get(META_FIELD)
        .and_then(|meta| meta.get(MANAGED_BY_FIELD))
        .and_then(Value::as_str)
        == Some(MANAGED_BY_VALUE)
}
