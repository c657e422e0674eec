//! Payload codec for model outputs
//!
//! The model API ships numeric outputs either as plain JSON arrays or, when
//! `model_output_is_encoded` is set, as base64 text wrapping a `.npy` file.
//! Both forms decode into [`NumericArray`]s. Decoding is structure-preserving:
//! nested sequences keep their order and depth, only leaves change.

pub mod array;
pub mod npy;

use std::collections::BTreeMap;

use base64::Engine;
use ndarray::{ArrayD, IxDyn};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::trace;

pub use array::NumericArray;
pub use npy::{read_npy, write_npy, NpyError};

/// Key of the encoding flag in a prediction result
pub const ENCODED_FLAG_KEY: &str = "model_output_is_encoded";
/// Key of the output mapping in a prediction result
pub const OUTPUTS_KEY: &str = "model_outputs";

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Unsupported leaf type {found} at {path}: expected a string or a sequence")]
    UnsupportedLeaf { path: String, found: &'static str },

    #[error("Invalid base64 at {path}: {message}")]
    Base64 { path: String, message: String },

    #[error("Invalid npy payload at {path}: {source}")]
    Npy { path: String, source: NpyError },

    #[error("Ragged array at {path}: nested sequences must have equal lengths")]
    Ragged { path: String },

    #[error("Invalid array shape at {path}: {message}")]
    Shape { path: String, message: String },

    #[error("Unsupported array element {found} at {path}")]
    UnsupportedElement { path: String, found: &'static str },

    #[error("Missing field '{0}' in prediction result")]
    MissingField(&'static str),

    #[error("Field '{field}' has the wrong type: expected {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
}

/// A decoded output: one array, or a sequence mirroring the input nesting
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DecodedValue {
    Array(NumericArray),
    Sequence(Vec<DecodedValue>),
}

impl DecodedValue {
    pub fn as_array(&self) -> Option<&NumericArray> {
        match self {
            Self::Array(a) => Some(a),
            Self::Sequence(_) => None,
        }
    }
}

/// A prediction result with `model_outputs` decoded.
///
/// Any other fields of the task result are kept verbatim in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResponse {
    pub model_outputs: BTreeMap<String, DecodedValue>,
    pub model_output_is_encoded: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ============================================================================
// Decoding
// ============================================================================

/// Decode the `model_outputs` of a prediction task result
pub fn decode_prediction(result: Value) -> Result<PredictionResponse, DecodeError> {
    let mut fields = match result {
        Value::Object(map) => map,
        _ => {
            return Err(DecodeError::WrongType {
                field: "result",
                expected: "an object",
            })
        }
    };

    let encoded = match fields.remove(ENCODED_FLAG_KEY) {
        Some(Value::Bool(flag)) => flag,
        Some(_) => {
            return Err(DecodeError::WrongType {
                field: ENCODED_FLAG_KEY,
                expected: "a boolean",
            })
        }
        None => return Err(DecodeError::MissingField(ENCODED_FLAG_KEY)),
    };

    let outputs = match fields.remove(OUTPUTS_KEY) {
        Some(Value::Object(outputs)) => outputs,
        Some(_) => {
            return Err(DecodeError::WrongType {
                field: OUTPUTS_KEY,
                expected: "an object",
            })
        }
        None => return Err(DecodeError::MissingField(OUTPUTS_KEY)),
    };

    Ok(PredictionResponse {
        model_outputs: decode_outputs(&outputs, encoded)?,
        model_output_is_encoded: encoded,
        extra: fields,
    })
}

/// Decode every entry of an output mapping
pub fn decode_outputs(
    outputs: &Map<String, Value>,
    encoded: bool,
) -> Result<BTreeMap<String, DecodedValue>, DecodeError> {
    outputs
        .iter()
        .map(|(name, value)| {
            let decoded = if encoded {
                decode_encoded(value, name)?
            } else {
                DecodedValue::Array(json_to_array(value, name)?)
            };
            Ok((name.clone(), decoded))
        })
        .collect()
}

/// Recursively decode base64 `.npy` leaves, keeping sequence structure
pub fn decode_encoded(value: &Value, path: &str) -> Result<DecodedValue, DecodeError> {
    match value {
        Value::String(text) => decode_leaf(text, path).map(DecodedValue::Array),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| decode_encoded(item, &format!("{}[{}]", path, i)))
            .collect::<Result<Vec<_>, _>>()
            .map(DecodedValue::Sequence),
        other => Err(DecodeError::UnsupportedLeaf {
            path: path.to_string(),
            found: json_type_name(other),
        }),
    }
}

/// Decode a single base64 `.npy` string
pub fn decode_leaf(text: &str, path: &str) -> Result<NumericArray, DecodeError> {
    // encodebytes-style payloads wrap lines every 76 characters
    let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| DecodeError::Base64 {
            path: path.to_string(),
            message: e.to_string(),
        })?;
    let array = read_npy(&bytes).map_err(|source| DecodeError::Npy {
        path: path.to_string(),
        source,
    })?;
    trace!(path, dtype = array.dtype_name(), shape = ?array.shape(), "Decoded output");
    Ok(array)
}

/// Convert a plain (rectangular) JSON array or scalar into an array.
///
/// Element type follows NumPy inference: all booleans give `Bool`, all
/// integers give `Int64`, anything else numeric gives `Float64`. An empty
/// array is `Float64` with shape `[0]`.
pub fn json_to_array(value: &Value, path: &str) -> Result<NumericArray, DecodeError> {
    let shape = infer_shape(value, path)?;
    let mut leaves = Vec::new();
    flatten_leaves(value, &mut leaves);

    if !leaves.is_empty() && leaves.iter().all(|v| v.is_boolean()) {
        let values = leaves.iter().filter_map(|v| v.as_bool()).collect();
        Ok(NumericArray::Bool(shaped(&shape, values, path)?))
    } else if leaves.iter().any(|v| v.is_boolean()) {
        Err(DecodeError::UnsupportedElement {
            path: path.to_string(),
            found: "mixed boolean",
        })
    } else if !leaves.is_empty() && leaves.iter().all(|v| v.is_i64()) {
        let values = leaves.iter().filter_map(|v| v.as_i64()).collect();
        Ok(NumericArray::Int64(shaped(&shape, values, path)?))
    } else {
        let values = leaves.iter().filter_map(|v| v.as_f64()).collect();
        Ok(NumericArray::Float64(shaped(&shape, values, path)?))
    }
}

fn shaped<T>(shape: &[usize], values: Vec<T>, path: &str) -> Result<ArrayD<T>, DecodeError> {
    ArrayD::from_shape_vec(IxDyn(shape), values).map_err(|e| DecodeError::Shape {
        path: path.to_string(),
        message: e.to_string(),
    })
}

fn infer_shape(value: &Value, path: &str) -> Result<Vec<usize>, DecodeError> {
    match value {
        Value::Number(_) | Value::Bool(_) => Ok(Vec::new()),
        Value::Array(items) => {
            let mut inner: Option<Vec<usize>> = None;
            for (i, item) in items.iter().enumerate() {
                let item_shape = infer_shape(item, &format!("{}[{}]", path, i))?;
                match &inner {
                    Some(expected) if *expected != item_shape => {
                        return Err(DecodeError::Ragged {
                            path: path.to_string(),
                        })
                    }
                    Some(_) => {}
                    None => inner = Some(item_shape),
                }
            }
            let mut shape = vec![items.len()];
            shape.extend(inner.unwrap_or_default());
            Ok(shape)
        }
        other => Err(DecodeError::UnsupportedElement {
            path: path.to_string(),
            found: json_type_name(other),
        }),
    }
}

fn flatten_leaves<'a>(value: &'a Value, out: &mut Vec<&'a Value>) {
    match value {
        Value::Array(items) => items.iter().for_each(|item| flatten_leaves(item, out)),
        leaf => out.push(leaf),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ============================================================================
// Encoding
// ============================================================================

/// Wire form of an encoded output: base64 of a `.npy` payload
pub fn encode_array(array: &NumericArray) -> Result<String, NpyError> {
    Ok(base64::engine::general_purpose::STANDARD.encode(write_npy(array)?))
}
