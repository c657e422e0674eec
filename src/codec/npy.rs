//! `.npy` payloads
//!
//! Parsing and writing are left to `ndarray-npy`; this module picks the
//! element type a payload declares and refuses shapes the payload cannot
//! hold before any array is allocated.

use ndarray::ArrayD;
use ndarray_npy::{ReadNpyError, ReadNpyExt, WriteNpyError, WriteNpyExt};
use py_literal::Value as PyValue;
use thiserror::Error;

use super::array::{each_array, NumericArray};

const MAGIC: &[u8] = b"\x93NUMPY";

#[derive(Error, Debug)]
pub enum NpyError {
    #[error(transparent)]
    Read(#[from] ReadNpyError),

    #[error(transparent)]
    Write(#[from] WriteNpyError),

    #[error("Unsupported dtype {0}")]
    UnsupportedDtype(String),

    #[error("Header declares shape {shape} but only {available} data bytes follow")]
    DeclaredLength { shape: String, available: usize },
}

/// Read a `.npy` file of any supported element type
pub fn read_npy(bytes: &[u8]) -> Result<NumericArray, NpyError> {
    check_declared_len(bytes)?;
    let mut descr = String::new();

    macro_rules! try_as {
        ($($variant:ident: $elem:ty),* $(,)?) => {$(
            match ArrayD::<$elem>::read_npy(bytes) {
                Ok(array) => return Ok(NumericArray::$variant(array)),
                Err(ReadNpyError::WrongDescriptor(found)) if descr.is_empty() => {
                    descr = match found {
                        PyValue::String(s) => s,
                        other => format!("{:?}", other),
                    }
                }
                Err(ReadNpyError::WrongDescriptor(_)) => {}
                Err(e) => return Err(e.into()),
            }
        )*};
    }

    try_as!(
        Float32: f32,
        Float64: f64,
        Int64: i64,
        Int32: i32,
        Bool: bool,
        Int8: i8,
        Int16: i16,
        UInt8: u8,
        UInt16: u16,
        UInt32: u32,
        UInt64: u64,
    );

    Err(NpyError::UnsupportedDtype(descr))
}

/// Header text and the offset of the first data byte
fn split_header(bytes: &[u8]) -> Option<(&str, usize)> {
    let rest = bytes.strip_prefix(MAGIC)?;
    let (header_len, data_start) = match rest.first()? {
        1 => (u16::from_le_bytes([*rest.get(2)?, *rest.get(3)?]) as usize, 10usize),
        _ => (u32::from_le_bytes(rest.get(2..6)?.try_into().ok()?) as usize, 12),
    };
    let end = data_start.checked_add(header_len)?;
    let header = std::str::from_utf8(bytes.get(data_start..end)?).ok()?;
    Some((header, end))
}

/// Every element takes at least one byte, so the element count the header
/// declares can never exceed the bytes after it.
///
/// Headers this cannot make sense of are left for `ndarray-npy` to reject.
fn check_declared_len(bytes: &[u8]) -> Result<(), NpyError> {
    let Some((header, data_start)) = split_header(bytes) else {
        return Ok(());
    };
    let Ok(PyValue::Dict(entries)) = header.trim().parse::<PyValue>() else {
        return Ok(());
    };
    let shape = entries.iter().find_map(|(key, value)| match (key, value) {
        (PyValue::String(key), PyValue::Tuple(dims)) if key == "shape" => Some(dims),
        _ => None,
    });
    let Some(shape) = shape else {
        return Ok(());
    };

    let available = bytes.len() - data_start;
    let declared = shape.iter().try_fold(1usize, |count, dim| match dim {
        PyValue::Integer(n) => usize::try_from(n).ok().and_then(|n| count.checked_mul(n)),
        _ => None,
    });
    match declared {
        Some(count) if count <= available => Ok(()),
        _ => Err(NpyError::DeclaredLength {
            shape: format!("{:?}", shape),
            available,
        }),
    }
}

/// Write an array as a `.npy` file
pub fn write_npy(array: &NumericArray) -> Result<Vec<u8>, NpyError> {
    let mut bytes = Vec::new();
    each_array!(array, a => a.write_npy(&mut bytes))?;
    Ok(bytes)
}
