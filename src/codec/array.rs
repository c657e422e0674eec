//! Decoded numeric arrays
//!
//! One `ndarray::ArrayD` per element type, mirroring the dtypes a `.npy`
//! payload can carry.

use ndarray::{ArrayD, ArrayViewD, Axis};
use serde::{Serialize, Serializer};
use serde_json::Value;

/// An n-dimensional array of one of the supported element types
#[derive(Debug, Clone, PartialEq)]
pub enum NumericArray {
    Bool(ArrayD<bool>),
    Int8(ArrayD<i8>),
    Int16(ArrayD<i16>),
    Int32(ArrayD<i32>),
    Int64(ArrayD<i64>),
    UInt8(ArrayD<u8>),
    UInt16(ArrayD<u16>),
    UInt32(ArrayD<u32>),
    UInt64(ArrayD<u64>),
    Float32(ArrayD<f32>),
    Float64(ArrayD<f64>),
}

/// Evaluate `$body` with `$array` bound to the inner `ArrayD` of any variant
macro_rules! each_array {
    ($value:expr, $array:ident => $body:expr) => {
        match $value {
            NumericArray::Bool($array) => $body,
            NumericArray::Int8($array) => $body,
            NumericArray::Int16($array) => $body,
            NumericArray::Int32($array) => $body,
            NumericArray::Int64($array) => $body,
            NumericArray::UInt8($array) => $body,
            NumericArray::UInt16($array) => $body,
            NumericArray::UInt32($array) => $body,
            NumericArray::UInt64($array) => $body,
            NumericArray::Float32($array) => $body,
            NumericArray::Float64($array) => $body,
        }
    };
}

pub(crate) use each_array;

impl NumericArray {
    pub fn shape(&self) -> &[usize] {
        each_array!(self, a => a.shape())
    }

    /// NumPy-style name of the element type
    pub fn dtype_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int8(_) => "int8",
            Self::Int16(_) => "int16",
            Self::Int32(_) => "int32",
            Self::Int64(_) => "int64",
            Self::UInt8(_) => "uint8",
            Self::UInt16(_) => "uint16",
            Self::UInt32(_) => "uint32",
            Self::UInt64(_) => "uint64",
            Self::Float32(_) => "float32",
            Self::Float64(_) => "float64",
        }
    }

    /// Plain JSON form, nested to match the shape (a bare value for 0-d).
    ///
    /// Non-finite floats become `null`.
    pub fn to_json(&self) -> Value {
        each_array!(self, a => nest(a.view()))
    }
}

fn nest<T>(view: ArrayViewD<'_, T>) -> Value
where
    T: Copy + Into<Value>,
{
    if view.ndim() == 0 {
        return view.iter().next().map(|x| (*x).into()).unwrap_or(Value::Null);
    }
    Value::Array(view.axis_iter(Axis(0)).map(nest).collect())
}

impl Serialize for NumericArray {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}
