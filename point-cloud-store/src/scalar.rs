/// Typed access to the fixed-width numeric kinds stored in user data.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric kind of a user data field.
///
/// The discriminants are written to disk. Never renumber or reuse a code:
/// 3 and 7 belonged to the retired 64-bit integer kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ScalarType {
    Int8 = 0,
    Int16 = 1,
    Int32 = 2,
    UInt8 = 4,
    UInt16 = 5,
    UInt32 = 6,
    Float32 = 8,
    Float64 = 9,
}

impl ScalarType {
    pub const ALL: [ScalarType; 8] = [
        ScalarType::Int8,
        ScalarType::Int16,
        ScalarType::Int32,
        ScalarType::UInt8,
        ScalarType::UInt16,
        ScalarType::UInt32,
        ScalarType::Float32,
        ScalarType::Float64,
    ];

    /// Decode an on-disk type tag. `None` for unknown or retired codes.
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.code() == code)
    }

    pub fn is_valid(code: u8) -> bool {
        Self::from_code(code).is_some()
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    /// Width in bytes.
    pub fn size_of(self) -> usize {
        match self {
            ScalarType::Int8 | ScalarType::UInt8 => 1,
            ScalarType::Int16 | ScalarType::UInt16 => 2,
            ScalarType::Int32 | ScalarType::UInt32 | ScalarType::Float32 => 4,
            ScalarType::Float64 => 8,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ScalarType::Int8 => "int8",
            ScalarType::Int16 => "int16",
            ScalarType::Int32 => "int32",
            ScalarType::UInt8 => "uint8",
            ScalarType::UInt16 => "uint16",
            ScalarType::UInt32 => "uint32",
            ScalarType::Float32 => "float32",
            ScalarType::Float64 => "float64",
        }
    }

    /// GLSL type a shader expression sees a property of this kind as.
    pub fn glsl_type(self) -> &'static str {
        match self {
            ScalarType::Int8 | ScalarType::Int16 | ScalarType::Int32 => "int",
            ScalarType::UInt8 | ScalarType::UInt16 | ScalarType::UInt32 => "uint",
            ScalarType::Float32 => "float",
            ScalarType::Float64 => "double",
        }
    }

    /// Decode one value from the start of `src`. Panics if `src` is shorter
    /// than [`ScalarType::size_of`].
    pub fn read(self, src: &[u8]) -> ScalarValue {
        match self {
            ScalarType::Int8 => ScalarValue::Int8(i8::from_le_bytes(le_bytes(src))),
            ScalarType::Int16 => ScalarValue::Int16(i16::from_le_bytes(le_bytes(src))),
            ScalarType::Int32 => ScalarValue::Int32(i32::from_le_bytes(le_bytes(src))),
            ScalarType::UInt8 => ScalarValue::UInt8(src[0]),
            ScalarType::UInt16 => ScalarValue::UInt16(u16::from_le_bytes(le_bytes(src))),
            ScalarType::UInt32 => ScalarValue::UInt32(u32::from_le_bytes(le_bytes(src))),
            ScalarType::Float32 => ScalarValue::Float32(f32::from_le_bytes(le_bytes(src))),
            ScalarType::Float64 => ScalarValue::Float64(f64::from_le_bytes(le_bytes(src))),
        }
    }

    /// Encode `value` as this kind at the start of `dst`, converting with
    /// `as` semantics (truncating, saturating for float to integer).
    pub fn write(self, dst: &mut [u8], value: ScalarValue) {
        match value.convert_to(self) {
            ScalarValue::Int8(v) => dst[..1].copy_from_slice(&v.to_le_bytes()),
            ScalarValue::Int16(v) => dst[..2].copy_from_slice(&v.to_le_bytes()),
            ScalarValue::Int32(v) => dst[..4].copy_from_slice(&v.to_le_bytes()),
            ScalarValue::UInt8(v) => dst[0] = v,
            ScalarValue::UInt16(v) => dst[..2].copy_from_slice(&v.to_le_bytes()),
            ScalarValue::UInt32(v) => dst[..4].copy_from_slice(&v.to_le_bytes()),
            ScalarValue::Float32(v) => dst[..4].copy_from_slice(&v.to_le_bytes()),
            ScalarValue::Float64(v) => dst[..8].copy_from_slice(&v.to_le_bytes()),
        }
    }

    /// Read and convert to the caller's type.
    pub fn read_as<T: Scalar>(self, src: &[u8]) -> T {
        T::from_value(self.read(src))
    }

    /// Convert from the caller's type and write.
    pub fn write_from<T: Scalar>(self, dst: &mut [u8], value: T) {
        self.write(dst, value.into_value(self))
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn le_bytes<const N: usize>(src: &[u8]) -> [u8; N] {
    let mut bytes = [0u8; N];
    bytes.copy_from_slice(&src[..N]);
    bytes
}

/// A value of exactly one [`ScalarType`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScalarValue {
    Int8(i8),
    Int16(i16),
    Int32(i32),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    Float32(f32),
    Float64(f64),
}

impl ScalarValue {
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            ScalarValue::Int8(_) => ScalarType::Int8,
            ScalarValue::Int16(_) => ScalarType::Int16,
            ScalarValue::Int32(_) => ScalarType::Int32,
            ScalarValue::UInt8(_) => ScalarType::UInt8,
            ScalarValue::UInt16(_) => ScalarType::UInt16,
            ScalarValue::UInt32(_) => ScalarType::UInt32,
            ScalarValue::Float32(_) => ScalarType::Float32,
            ScalarValue::Float64(_) => ScalarType::Float64,
        }
    }

    pub fn convert_to(self, target: ScalarType) -> ScalarValue {
        match target {
            ScalarType::Int8 => ScalarValue::Int8(i8::from_value(self)),
            ScalarType::Int16 => ScalarValue::Int16(i16::from_value(self)),
            ScalarType::Int32 => ScalarValue::Int32(i32::from_value(self)),
            ScalarType::UInt8 => ScalarValue::UInt8(u8::from_value(self)),
            ScalarType::UInt16 => ScalarValue::UInt16(u16::from_value(self)),
            ScalarType::UInt32 => ScalarValue::UInt32(u32::from_value(self)),
            ScalarType::Float32 => ScalarValue::Float32(f32::from_value(self)),
            ScalarType::Float64 => ScalarValue::Float64(f64::from_value(self)),
        }
    }

    /// Widen to the inspection type of the value's family.
    pub fn widen(self) -> FieldValue {
        match self.scalar_type() {
            ScalarType::UInt8 | ScalarType::UInt16 | ScalarType::UInt32 => {
                FieldValue::Unsigned(u64::from_value(self))
            }
            ScalarType::Int8 | ScalarType::Int16 | ScalarType::Int32 => {
                FieldValue::Signed(i64::from_value(self))
            }
            ScalarType::Float32 | ScalarType::Float64 => FieldValue::Float(f64::from_value(self)),
        }
    }
}

/// A user data value widened to 64 bits for inspection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Signed(i64),
    Unsigned(u64),
    Float(f64),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Signed(v) => write!(f, "{}", v),
            FieldValue::Unsigned(v) => write!(f, "{}", v),
            FieldValue::Float(v) => write!(f, "{}", v),
        }
    }
}

/// Rust numeric types that convert to and from every [`ScalarType`].
pub trait Scalar: Copy {
    fn from_value(value: ScalarValue) -> Self;
    fn into_value(self, target: ScalarType) -> ScalarValue;
}

macro_rules! impl_scalar {
    ($($t:ty),*) => {
        $(
            impl Scalar for $t {
                fn from_value(value: ScalarValue) -> Self {
                    match value {
                        ScalarValue::Int8(v) => v as $t,
                        ScalarValue::Int16(v) => v as $t,
                        ScalarValue::Int32(v) => v as $t,
                        ScalarValue::UInt8(v) => v as $t,
                        ScalarValue::UInt16(v) => v as $t,
                        ScalarValue::UInt32(v) => v as $t,
                        ScalarValue::Float32(v) => v as $t,
                        ScalarValue::Float64(v) => v as $t,
                    }
                }

                fn into_value(self, target: ScalarType) -> ScalarValue {
                    match target {
                        ScalarType::Int8 => ScalarValue::Int8(self as i8),
                        ScalarType::Int16 => ScalarValue::Int16(self as i16),
                        ScalarType::Int32 => ScalarValue::Int32(self as i32),
                        ScalarType::UInt8 => ScalarValue::UInt8(self as u8),
                        ScalarType::UInt16 => ScalarValue::UInt16(self as u16),
                        ScalarType::UInt32 => ScalarValue::UInt32(self as u32),
                        ScalarType::Float32 => ScalarValue::Float32(self as f32),
                        ScalarType::Float64 => ScalarValue::Float64(self as f64),
                    }
                }
            }
        )*
    };
}

impl_scalar!(i8, i16, i32, i64, u8, u16, u32, u64, f32, f64);
