use std::fmt;

use serde::{Deserialize, Serialize};

/// Scalar element types carried by node outputs.
///
/// `Dynamic` is the "not yet known" element type; it merges with every other type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementType {
    Dynamic,
    Boolean,
    Bf16,
    F16,
    F32,
    F64,
    I8,
    I16,
    I32,
    I64,
    U1,
    U8,
    U16,
    U32,
    U64,
}

impl ElementType {
    pub fn is_dynamic(self) -> bool {
        matches!(self, ElementType::Dynamic)
    }

    pub fn is_static(self) -> bool {
        !self.is_dynamic()
    }

    /// Returns `true` for integer types usable as shape or index values (booleans excluded).
    pub fn is_integral_number(self) -> bool {
        matches!(
            self,
            ElementType::I8
                | ElementType::I16
                | ElementType::I32
                | ElementType::I64
                | ElementType::U1
                | ElementType::U8
                | ElementType::U16
                | ElementType::U32
                | ElementType::U64
        )
    }

    /// Returns the storage bit-width, `None` for the dynamic type.
    pub fn bitwidth(self) -> Option<usize> {
        match self {
            ElementType::Dynamic => None,
            ElementType::U1 => Some(1),
            ElementType::Boolean | ElementType::I8 | ElementType::U8 => Some(8),
            ElementType::Bf16 | ElementType::F16 | ElementType::I16 | ElementType::U16 => {
                Some(16)
            }
            ElementType::F32 | ElementType::I32 | ElementType::U32 => Some(32),
            ElementType::F64 | ElementType::I64 | ElementType::U64 => Some(64),
        }
    }

    /// Returns the size in bytes when the type occupies whole bytes.
    pub fn size_in_bytes(self) -> Option<usize> {
        match self {
            ElementType::U1 | ElementType::Dynamic => None,
            other => other.bitwidth().map(|bits| bits / 8),
        }
    }

    /// Unifies two element types: dynamic yields to the other side, static types must agree.
    pub fn merge(self, other: ElementType) -> Option<ElementType> {
        match (self, other) {
            (ElementType::Dynamic, other) | (other, ElementType::Dynamic) => Some(other),
            (lhs, rhs) if lhs == rhs => Some(lhs),
            _ => None,
        }
    }

    pub fn compatible(self, other: ElementType) -> bool {
        self.merge(other).is_some()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ElementType::Dynamic => "dynamic",
            ElementType::Boolean => "boolean",
            ElementType::Bf16 => "bf16",
            ElementType::F16 => "f16",
            ElementType::F32 => "f32",
            ElementType::F64 => "f64",
            ElementType::I8 => "i8",
            ElementType::I16 => "i16",
            ElementType::I32 => "i32",
            ElementType::I64 => "i64",
            ElementType::U1 => "u1",
            ElementType::U8 => "u8",
            ElementType::U16 => "u16",
            ElementType::U32 => "u32",
            ElementType::U64 => "u64",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
