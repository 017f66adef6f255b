use alloc::{boxed::Box, vec::Vec};
use core::fmt;

/// Types understood by the instruction substrate.
///
/// The set is intentionally small: span tracking only ever moves positions
/// (`i8*`), status codes (`i32`), booleans (`i1`), the parser-instance record
/// and pointers to callbacks around.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Type {
    Void,
    Int(u32),
    /// Opaque per-parser-instance record.
    State,
    Ptr(Box<Type>),
    Func(Box<Signature>),
}

impl Type {
    #[must_use]
    pub fn i1() -> Self {
        Self::Int(1)
    }

    #[must_use]
    pub fn i8() -> Self {
        Self::Int(8)
    }

    #[must_use]
    pub fn i32() -> Self {
        Self::Int(32)
    }

    #[must_use]
    pub fn ptr(self) -> Self {
        Self::Ptr(Box::new(self))
    }

    /// Returns `true` for pointers to functions.
    #[must_use]
    pub fn is_func_ptr(&self) -> bool {
        matches!(self, Self::Ptr(inner) if matches!(**inner, Self::Func(_)))
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Void => f.write_str("void"),
            Self::Int(bits) => write!(f, "i{bits}"),
            Self::State => f.write_str("%state"),
            Self::Ptr(inner) => write!(f, "{inner}*"),
            Self::Func(sig) => {
                write!(f, "{} (", sig.ret)?;
                for (i, param) in sig.params.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{param}")?;
                }
                f.write_str(")")
            }
        }
    }
}

/// Calling convention tag carried by every signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum CallConv {
    /// Functions emitted by the compiler itself.
    Internal,
    /// User code linked in from outside.
    External,
}

impl fmt::Display for CallConv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Internal => "fastcc",
            Self::External => "ccc",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Signature {
    pub ret: Type,
    pub params: Vec<Type>,
    pub cc: CallConv,
}

impl Signature {
    #[must_use]
    pub fn new(ret: Type, params: Vec<Type>, cc: CallConv) -> Self {
        Self { ret, params, cc }
    }

    /// The type of a pointer to a function with this signature.
    #[must_use]
    pub fn ptr_type(&self) -> Type {
        Type::Func(Box::new(self.clone())).ptr()
    }
}

#[cfg(test)]
mod tests {
    use alloc::{string::ToString, vec};

    use super::*;

    #[test]
    fn prints_function_pointer_types() {
        let sig = Signature::new(
            Type::i32(),
            vec![Type::State.ptr(), Type::i8().ptr(), Type::i8().ptr()],
            CallConv::External,
        );
        assert_eq!(sig.ptr_type().to_string(), "i32 (%state*, i8*, i8*)*");
        assert!(sig.ptr_type().is_func_ptr());
        assert!(!Type::i8().ptr().is_func_ptr());
    }
}
