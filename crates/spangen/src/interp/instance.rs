use alloc::vec::Vec;

use crate::ir::{FieldId, FuncRef, StateLayout, StrId, Type};

/// A runtime value.
///
/// Positions are offsets into the buffer of the current call; `None` is the
/// null pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtValue {
    Int(i64),
    Ptr(Option<usize>),
    Func(Option<FuncRef>),
    Str(StrId),
    State,
}

impl RtValue {
    #[must_use]
    pub fn is_null(self) -> bool {
        matches!(self, Self::Ptr(None) | Self::Func(None))
    }

    /// The zero value a fresh instance holds for a field of type `ty`.
    #[must_use]
    pub fn zeroed(ty: &Type) -> Self {
        match ty {
            Type::Ptr(_) if ty.is_func_ptr() => Self::Func(None),
            Type::Ptr(_) => Self::Ptr(None),
            Type::State => Self::State,
            Type::Void | Type::Int(_) | Type::Func(_) => Self::Int(0),
        }
    }
}

/// One parser instance: a runtime value per state field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    values: Vec<RtValue>,
}

impl Instance {
    #[must_use]
    pub fn new(layout: &StateLayout) -> Self {
        Self {
            values: layout.fields().iter().map(|f| RtValue::zeroed(f.ty())).collect(),
        }
    }

    #[must_use]
    pub fn get(&self, field: FieldId) -> Option<RtValue> {
        self.values.get(field.index()).copied()
    }

    /// Looks a field up by name; convenient in tests and diagnostics.
    #[must_use]
    pub fn by_name(&self, layout: &StateLayout, name: &str) -> Option<RtValue> {
        layout.lookup(name).and_then(|f| self.get(f.id()))
    }

    pub(crate) fn set(&mut self, field: FieldId, value: RtValue) -> bool {
        match self.values.get_mut(field.index()) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }
}
