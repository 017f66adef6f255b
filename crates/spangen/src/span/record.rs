use crate::{
    CodegenError,
    context::SharedFields,
    ir::{BlockId, Constant, Field, Function, Module, Operand, StrId},
};

/// Fills the instance-wide error slot: `error`, `reason` and `error_pos`.
///
/// The slot holds one error; each recording overwrites the previous one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    error: Field,
    reason: Field,
    error_pos: Field,
    message: StrId,
}

impl ErrorRecord {
    /// # Errors
    ///
    /// [`CodegenError::InteriorNul`] if `message` contains a NUL byte.
    pub fn new(module: &mut Module, shared: &SharedFields, message: &str) -> Result<Self, CodegenError> {
        Ok(Self {
            error: shared.error.clone(),
            reason: shared.reason.clone(),
            error_pos: shared.error_pos.clone(),
            message: module.intern_cstr(message)?,
        })
    }

    #[must_use]
    pub fn message(&self) -> StrId {
        self.message
    }

    /// Emits the three stores. Straight-line; `block` stays open.
    pub fn record(&self, func: &mut Function, block: BlockId, pos: Operand, code: Operand) {
        func.store(block, &self.error, code);
        func.store(block, &self.reason, Constant::Str(self.message));
        func.store(block, &self.error_pos, pos);
    }
}
