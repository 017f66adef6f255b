//! Compilation context and the parser function ABI.
//!
//! Every parser function, node functions and the per-call entry point alike,
//! has the shape `i32 (%state*, i8* pos, i8* endpos)`. Span callbacks share
//! the parameter list and return a status code where zero means success.

use alloc::{string::ToString, vec};

use crate::{
    CodegenError, CodegenOptions,
    ir::{CallConv, Field, FuncRef, Function, Module, Operand, Signature, StateLayout, Type},
};

/// Parameter names of parser functions, in ABI order.
pub const PARSER_PARAMS: [&str; 3] = ["state", "pos", "endpos"];

pub const CURRENT_FIELD: &str = "_current";
pub const ERROR_FIELD: &str = "error";
pub const REASON_FIELD: &str = "reason";
pub const ERROR_POS_FIELD: &str = "error_pos";

#[must_use]
pub fn state_arg() -> Operand {
    Operand::Param(0)
}

#[must_use]
pub fn pos_arg() -> Operand {
    Operand::Param(1)
}

#[must_use]
pub fn end_pos_arg() -> Operand {
    Operand::Param(2)
}

#[must_use]
pub fn parser_signature() -> Signature {
    callback_signature(CallConv::Internal)
}

#[must_use]
pub fn callback_signature(cc: CallConv) -> Signature {
    Signature::new(
        Type::i32(),
        vec![Type::State.ptr(), Type::i8().ptr(), Type::i8().ptr()],
        cc,
    )
}

/// State fields shared by every part of the compiler, looked up by name once
/// and then addressed by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedFields {
    pub current: Field,
    pub error: Field,
    pub reason: Field,
    pub error_pos: Field,
}

impl SharedFields {
    fn expected() -> [(&'static str, Type); 4] {
        [
            (CURRENT_FIELD, parser_signature().ptr_type()),
            (ERROR_FIELD, Type::i32()),
            (REASON_FIELD, Type::i8().ptr()),
            (ERROR_POS_FIELD, Type::i8().ptr()),
        ]
    }

    /// Declares the shared fields, keeping any that already exist with the
    /// right type.
    ///
    /// # Errors
    ///
    /// [`CodegenError::FieldTypeConflict`] if a name is taken with another
    /// type.
    pub fn declare(layout: &mut StateLayout) -> Result<Self, CodegenError> {
        let [current, error, reason, error_pos] =
            Self::expected().map(|(name, ty)| layout.declare(name, ty));
        Ok(Self {
            current: current?,
            error: error?,
            reason: reason?,
            error_pos: error_pos?,
        })
    }

    /// Looks the shared fields up in a layout owned by someone else.
    ///
    /// # Errors
    ///
    /// [`CodegenError::MissingStateField`] or
    /// [`CodegenError::StateFieldType`].
    pub fn resolve(layout: &StateLayout) -> Result<Self, CodegenError> {
        let [current, error, reason, error_pos] = Self::expected().map(|(name, ty)| {
            let field = layout
                .lookup(name)
                .ok_or_else(|| CodegenError::MissingStateField(name.to_string()))?;
            if *field.ty() != ty {
                return Err(CodegenError::StateFieldType {
                    name: name.to_string(),
                    expected: ty,
                    found: field.ty().clone(),
                });
            }
            Ok(field.clone())
        });
        Ok(Self {
            current: current?,
            error: error?,
            reason: reason?,
            error_pos: error_pos?,
        })
    }
}

/// Owns the module being generated and the options that shape it.
#[derive(Debug, Clone)]
pub struct Compilation {
    module: Module,
    options: CodegenOptions,
}

impl Compilation {
    /// Starts a fresh module with the shared state fields declared.
    ///
    /// # Errors
    ///
    /// Never fails for a fresh module; see [`Compilation::with_module`].
    pub fn new(options: CodegenOptions) -> Result<Self, CodegenError> {
        Self::with_module(Module::new(), options)
    }

    /// Wraps an existing module, declaring any missing shared fields.
    ///
    /// # Errors
    ///
    /// [`CodegenError::FieldTypeConflict`] if the module already uses one of
    /// the shared names with another type.
    pub fn with_module(mut module: Module, options: CodegenOptions) -> Result<Self, CodegenError> {
        SharedFields::declare(module.state_mut())?;
        Ok(Self { module, options })
    }

    #[must_use]
    pub fn options(&self) -> &CodegenOptions {
        &self.options
    }

    #[must_use]
    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn module_mut(&mut self) -> &mut Module {
        &mut self.module
    }

    #[must_use]
    pub fn into_module(self) -> Module {
        self.module
    }

    /// # Errors
    ///
    /// [`CodegenError::FunctionRedeclared`] if `name` has another signature.
    pub fn declare_parser_function(&mut self, name: &str) -> Result<FuncRef, CodegenError> {
        self.module.declare_function(name, parser_signature())
    }

    /// # Errors
    ///
    /// [`CodegenError::FunctionRedeclared`] if `name` has another signature.
    pub fn declare_callback(&mut self, name: &str, cc: CallConv) -> Result<FuncRef, CodegenError> {
        self.module.declare_function(name, callback_signature(cc))
    }

    /// Opens a body for a declared parser function.
    ///
    /// # Errors
    ///
    /// [`CodegenError::NotParserFunction`] if `id` is unknown or has another
    /// signature.
    pub fn parser_function(&self, id: FuncRef) -> Result<Function, CodegenError> {
        let decl = self
            .module
            .function(id)
            .ok_or_else(|| CodegenError::NotParserFunction(alloc::format!("fn{}", id.index())))?;
        if decl.sig != parser_signature() {
            return Err(CodegenError::NotParserFunction(decl.name.clone()));
        }
        Ok(Function::new(id, &decl.name, decl.sig.clone(), &PARSER_PARAMS))
    }

    /// # Errors
    ///
    /// See [`Module::define`].
    pub fn define(&mut self, func: Function) -> Result<(), CodegenError> {
        self.module.define(func)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_fields_are_declared_once() {
        let mut ctx = Compilation::new(CodegenOptions::default()).unwrap();
        assert_eq!(ctx.module().state().len(), 4);

        let module = core::mem::take(ctx.module_mut());
        let ctx = Compilation::with_module(module, CodegenOptions::default()).unwrap();
        assert_eq!(ctx.module().state().len(), 4);

        let shared = SharedFields::resolve(ctx.module().state()).unwrap();
        assert_eq!(shared.error.name(), "error");
        assert_eq!(*shared.current.ty(), parser_signature().ptr_type());
    }

    #[test]
    fn mistyped_shared_field_is_reported() {
        let mut layout = StateLayout::new();
        layout.declare(CURRENT_FIELD, Type::i8().ptr()).unwrap();
        layout.declare(ERROR_FIELD, Type::i8()).unwrap();

        let err = SharedFields::resolve(&layout).unwrap_err();
        assert_eq!(
            err,
            CodegenError::StateFieldType {
                name: CURRENT_FIELD.into(),
                expected: parser_signature().ptr_type(),
                found: Type::i8().ptr(),
            }
        );
        assert!(matches!(
            SharedFields::declare(&mut layout),
            Err(CodegenError::FieldTypeConflict { .. })
        ));
    }

    #[test]
    fn missing_shared_field_is_reported() {
        assert_eq!(
            SharedFields::resolve(&StateLayout::new()),
            Err(CodegenError::MissingStateField(CURRENT_FIELD.into()))
        );
    }

    #[test]
    fn callbacks_are_not_parser_functions() {
        let mut ctx = Compilation::new(CodegenOptions::default()).unwrap();
        let cb = ctx.declare_callback("on_url", CallConv::External).unwrap();
        let node = ctx.declare_parser_function("s_url").unwrap();

        assert_eq!(
            ctx.parser_function(cb),
            Err(CodegenError::NotParserFunction("on_url".into()))
        );
        let body = ctx.parser_function(node).unwrap();
        assert_eq!(body.param_names()[1], "pos");
    }
}
