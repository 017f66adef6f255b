use alloc::{
    collections::BTreeMap,
    string::{String, ToString},
    vec::Vec,
};

use bstr::{BStr, BString, ByteSlice};

use super::{Function, Signature, Type};
use crate::CodegenError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FieldId(u32);

impl FieldId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A declared slot of the parser-instance record.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Field {
    id: FieldId,
    name: String,
    ty: Type,
}

impl Field {
    #[must_use]
    pub fn id(&self) -> FieldId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn ty(&self) -> &Type {
        &self.ty
    }
}

/// Ordered field list of the parser-instance record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct StateLayout {
    fields: Vec<Field>,
}

impl StateLayout {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares `name` with type `ty`, or returns the existing field when it
    /// was already declared with the same type.
    ///
    /// # Errors
    ///
    /// [`CodegenError::FieldTypeConflict`] if `name` exists with another type.
    pub fn declare(&mut self, name: &str, ty: Type) -> Result<Field, CodegenError> {
        if let Some(existing) = self.lookup(name) {
            if existing.ty != ty {
                return Err(CodegenError::FieldTypeConflict {
                    name: name.to_string(),
                    existing: existing.ty.clone(),
                    requested: ty,
                });
            }
            return Ok(existing.clone());
        }

        let field = Field {
            id: FieldId(u32::try_from(self.fields.len()).unwrap_or(u32::MAX)),
            name: name.to_string(),
            ty,
        };
        self.fields.push(field.clone());
        Ok(field)
    }

    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    #[must_use]
    pub fn get(&self, id: FieldId) -> Option<&Field> {
        self.fields.get(id.index())
    }

    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FuncRef(u32);

impl FuncRef {
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FuncDecl {
    pub name: String,
    pub sig: Signature,
}

/// Handle to an interned, null-terminated string literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct StrId(u32);

impl StrId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A compilation unit: state layout, declared functions, string literals and
/// the bodies defined so far.
#[derive(Debug, Clone, Default)]
pub struct Module {
    state: StateLayout,
    decls: Vec<FuncDecl>,
    strings: Vec<BString>,
    bodies: BTreeMap<FuncRef, Function>,
}

impl Module {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> &StateLayout {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut StateLayout {
        &mut self.state
    }

    /// Declares a function. Redeclaring with an identical signature returns
    /// the existing reference.
    ///
    /// # Errors
    ///
    /// [`CodegenError::FunctionRedeclared`] if the name is taken by a function
    /// with another signature.
    pub fn declare_function(&mut self, name: &str, sig: Signature) -> Result<FuncRef, CodegenError> {
        if let Some(existing) = self.lookup_function(name) {
            if self.decls[existing.index()].sig != sig {
                return Err(CodegenError::FunctionRedeclared(name.to_string()));
            }
            return Ok(existing);
        }
        let id = FuncRef(u32::try_from(self.decls.len()).unwrap_or(u32::MAX));
        self.decls.push(FuncDecl {
            name: name.to_string(),
            sig,
        });
        Ok(id)
    }

    #[must_use]
    pub fn lookup_function(&self, name: &str) -> Option<FuncRef> {
        self.decls
            .iter()
            .position(|d| d.name == name)
            .and_then(|i| u32::try_from(i).ok())
            .map(FuncRef)
    }

    #[must_use]
    pub fn function(&self, id: FuncRef) -> Option<&FuncDecl> {
        self.decls.get(id.index())
    }

    pub fn functions(&self) -> impl Iterator<Item = (FuncRef, &FuncDecl)> {
        (0u32..).map(FuncRef).zip(self.decls.iter())
    }

    /// Interns a string literal. The terminating NUL is implicit.
    ///
    /// # Errors
    ///
    /// [`CodegenError::InteriorNul`] if `text` contains a NUL byte.
    pub fn intern_cstr(&mut self, text: &str) -> Result<StrId, CodegenError> {
        let bytes = text.as_bytes();
        if bytes.find_byte(0).is_some() {
            return Err(CodegenError::InteriorNul);
        }
        if let Some(i) = self.strings.iter().position(|s| s.as_slice() == bytes) {
            return Ok(StrId(u32::try_from(i).unwrap_or(u32::MAX)));
        }
        let id = StrId(u32::try_from(self.strings.len()).unwrap_or(u32::MAX));
        self.strings.push(BString::from(bytes));
        Ok(id)
    }

    #[must_use]
    pub fn cstr(&self, id: StrId) -> Option<&BStr> {
        self.strings.get(id.index()).map(BStr::new)
    }

    pub fn strings(&self) -> impl Iterator<Item = (StrId, &BStr)> {
        (0u32..)
            .map(StrId)
            .zip(self.strings.iter().map(BStr::new))
    }

    /// Attaches a finished body to its declaration.
    ///
    /// # Errors
    ///
    /// Fails if the body does not verify, its signature differs from the
    /// declaration, or the function already has a body.
    pub fn define(&mut self, func: Function) -> Result<(), CodegenError> {
        func.verify()?;
        let decl = self
            .function(func.id())
            .ok_or_else(|| CodegenError::NotParserFunction(func.name().to_string()))?;
        if decl.sig != *func.signature() || decl.name != func.name() {
            return Err(CodegenError::FunctionRedeclared(func.name().to_string()));
        }
        if self.bodies.contains_key(&func.id()) {
            return Err(CodegenError::DuplicateBody(func.name().to_string()));
        }
        self.bodies.insert(func.id(), func);
        Ok(())
    }

    #[must_use]
    pub fn body(&self, id: FuncRef) -> Option<&Function> {
        self.bodies.get(&id)
    }

    pub fn bodies(&self) -> impl Iterator<Item = &Function> {
        self.bodies.values()
    }
}
