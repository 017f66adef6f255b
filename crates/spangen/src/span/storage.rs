use alloc::{format, vec::Vec};

use tracing::debug;

use super::{SpanAllocation, SpanId};
use crate::{
    CodegenError,
    ir::{Field, FuncRef, Module, Signature, Type},
};

/// How the callback of an open span is reached when only its color is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// The callee is known while generating code.
    Direct(FuncRef),
    /// The callee was stored in `slot` when the span opened; it is one of
    /// `candidates`.
    Indirect { slot: Field, candidates: Vec<FuncRef> },
}

/// Persistent storage of one color.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorStorage {
    members: Vec<SpanId>,
    callbacks: Vec<FuncRef>,
    signature: Signature,
    start: Field,
    callback: Option<Field>,
    dispatch: Dispatch,
}

impl ColorStorage {
    #[must_use]
    pub fn members(&self) -> &[SpanId] {
        &self.members
    }

    /// Callbacks of the members, in member order, without repetitions.
    #[must_use]
    pub fn callbacks(&self) -> &[FuncRef] {
        &self.callbacks
    }

    /// The signature every member callback shares.
    #[must_use]
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// `_span_pos{i}`: start of the open span, null when none is open.
    #[must_use]
    pub fn start(&self) -> &Field {
        &self.start
    }

    /// `_span_cb{i}`: which member opened the span. Only present when the
    /// color has more than one member.
    #[must_use]
    pub fn callback(&self) -> Option<&Field> {
        self.callback.as_ref()
    }

    #[must_use]
    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }
}

/// Storage layout of all colors, indexed by color.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanStorage {
    colors: Vec<ColorStorage>,
}

impl SpanStorage {
    /// Declares the per-color fields in `module`'s state layout.
    ///
    /// # Errors
    ///
    /// Fails if a member's callback is undeclared, if members of one color
    /// disagree on the callback signature, or if a field name is already
    /// taken with another type.
    pub fn plan(module: &mut Module, allocation: &SpanAllocation) -> Result<Self, CodegenError> {
        let mut colors = Vec::with_capacity(allocation.concurrency().len());

        for (index, members) in allocation.concurrency().iter().enumerate() {
            let mut callbacks: Vec<FuncRef> = Vec::with_capacity(members.len());
            let mut first: Option<(&str, FuncRef, Signature)> = None;

            for &member in members {
                let decl = allocation
                    .span(member)
                    .ok_or(CodegenError::UnknownSpan(member.0))?;
                let callee = module
                    .function(decl.callback)
                    .ok_or_else(|| CodegenError::UndeclaredCallback(decl.name.clone()))?;

                match &first {
                    None => first = Some((decl.name.as_str(), decl.callback, callee.sig.clone())),
                    Some((name, _, sig)) if *sig != callee.sig => {
                        return Err(CodegenError::MixedSignatures {
                            color: index,
                            first: (*name).into(),
                            other: decl.name.clone(),
                        });
                    }
                    Some(_) => {}
                }
                if !callbacks.contains(&decl.callback) {
                    callbacks.push(decl.callback);
                }
            }

            let Some((_, first_callback, signature)) = first else {
                return Err(CodegenError::EmptyColor(index));
            };

            let state = module.state_mut();
            let start = state.declare(&format!("_span_pos{index}"), Type::i8().ptr())?;
            let callback = if members.len() > 1 {
                Some(state.declare(&format!("_span_cb{index}"), signature.ptr_type())?)
            } else {
                None
            };

            let dispatch = match &callback {
                Some(slot) => Dispatch::Indirect {
                    slot: slot.clone(),
                    candidates: callbacks.clone(),
                },
                None => Dispatch::Direct(first_callback),
            };

            debug!(
                color = index,
                members = members.len(),
                shared = callback.is_some(),
                "planned span storage"
            );

            colors.push(ColorStorage {
                members: members.clone(),
                callbacks,
                signature,
                start,
                callback,
                dispatch,
            });
        }

        Ok(Self { colors })
    }

    #[must_use]
    pub fn colors(&self) -> &[ColorStorage] {
        &self.colors
    }

    #[must_use]
    pub fn color(&self, index: usize) -> Option<&ColorStorage> {
        self.colors.get(index)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::{context::callback_signature, ir::CallConv};

    fn allocation(module: &mut Module, shape: &[usize]) -> SpanAllocation {
        let mut b = SpanAllocation::builder();
        for (color, &members) in shape.iter().enumerate() {
            let ids: Vec<_> = (0..members)
                .map(|m| {
                    let name = format!("on_{color}_{m}");
                    let cb = module
                        .declare_function(&name, callback_signature(CallConv::External))
                        .unwrap();
                    b.span(name, cb)
                })
                .collect();
            b.color(ids);
        }
        b.build().unwrap()
    }

    #[rstest]
    #[case::single(&[1], 1)]
    #[case::shared(&[2], 2)]
    #[case::mixed(&[1, 3, 1, 2], 6)]
    fn declares_callback_slot_only_for_shared_colors(#[case] shape: &[usize], #[case] fields: usize) {
        let mut module = Module::new();
        let alloc = allocation(&mut module, shape);
        let storage = SpanStorage::plan(&mut module, &alloc).unwrap();

        assert_eq!(module.state().len(), fields);
        for (index, (color, &members)) in storage.colors().iter().zip(shape).enumerate() {
            assert_eq!(color.members(), alloc.concurrency()[index]);
            assert_eq!(color.start().name(), format!("_span_pos{index}"));
            assert_eq!(color.callback().is_some(), members > 1);
            assert_eq!(color.callbacks().len(), members);
            assert_eq!(matches!(color.dispatch(), Dispatch::Indirect { .. }), members > 1);
        }
    }

    #[test]
    fn planning_twice_reuses_fields() {
        let mut module = Module::new();
        let alloc = allocation(&mut module, &[2, 1]);
        let first = SpanStorage::plan(&mut module, &alloc).unwrap();
        let second = SpanStorage::plan(&mut module, &alloc).unwrap();
        assert_eq!(first, second);
        assert_eq!(module.state().len(), 3);
    }

    #[test]
    fn shared_color_needs_one_signature() {
        let mut module = Module::new();
        let a = module
            .declare_function("on_a", callback_signature(CallConv::External))
            .unwrap();
        let b = module
            .declare_function("on_b", callback_signature(CallConv::Internal))
            .unwrap();
        let mut builder = SpanAllocation::builder();
        let sa = builder.span("a", a);
        let sb = builder.span("b", b);
        builder.color([sa, sb]);
        let alloc = builder.build().unwrap();

        assert_eq!(
            SpanStorage::plan(&mut module, &alloc),
            Err(CodegenError::MixedSignatures {
                color: 0,
                first: "a".into(),
                other: "b".into(),
            })
        );
    }
}
