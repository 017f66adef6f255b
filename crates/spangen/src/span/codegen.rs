//! Lowering of span events into the instruction substrate.
//!
//! A color's `start` slot is null exactly when none of its spans is open.
//! Positions in it are relative to the buffer of the current call, so the
//! prologue rebases open spans to the new buffer and the epilogue flushes them
//! without closing them: a field split across buffers reaches its callback
//! once per buffer.

use alloc::{format, vec, vec::Vec};

use tracing::{debug, trace};

use super::{ColorStorage, Dispatch, ErrorRecord, SpanAllocation, SpanDecl, SpanId, SpanStorage};
use crate::{
    CodegenError, Compilation,
    context::{SharedFields, end_pos_arg, parser_signature, pos_arg, state_arg},
    ir::{
        BlockId, BranchHint, Constant, Field, FuncRef, Function, IntPredicate, Metadata, Module,
        Operand, Signature, Type,
    },
};

impl Dispatch {
    fn emit(
        &self,
        func: &mut Function,
        block: BlockId,
        sig: &Signature,
        args: Vec<Operand>,
        callee_hints: bool,
    ) -> Operand {
        match self {
            Self::Direct(target) => func.call(block, Constant::Func(*target), sig, args, None),
            Self::Indirect { slot, candidates } => {
                let target = func.load(block, slot);
                let hint = callee_hints.then(|| Metadata::Callees(candidates.clone()));
                func.call(block, target, sig, args, hint)
            }
        }
    }
}

/// Result of [`SpanCodegen::span_end`].
#[derive(Debug)]
#[must_use]
pub struct SpanEnd {
    /// Where parsing continues after the callback succeeded.
    pub next: BlockId,
    /// The failure path. It has the error recorded but is not terminated.
    pub on_error: PendingResume,
}

/// Failure path of a span end, waiting for its resumption target.
#[derive(Debug)]
#[must_use = "the failure block stays unterminated until `resume_at` is called"]
pub struct PendingResume {
    block: BlockId,
    current: Field,
    sentinel: Constant,
}

impl PendingResume {
    /// The failure block, inside the function the span end was emitted into.
    #[must_use]
    pub fn block(&self) -> BlockId {
        self.block
    }

    /// Stores `target` as the state to re-enter and returns the error
    /// sentinel.
    ///
    /// `func` must be the function the span end was emitted into.
    ///
    /// # Errors
    ///
    /// [`CodegenError::ResumeElsewhere`] if `func` is another function,
    /// [`CodegenError::TerminatedBlock`] if the failure block was terminated
    /// by hand, and [`CodegenError::ResumeTarget`] if `target` is not a
    /// parser function.
    pub fn resume_at(self, module: &Module, func: &mut Function, target: FuncRef) -> Result<(), CodegenError> {
        let owner = self.block.owner();
        if owner != func.id() {
            let expected = module
                .function(owner)
                .map_or_else(|| format!("fn{}", owner.index()), |decl| decl.name.clone());
            return Err(CodegenError::ResumeElsewhere {
                expected,
                found: func.name().into(),
            });
        }
        func.check_open(self.block)?;
        match module.function(target) {
            Some(decl) if decl.sig == parser_signature() => {}
            Some(decl) => return Err(CodegenError::ResumeTarget(decl.name.clone())),
            None => return Err(CodegenError::ResumeTarget(format!("fn{}", target.index()))),
        }
        func.store(self.block, &self.current, Constant::Func(target));
        func.ret(self.block, self.sentinel);
        Ok(())
    }
}

/// Emits the span start/end code and the per-call prologue and epilogue.
#[derive(Debug, Clone)]
pub struct SpanCodegen {
    allocation: SpanAllocation,
    storage: SpanStorage,
    record: ErrorRecord,
    current: Field,
    sentinel: i32,
    callee_hints: bool,
    debug_checks: bool,
}

impl SpanCodegen {
    /// Plans color storage and checks every span callback against the parser
    /// function ABI.
    ///
    /// # Errors
    ///
    /// Fails if the error sentinel is `0`, a callback's return type is not the
    /// parser return type, its parameters are not `(state, start, end)`, a
    /// shared color mixes signatures, or a state field name is taken with
    /// another type.
    pub fn new(ctx: &mut Compilation, allocation: SpanAllocation) -> Result<Self, CodegenError> {
        let options = *ctx.options();
        if options.error_sentinel == 0 {
            return Err(CodegenError::ZeroSentinel);
        }
        let parser = parser_signature();
        for decl in allocation.spans() {
            check_callback(ctx.module(), decl, &parser)?;
        }

        let module = ctx.module_mut();
        let shared = SharedFields::resolve(module.state())?;
        let storage = SpanStorage::plan(module, &allocation)?;
        let record = ErrorRecord::new(module, &shared, options.error_reason)?;

        Ok(Self {
            allocation,
            storage,
            record,
            current: shared.current,
            sentinel: options.error_sentinel,
            callee_hints: options.callee_hints,
            debug_checks: options.debug_checks,
        })
    }

    #[must_use]
    pub fn allocation(&self) -> &SpanAllocation {
        &self.allocation
    }

    #[must_use]
    pub fn storage(&self) -> &SpanStorage {
        &self.storage
    }

    #[must_use]
    pub fn error_record(&self) -> &ErrorRecord {
        &self.record
    }

    fn resolve(&self, span: SpanId) -> Result<(usize, &SpanDecl, &ColorStorage), CodegenError> {
        let unknown = || CodegenError::UnknownSpan(span.0);
        let decl = self.allocation.span(span).ok_or_else(unknown)?;
        let index = self.allocation.color_of(span).ok_or_else(unknown)?;
        let color = self.storage.color(index).ok_or_else(unknown)?;
        Ok((index, decl, color))
    }

    /// Span code goes into an open block of a parser function.
    fn check_target(func: &Function, block: BlockId) -> Result<(), CodegenError> {
        if *func.signature() != parser_signature() {
            return Err(CodegenError::NotParserFunction(func.name().into()));
        }
        func.check_open(block)
    }

    fn zero() -> Constant {
        Constant::i32(0)
    }

    /// Opens `span` at the current position.
    ///
    /// # Errors
    ///
    /// [`CodegenError::UnknownSpan`], [`CodegenError::NotParserFunction`], or
    /// a block error from [`Function::check_open`].
    pub fn span_start(&self, func: &mut Function, block: BlockId, span: SpanId) -> Result<BlockId, CodegenError> {
        Self::check_target(func, block)?;
        let (index, decl, color) = self.resolve(span)?;
        trace!(span = %decl.name, color = index, "span start");

        func.store(block, color.start(), pos_arg());
        if let Some(slot) = color.callback() {
            func.store(block, slot, Constant::Func(decl.callback));
        }
        Ok(block)
    }

    /// Closes `span` at the current position and calls its callback.
    ///
    /// The color's `start` is cleared before the call. On success parsing
    /// continues in [`SpanEnd::next`]; the failure path records the error and
    /// needs [`PendingResume::resume_at`] to be finished.
    ///
    /// # Errors
    ///
    /// [`CodegenError::UnknownSpan`], [`CodegenError::NotParserFunction`], or
    /// a block error from [`Function::check_open`].
    pub fn span_end(&self, func: &mut Function, block: BlockId, span: SpanId) -> Result<SpanEnd, CodegenError> {
        Self::check_target(func, block)?;
        let (index, decl, color) = self.resolve(span)?;
        trace!(span = %decl.name, color = index, "span end");

        let start = func.load(block, color.start());
        let block = if self.debug_checks {
            Self::assert_open(func, block, &start, color.start().ty(), index)
        } else {
            block
        };
        func.store(block, color.start(), Constant::Null(color.start().ty().clone()));

        let code = Dispatch::Direct(decl.callback).emit(
            func,
            block,
            color.signature(),
            vec![state_arg(), start, pos_arg()],
            self.callee_hints,
        );
        let ok = func.icmp(block, IntPredicate::Eq, code.clone(), Self::zero());
        let next = func.new_block(format!("span_end{index}"));
        let failed = func.new_block(format!("span_end_error{index}"));
        func.cond_br(block, ok, next, failed, BranchHint::LikelyTrue);

        self.record.record(func, failed, pos_arg(), code);

        Ok(SpanEnd {
            next,
            on_error: PendingResume {
                block: failed,
                current: self.current.clone(),
                sentinel: Constant::i32(self.sentinel),
            },
        })
    }

    fn assert_open(func: &mut Function, block: BlockId, start: &Operand, ty: &Type, index: usize) -> BlockId {
        let closed = func.icmp(block, IntPredicate::Eq, start.clone(), Constant::Null(ty.clone()));
        let trap = func.new_block(format!("span_not_open{index}"));
        let open = func.new_block(format!("span_open{index}"));
        func.cond_br(block, closed, trap, open, BranchHint::LikelyFalse);
        func.unreachable(trap);
        open
    }

    /// Rebases spans left open by the previous call to the start of the new
    /// buffer. Emitted once at the top of the entry point.
    ///
    /// # Errors
    ///
    /// [`CodegenError::NotParserFunction`], or a block error from
    /// [`Function::check_open`].
    pub fn pre_execute(&self, func: &mut Function, block: BlockId) -> Result<BlockId, CodegenError> {
        Self::check_target(func, block)?;
        debug!(colors = self.storage.colors().len(), "emitting span prologue");

        let mut block = block;
        for (index, color) in self.storage.colors().iter().enumerate() {
            let start = func.load(block, color.start());
            let open = func.icmp(
                block,
                IntPredicate::Ne,
                start,
                Constant::Null(color.start().ty().clone()),
            );
            let restart = func.new_block(format!("span_restart{index}"));
            let next = func.new_block(format!("span_rebased{index}"));
            func.cond_br(block, open, restart, next, BranchHint::None);

            func.store(restart, color.start(), pos_arg());
            func.br(restart, next);
            block = next;
        }
        Ok(block)
    }

    /// Hands every open span the part of it that lies in the current buffer.
    /// Emitted once before the entry point returns. Spans stay open.
    ///
    /// # Errors
    ///
    /// [`CodegenError::NotParserFunction`], or a block error from
    /// [`Function::check_open`].
    pub fn post_execute(&self, func: &mut Function, block: BlockId) -> Result<BlockId, CodegenError> {
        Self::check_target(func, block)?;
        debug!(colors = self.storage.colors().len(), "emitting span epilogue");

        let mut block = block;
        for (index, color) in self.storage.colors().iter().enumerate() {
            let start = func.load(block, color.start());
            let open = func.icmp(
                block,
                IntPredicate::Ne,
                start.clone(),
                Constant::Null(color.start().ty().clone()),
            );
            let present = func.new_block(format!("span_present{index}"));
            let next = func.new_block(format!("span_flushed{index}"));
            func.cond_br(block, open, present, next, BranchHint::None);

            let code = color.dispatch().emit(
                func,
                present,
                color.signature(),
                vec![state_arg(), start, end_pos_arg()],
                self.callee_hints,
            );
            let ok = func.icmp(present, IntPredicate::Eq, code.clone(), Self::zero());
            let failed = func.new_block(format!("span_flush_error{index}"));
            func.cond_br(present, ok, next, failed, BranchHint::LikelyTrue);

            self.record.record(func, failed, end_pos_arg(), code.clone());
            func.ret(failed, code);
            block = next;
        }
        Ok(block)
    }
}

fn check_callback(module: &Module, decl: &SpanDecl, parser: &Signature) -> Result<(), CodegenError> {
    let callee = module
        .function(decl.callback)
        .ok_or_else(|| CodegenError::UndeclaredCallback(decl.name.clone()))?;
    if callee.sig.ret != parser.ret {
        return Err(CodegenError::ReturnTypeMismatch {
            callback: callee.name.clone(),
            expected: parser.ret.clone(),
            found: callee.sig.ret.clone(),
        });
    }
    if callee.sig.params != parser.params {
        return Err(CodegenError::CallbackParams(callee.name.clone()));
    }
    Ok(())
}
