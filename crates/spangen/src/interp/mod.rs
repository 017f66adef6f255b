//! Reference interpreter for generated modules.
//!
//! Runs parser functions against an [`Instance`] so that the behaviour of the
//! emitted span code can be checked by simulation instead of by reading IR.
//! External callbacks are host closures receiving the `(start, end)` offsets.

mod instance;

use alloc::{
    boxed::Box,
    collections::BTreeMap,
    string::{String, ToString},
    vec,
    vec::Vec,
};

pub use instance::{Instance, RtValue};
use thiserror::Error;

use crate::ir::{Constant, FuncRef, Function, Instr, IntPredicate, Module, Operand, Terminator};

pub type Callback<'cb> = Box<dyn FnMut(usize, usize) -> i32 + 'cb>;

const DEFAULT_STEP_LIMIT: usize = 1 << 16;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InterpError {
    #[error("unknown function reference {0:?}")]
    UnknownFunction(FuncRef),
    #[error("function `{0}` has neither a body nor a host callback")]
    UndefinedFunction(String),
    #[error("indirect call through a null function pointer")]
    NullCallee,
    #[error("callback `{0}` received a null position")]
    NullPosition(String),
    #[error("reached unreachable code in `{0}`")]
    Trap(String),
    #[error("step limit of {0} blocks exceeded")]
    StepLimit(usize),
    #[error("expected {expected}, found {found:?}")]
    TypeConfusion {
        expected: &'static str,
        found: RtValue,
    },
    #[error("use of undefined register %{0}")]
    UndefinedValue(usize),
    #[error("access to unknown state field #{0}")]
    UnknownField(usize),
    #[error("branch to unknown block in `{0}`")]
    UnknownBlock(String),
}

pub struct Interpreter<'m, 'cb> {
    module: &'m Module,
    callbacks: BTreeMap<FuncRef, Callback<'cb>>,
    step_limit: usize,
}

impl<'m, 'cb> Interpreter<'m, 'cb> {
    #[must_use]
    pub fn new(module: &'m Module) -> Self {
        Self {
            module,
            callbacks: BTreeMap::new(),
            step_limit: DEFAULT_STEP_LIMIT,
        }
    }

    /// Maximum number of blocks a single call may execute.
    #[must_use]
    pub fn with_step_limit(mut self, limit: usize) -> Self {
        self.step_limit = limit;
        self
    }

    /// Binds a host closure to a declared function without a body.
    pub fn on(&mut self, func: FuncRef, callback: impl FnMut(usize, usize) -> i32 + 'cb) -> &mut Self {
        self.callbacks.insert(func, Box::new(callback));
        self
    }

    /// Calls a parser function on the buffer `[pos, endpos)`.
    ///
    /// # Errors
    ///
    /// Any [`InterpError`] raised while executing, or
    /// [`InterpError::TypeConfusion`] if the function does not return an
    /// integer status.
    pub fn invoke(
        &mut self,
        instance: &mut Instance,
        func: FuncRef,
        pos: usize,
        endpos: usize,
    ) -> Result<i32, InterpError> {
        let args = [RtValue::State, RtValue::Ptr(Some(pos)), RtValue::Ptr(Some(endpos))];
        match self.call(instance, func, &args)? {
            RtValue::Int(v) => i32::try_from(v).map_err(|_| InterpError::TypeConfusion {
                expected: "i32 status",
                found: RtValue::Int(v),
            }),
            found => Err(InterpError::TypeConfusion {
                expected: "i32 status",
                found,
            }),
        }
    }

    /// # Errors
    ///
    /// Any [`InterpError`] raised while executing.
    pub fn call(&mut self, instance: &mut Instance, func: FuncRef, args: &[RtValue]) -> Result<RtValue, InterpError> {
        let module = self.module;
        let decl = module
            .function(func)
            .ok_or(InterpError::UnknownFunction(func))?;
        if let Some(body) = module.body(func) {
            return self.run(instance, body, args);
        }

        let callback = self
            .callbacks
            .get_mut(&func)
            .ok_or_else(|| InterpError::UndefinedFunction(decl.name.clone()))?;
        let (Some(RtValue::Ptr(Some(start))), Some(RtValue::Ptr(Some(end)))) =
            (args.get(1).copied(), args.get(2).copied())
        else {
            return Err(InterpError::NullPosition(decl.name.clone()));
        };
        Ok(RtValue::Int(i64::from(callback(start, end))))
    }

    fn run(&mut self, instance: &mut Instance, body: &Function, args: &[RtValue]) -> Result<RtValue, InterpError> {
        let mut regs: Vec<Option<RtValue>> = vec![None; body.value_count()];
        let mut block = body.entry();
        let mut steps = 0usize;

        loop {
            steps += 1;
            if steps > self.step_limit {
                return Err(InterpError::StepLimit(self.step_limit));
            }
            let bb = body
                .block(block)
                .ok_or_else(|| InterpError::UnknownBlock(body.name().to_string()))?;

            for instr in bb.instrs() {
                match instr {
                    Instr::Load { dst, field, .. } => {
                        let value = instance
                            .get(*field)
                            .ok_or(InterpError::UnknownField(field.index()))?;
                        set_reg(&mut regs, dst.index(), value)?;
                    }
                    Instr::Store { field, value } => {
                        let value = eval(value, &regs, args)?;
                        if !instance.set(*field, value) {
                            return Err(InterpError::UnknownField(field.index()));
                        }
                    }
                    Instr::ICmp {
                        dst,
                        pred,
                        lhs,
                        rhs,
                    } => {
                        let lhs = eval(lhs, &regs, args)?;
                        let rhs = eval(rhs, &regs, args)?;
                        let equal = (lhs.is_null() && rhs.is_null()) || lhs == rhs;
                        let result = match pred {
                            IntPredicate::Eq => equal,
                            IntPredicate::Ne => !equal,
                        };
                        set_reg(&mut regs, dst.index(), RtValue::Int(i64::from(result)))?;
                    }
                    Instr::Call {
                        dst,
                        callee,
                        args: call_args,
                        ..
                    } => {
                        let target = match eval(callee, &regs, args)? {
                            RtValue::Func(Some(target)) => target,
                            RtValue::Func(None) => return Err(InterpError::NullCallee),
                            found => {
                                return Err(InterpError::TypeConfusion {
                                    expected: "function pointer",
                                    found,
                                });
                            }
                        };
                        let call_args = call_args
                            .iter()
                            .map(|a| eval(a, &regs, args))
                            .collect::<Result<Vec<_>, _>>()?;
                        let result = self.call(instance, target, &call_args)?;
                        set_reg(&mut regs, dst.index(), result)?;
                    }
                }
            }

            block = match bb.terminator() {
                Some(Terminator::Br(target)) => *target,
                Some(Terminator::CondBr {
                    cond,
                    on_true,
                    on_false,
                    ..
                }) => match eval(cond, &regs, args)? {
                    RtValue::Int(0) => *on_false,
                    RtValue::Int(_) => *on_true,
                    found => {
                        return Err(InterpError::TypeConfusion {
                            expected: "i1 condition",
                            found,
                        });
                    }
                },
                Some(Terminator::Ret(value)) => return eval(value, &regs, args),
                Some(Terminator::Unreachable) | None => {
                    return Err(InterpError::Trap(body.name().to_string()));
                }
            };
        }
    }
}

fn set_reg(regs: &mut [Option<RtValue>], index: usize, value: RtValue) -> Result<(), InterpError> {
    let slot = regs.get_mut(index).ok_or(InterpError::UndefinedValue(index))?;
    *slot = Some(value);
    Ok(())
}

fn eval(op: &Operand, regs: &[Option<RtValue>], args: &[RtValue]) -> Result<RtValue, InterpError> {
    match op {
        Operand::Param(i) => args.get(*i as usize).copied().ok_or(InterpError::TypeConfusion {
            expected: "argument",
            found: RtValue::Int(i64::from(*i)),
        }),
        Operand::Value(v) => regs
            .get(v.index())
            .copied()
            .flatten()
            .ok_or(InterpError::UndefinedValue(v.index())),
        Operand::Const(Constant::Int { value, .. }) => Ok(RtValue::Int(*value)),
        Operand::Const(Constant::Null(ty)) => Ok(RtValue::zeroed(ty)),
        Operand::Const(Constant::Func(f)) => Ok(RtValue::Func(Some(*f))),
        Operand::Const(Constant::Str(s)) => Ok(RtValue::Str(*s)),
    }
}

#[cfg(test)]
mod tests {
    use alloc::rc::Rc;
    use core::cell::Cell;

    use super::*;
    use crate::{
        CodegenOptions, Compilation,
        context::{end_pos_arg, pos_arg, state_arg},
        ir::{BranchHint, CallConv},
    };

    #[test]
    fn calls_host_callbacks_with_positions() {
        let mut ctx = Compilation::new(CodegenOptions::default()).unwrap();
        let cb = ctx.declare_callback("on_data", CallConv::External).unwrap();
        let f = ctx.declare_parser_function("execute").unwrap();
        let mut body = ctx.parser_function(f).unwrap();
        let entry = body.entry();
        let sig = ctx.module().function(cb).unwrap().sig.clone();
        let code = body.call(
            entry,
            Constant::Func(cb),
            &sig,
            vec![state_arg(), pos_arg(), end_pos_arg()],
            None,
        );
        body.ret(entry, code);
        ctx.define(body).unwrap();

        let module = ctx.into_module();
        let seen = Rc::new(Cell::new((0, 0)));
        let mut interp = Interpreter::new(&module);
        let log = Rc::clone(&seen);
        interp.on(cb, move |s, e| {
            log.set((s, e));
            7
        });
        let mut instance = Instance::new(module.state());

        assert_eq!(interp.invoke(&mut instance, f, 3, 11), Ok(7));
        assert_eq!(seen.get(), (3, 11));
    }

    #[test]
    fn loops_hit_the_step_limit() {
        let mut ctx = Compilation::new(CodegenOptions::default()).unwrap();
        let f = ctx.declare_parser_function("spin").unwrap();
        let mut body = ctx.parser_function(f).unwrap();
        let entry = body.entry();
        let head = body.new_block("head");
        body.br(entry, head);
        body.cond_br(head, Constant::i32(1), head, entry, BranchHint::None);
        ctx.define(body).unwrap();

        let module = ctx.into_module();
        let mut instance = Instance::new(module.state());
        let mut interp = Interpreter::new(&module).with_step_limit(10);
        assert_eq!(
            interp.invoke(&mut instance, f, 0, 0),
            Err(InterpError::StepLimit(10))
        );
    }

    #[test]
    fn missing_callback_is_reported() {
        let mut ctx = Compilation::new(CodegenOptions::default()).unwrap();
        let cb = ctx.declare_callback("on_data", CallConv::External).unwrap();
        let module = ctx.into_module();
        let mut instance = Instance::new(module.state());
        let mut interp = Interpreter::new(&module);
        assert_eq!(
            interp.call(&mut instance, cb, &[]),
            Err(InterpError::UndefinedFunction("on_data".into()))
        );
    }
}
