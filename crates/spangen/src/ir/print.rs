//! Textual rendering of modules and function bodies.
//!
//! The format is LLVM-flavoured and fully deterministic: fields, literals,
//! declarations and bodies are printed in declaration order, registers are
//! numbered in creation order.

use core::fmt::{self, Display, Formatter, Write};

use super::{
    BranchHint, Constant, Function, Instr, IntPredicate, Metadata, Module, Operand, Terminator,
};

impl Display for Module {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "%state = type {{")?;
        for field in self.state().fields() {
            writeln!(f, "  {}: {}", field.name(), field.ty())?;
        }
        writeln!(f, "}}")?;

        for (id, text) in self.strings() {
            writeln!(f)?;
            writeln!(f, "@.str{} = c\"{}\\00\"", id.index(), text.escape_ascii())?;
        }

        let mut first_decl = true;
        for (id, decl) in self.functions() {
            if self.body(id).is_some() {
                continue;
            }
            if first_decl {
                writeln!(f)?;
                first_decl = false;
            }
            write!(f, "declare {} {} @{}(", decl.sig.cc, decl.sig.ret, decl.name)?;
            for (i, param) in decl.sig.params.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{param}")?;
            }
            writeln!(f, ")")?;
        }

        for body in self.bodies() {
            writeln!(f)?;
            write!(f, "{}", body.display(self))?;
        }
        Ok(())
    }
}

/// A [`Function`] paired with the [`Module`] that names its fields and
/// callees.
pub struct FunctionDisplay<'a> {
    func: &'a Function,
    module: &'a Module,
}

impl Function {
    #[must_use]
    pub fn display<'a>(&'a self, module: &'a Module) -> FunctionDisplay<'a> {
        FunctionDisplay { func: self, module }
    }
}

impl FunctionDisplay<'_> {
    fn operand(&self, f: &mut Formatter<'_>, op: &Operand) -> fmt::Result {
        match op {
            Operand::Param(i) => match self.func.param_names().get(*i as usize) {
                Some(name) => write!(f, "%{name}"),
                None => write!(f, "%arg{i}"),
            },
            Operand::Value(v) => write!(f, "%{}", v.index()),
            Operand::Const(Constant::Int { value, .. }) => write!(f, "{value}"),
            Operand::Const(Constant::Null(_)) => f.write_str("null"),
            Operand::Const(Constant::Func(id)) => self.func_name(f, *id),
            Operand::Const(Constant::Str(id)) => write!(f, "@.str{}", id.index()),
        }
    }

    fn func_name(&self, f: &mut Formatter<'_>, id: super::FuncRef) -> fmt::Result {
        match self.module.function(id) {
            Some(decl) => write!(f, "@{}", decl.name),
            None => write!(f, "@<fn{}>", id.index()),
        }
    }

    fn field(&self, f: &mut Formatter<'_>, id: super::FieldId) -> fmt::Result {
        match self.module.state().get(id) {
            Some(field) => write!(f, "%state.{}", field.name()),
            None => write!(f, "%state.<{}>", id.index()),
        }
    }

    fn label(&self, f: &mut Formatter<'_>, id: super::BlockId) -> fmt::Result {
        match self.func.block(id) {
            Some(block) => write!(f, "label %{}", block.name()),
            None => write!(f, "label %<bb{}>", id.index()),
        }
    }

    fn instr(&self, f: &mut Formatter<'_>, instr: &Instr) -> fmt::Result {
        f.write_str("  ")?;
        match instr {
            Instr::Load { dst, field, ty } => {
                write!(f, "%{} = load {ty}, ", dst.index())?;
                self.field(f, *field)?;
            }
            Instr::Store { field, value } => {
                f.write_str("store ")?;
                self.operand(f, value)?;
                f.write_str(", ")?;
                self.field(f, *field)?;
            }
            Instr::ICmp {
                dst,
                pred,
                lhs,
                rhs,
            } => {
                let pred = match pred {
                    IntPredicate::Eq => "eq",
                    IntPredicate::Ne => "ne",
                };
                write!(f, "%{} = icmp {pred} ", dst.index())?;
                self.operand(f, lhs)?;
                f.write_str(", ")?;
                self.operand(f, rhs)?;
            }
            Instr::Call {
                dst,
                callee,
                sig,
                args,
                metadata,
            } => {
                write!(f, "%{} = call {} {} ", dst.index(), sig.cc, sig.ret)?;
                self.operand(f, callee)?;
                f.write_char('(')?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    self.operand(f, arg)?;
                }
                f.write_char(')')?;
                if let Some(Metadata::Callees(callees)) = metadata {
                    f.write_str(", !callees [")?;
                    for (i, callee) in callees.iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        self.func_name(f, *callee)?;
                    }
                    f.write_char(']')?;
                }
            }
        }
        writeln!(f)
    }

    fn terminator(&self, f: &mut Formatter<'_>, term: &Terminator) -> fmt::Result {
        f.write_str("  ")?;
        match term {
            Terminator::Br(target) => {
                f.write_str("br ")?;
                self.label(f, *target)?;
            }
            Terminator::CondBr {
                cond,
                on_true,
                on_false,
                hint,
            } => {
                f.write_str("br ")?;
                self.operand(f, cond)?;
                f.write_str(", ")?;
                self.label(f, *on_true)?;
                f.write_str(", ")?;
                self.label(f, *on_false)?;
                match hint {
                    BranchHint::None => {}
                    BranchHint::LikelyTrue => f.write_str(", !likely true")?,
                    BranchHint::LikelyFalse => f.write_str(", !likely false")?,
                }
            }
            Terminator::Ret(value) => {
                f.write_str("ret ")?;
                self.operand(f, value)?;
            }
            Terminator::Unreachable => f.write_str("unreachable")?,
        }
        writeln!(f)
    }
}

impl Display for FunctionDisplay<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let sig = self.func.signature();
        write!(f, "define {} {} @{}(", sig.cc, sig.ret, self.func.name())?;
        for (i, (ty, name)) in sig.params.iter().zip(self.func.param_names()).enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{ty} %{name}")?;
        }
        writeln!(f, ") {{")?;

        for (i, block) in self.func.blocks().iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            writeln!(f, "{}:", block.name())?;
            for instr in block.instrs() {
                self.instr(f, instr)?;
            }
            match block.terminator() {
                Some(term) => self.terminator(f, term)?,
                None => writeln!(f, "  ; no terminator")?,
            }
        }
        writeln!(f, "}}")
    }
}
