use alloc::{
    format,
    string::{String, ToString},
    vec::Vec,
};

use super::{Field, FieldId, FuncRef, Signature, StrId, Type};
use crate::CodegenError;

/// A block of one particular function body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId {
    owner: FuncRef,
    index: u32,
}

impl BlockId {
    #[must_use]
    pub fn index(self) -> usize {
        self.index as usize
    }

    /// The function whose body the block belongs to.
    #[must_use]
    pub fn owner(self) -> FuncRef {
        self.owner
    }
}

/// A virtual register, assigned exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ValueId(u32);

impl ValueId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constant {
    Int { bits: u32, value: i64 },
    Null(Type),
    Func(FuncRef),
    Str(StrId),
}

impl Constant {
    #[must_use]
    pub fn i32(value: i32) -> Self {
        Self::Int {
            bits: 32,
            value: i64::from(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Param(u32),
    Value(ValueId),
    Const(Constant),
}

impl From<Constant> for Operand {
    fn from(c: Constant) -> Self {
        Self::Const(c)
    }
}

impl From<ValueId> for Operand {
    fn from(v: ValueId) -> Self {
        Self::Value(v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntPredicate {
    Eq,
    Ne,
}

/// Static prediction attached to a conditional branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BranchHint {
    #[default]
    None,
    LikelyTrue,
    LikelyFalse,
}

/// Optimizer hints attached to calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Metadata {
    /// Every function an indirect call may reach.
    Callees(Vec<FuncRef>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instr {
    Load {
        dst: ValueId,
        field: FieldId,
        ty: Type,
    },
    Store {
        field: FieldId,
        value: Operand,
    },
    ICmp {
        dst: ValueId,
        pred: IntPredicate,
        lhs: Operand,
        rhs: Operand,
    },
    Call {
        dst: ValueId,
        callee: Operand,
        sig: Signature,
        args: Vec<Operand>,
        metadata: Option<Metadata>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminator {
    Br(BlockId),
    CondBr {
        cond: Operand,
        on_true: BlockId,
        on_false: BlockId,
        hint: BranchHint,
    },
    Ret(Operand),
    Unreachable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    name: String,
    instrs: Vec<Instr>,
    term: Option<Terminator>,
}

impl Block {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn instrs(&self) -> &[Instr] {
        &self.instrs
    }

    #[must_use]
    pub fn terminator(&self) -> Option<&Terminator> {
        self.term.as_ref()
    }
}

/// A function body under construction.
///
/// Builder methods take the block to append to. A block accepts instructions
/// until it is terminated. The primitives panic on a block of another body or
/// on a terminated block; [`Function::check_open`] tells these apart up front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    id: FuncRef,
    name: String,
    sig: Signature,
    params: Vec<String>,
    blocks: Vec<Block>,
    values: Vec<Type>,
}

impl Function {
    /// Creates a body with a single, empty `entry` block.
    #[must_use]
    pub fn new(id: FuncRef, name: &str, sig: Signature, params: &[&str]) -> Self {
        let params = (0..sig.params.len())
            .map(|i| {
                params
                    .get(i)
                    .map_or_else(|| format!("arg{i}"), |p| (*p).to_string())
            })
            .collect();
        let mut func = Self {
            id,
            name: name.to_string(),
            sig,
            params,
            blocks: Vec::new(),
            values: Vec::new(),
        };
        func.new_block("entry");
        func
    }

    #[must_use]
    pub fn id(&self) -> FuncRef {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn signature(&self) -> &Signature {
        &self.sig
    }

    #[must_use]
    pub fn param_names(&self) -> &[String] {
        &self.params
    }

    #[must_use]
    pub fn entry(&self) -> BlockId {
        BlockId {
            owner: self.id,
            index: 0,
        }
    }

    #[must_use]
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    #[must_use]
    pub fn block(&self, id: BlockId) -> Option<&Block> {
        if id.owner != self.id {
            return None;
        }
        self.blocks.get(id.index())
    }

    #[must_use]
    pub fn value_count(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn value_type(&self, v: ValueId) -> Option<&Type> {
        self.values.get(v.index())
    }

    /// Appends a new block. Names are made unique by suffixing the block
    /// index on collision.
    pub fn new_block(&mut self, name: impl Into<String>) -> BlockId {
        let id = BlockId {
            owner: self.id,
            index: u32::try_from(self.blocks.len()).unwrap_or(u32::MAX),
        };
        let mut name = name.into();
        if self.blocks.iter().any(|b| b.name == name) {
            name = format!("{name}.{}", id.index);
        }
        self.blocks.push(Block {
            name,
            instrs: Vec::new(),
            term: None,
        });
        id
    }

    #[must_use]
    pub fn is_terminated(&self, block: BlockId) -> bool {
        self.block(block).is_some_and(|b| b.term.is_some())
    }

    /// Checks that `block` belongs to this function and still accepts
    /// instructions.
    ///
    /// # Errors
    ///
    /// [`CodegenError::ForeignBlock`] or [`CodegenError::TerminatedBlock`].
    pub fn check_open(&self, block: BlockId) -> Result<(), CodegenError> {
        let Some(b) = self.block(block) else {
            return Err(CodegenError::ForeignBlock {
                function: self.name.clone(),
                block: block.index(),
            });
        };
        if self.is_terminated(block) {
            return Err(CodegenError::TerminatedBlock {
                function: self.name.clone(),
                block: b.name.clone(),
            });
        }
        Ok(())
    }

    fn fresh(&mut self, ty: Type) -> ValueId {
        let id = ValueId(u32::try_from(self.values.len()).unwrap_or(u32::MAX));
        self.values.push(ty);
        id
    }

    fn open_mut(&mut self, block: BlockId) -> &mut Block {
        assert!(block.owner == self.id, "block of another function");
        let block = &mut self.blocks[block.index()];
        assert!(block.term.is_none(), "block `{}` is already terminated", block.name);
        block
    }

    fn push(&mut self, block: BlockId, instr: Instr) {
        self.open_mut(block).instrs.push(instr);
    }

    fn terminate(&mut self, block: BlockId, term: Terminator) {
        self.open_mut(block).term = Some(term);
    }

    pub fn load(&mut self, block: BlockId, field: &Field) -> Operand {
        let dst = self.fresh(field.ty().clone());
        self.push(
            block,
            Instr::Load {
                dst,
                field: field.id(),
                ty: field.ty().clone(),
            },
        );
        dst.into()
    }

    pub fn store(&mut self, block: BlockId, field: &Field, value: impl Into<Operand>) {
        self.push(
            block,
            Instr::Store {
                field: field.id(),
                value: value.into(),
            },
        );
    }

    pub fn icmp(
        &mut self,
        block: BlockId,
        pred: IntPredicate,
        lhs: impl Into<Operand>,
        rhs: impl Into<Operand>,
    ) -> Operand {
        let dst = self.fresh(Type::i1());
        self.push(
            block,
            Instr::ICmp {
                dst,
                pred,
                lhs: lhs.into(),
                rhs: rhs.into(),
            },
        );
        dst.into()
    }

    pub fn call(
        &mut self,
        block: BlockId,
        callee: impl Into<Operand>,
        sig: &Signature,
        args: Vec<Operand>,
        metadata: Option<Metadata>,
    ) -> Operand {
        let dst = self.fresh(sig.ret.clone());
        self.push(
            block,
            Instr::Call {
                dst,
                callee: callee.into(),
                sig: sig.clone(),
                args,
                metadata,
            },
        );
        dst.into()
    }

    pub fn br(&mut self, block: BlockId, target: BlockId) {
        self.terminate(block, Terminator::Br(target));
    }

    pub fn cond_br(
        &mut self,
        block: BlockId,
        cond: impl Into<Operand>,
        on_true: BlockId,
        on_false: BlockId,
        hint: BranchHint,
    ) {
        self.terminate(
            block,
            Terminator::CondBr {
                cond: cond.into(),
                on_true,
                on_false,
                hint,
            },
        );
    }

    pub fn ret(&mut self, block: BlockId, value: impl Into<Operand>) {
        self.terminate(block, Terminator::Ret(value.into()));
    }

    pub fn unreachable(&mut self, block: BlockId) {
        self.terminate(block, Terminator::Unreachable);
    }

    /// Checks that every block is terminated and every branch target exists.
    ///
    /// # Errors
    ///
    /// [`CodegenError::UnterminatedBlock`] or [`CodegenError::UnknownBlock`].
    pub fn verify(&self) -> Result<(), CodegenError> {
        for block in &self.blocks {
            let targets = match &block.term {
                None => {
                    return Err(CodegenError::UnterminatedBlock {
                        function: self.name.clone(),
                        block: block.name.clone(),
                    });
                }
                Some(Terminator::Br(target)) => [Some(*target), None],
                Some(Terminator::CondBr {
                    on_true, on_false, ..
                }) => [Some(*on_true), Some(*on_false)],
                Some(Terminator::Ret(_) | Terminator::Unreachable) => [None, None],
            };
            if targets
                .iter()
                .flatten()
                .any(|t| t.owner != self.id || t.index() >= self.blocks.len())
            {
                return Err(CodegenError::UnknownBlock {
                    function: self.name.clone(),
                    block: block.name.clone(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;
    use crate::ir::{CallConv, Module};

    fn empty_fn() -> Function {
        let mut module = Module::new();
        let sig = Signature::new(Type::i32(), vec![Type::i8().ptr()], CallConv::Internal);
        let id = module.declare_function("f", sig.clone()).unwrap();
        Function::new(id, "f", sig, &["pos"])
    }

    #[test]
    fn unterminated_block_fails_verification() {
        let mut f = empty_fn();
        let exit = f.new_block("exit");
        f.br(f.entry(), exit);

        assert_eq!(
            f.verify(),
            Err(CodegenError::UnterminatedBlock {
                function: "f".into(),
                block: "exit".into(),
            })
        );

        f.ret(exit, Constant::i32(0));
        assert_eq!(f.verify(), Ok(()));
    }

    #[test]
    fn block_names_are_unique() {
        let mut f = empty_fn();
        let a = f.new_block("next");
        let b = f.new_block("next");
        assert_eq!(f.block(a).unwrap().name(), "next");
        assert_eq!(f.block(b).unwrap().name(), "next.2");
    }

    #[test]
    fn registers_are_typed() {
        let mut module = Module::new();
        let field = module.state_mut().declare("_span_pos0", Type::i8().ptr()).unwrap();
        let mut f = empty_fn();
        let entry = f.entry();
        let Operand::Value(v) = f.load(entry, &field) else {
            panic!("load must produce a register");
        };
        let Operand::Value(c) = f.icmp(entry, IntPredicate::Ne, v, Constant::Null(Type::i8().ptr()))
        else {
            panic!("icmp must produce a register");
        };
        assert_eq!(f.value_type(v), Some(&Type::i8().ptr()));
        assert_eq!(f.value_type(c), Some(&Type::i1()));
        assert_eq!(f.param_names()[0], "pos");
    }

    #[test]
    fn check_open_tracks_termination() {
        let mut f = empty_fn();
        let entry = f.entry();
        assert_eq!(f.check_open(entry), Ok(()));

        f.ret(entry, Constant::i32(0));
        assert!(f.is_terminated(entry));
        assert_eq!(
            f.check_open(entry),
            Err(CodegenError::TerminatedBlock {
                function: "f".into(),
                block: "entry".into(),
            })
        );
    }

    #[test]
    fn blocks_belong_to_their_function() {
        let mut module = Module::new();
        let sig = Signature::new(Type::i32(), vec![], CallConv::Internal);
        let a = module.declare_function("a", sig.clone()).unwrap();
        let b = module.declare_function("b", sig.clone()).unwrap();
        let mut fa = Function::new(a, "a", sig.clone(), &[]);
        let fb = Function::new(b, "b", sig, &[]);
        let extra = fa.new_block("extra");

        assert_eq!(extra.owner(), a);
        assert!(fb.block(fa.entry()).is_none());
        assert_eq!(
            fb.check_open(extra),
            Err(CodegenError::ForeignBlock {
                function: "b".into(),
                block: 1,
            })
        );
    }
}
