//! Basic-block instruction substrate.
//!
//! A deliberately small IR: typed registers, loads and stores on fields of
//! the parser-instance record, integer comparison, calls tagged with a calling
//! convention, and terminators carrying branch-likelihood hints. Span lowering
//! only needs these primitives, and the reference interpreter executes exactly
//! this set.

mod function;
mod module;
mod print;
mod types;

pub use function::{
    Block, BlockId, BranchHint, Constant, Function, Instr, IntPredicate, Metadata, Operand,
    Terminator, ValueId,
};
pub use module::{Field, FieldId, FuncDecl, FuncRef, Module, StateLayout, StrId};
pub use print::FunctionDisplay;
pub use types::{CallConv, Signature, Type};
