use alloc::string::String;

use thiserror::Error;

use crate::ir::Type;

/// Build-time failures. None of these are recoverable: they indicate an
/// inconsistent grammar, allocator output or caller bug, and code generation
/// stops.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodegenError {
    #[error("state field `{name}` is already declared as {existing}, not {requested}")]
    FieldTypeConflict {
        name: String,
        existing: Type,
        requested: Type,
    },
    #[error("state field `{0}` is missing")]
    MissingStateField(String),
    #[error("state field `{name}` has type {found}, expected {expected}")]
    StateFieldType {
        name: String,
        expected: Type,
        found: Type,
    },

    #[error("function `{0}` is already declared with a different signature")]
    FunctionRedeclared(String),
    #[error("function `{0}` already has a body")]
    DuplicateBody(String),
    #[error("function `{0}` is not a parser function")]
    NotParserFunction(String),
    #[error("string literal contains an interior NUL byte")]
    InteriorNul,
    #[error("block `{block}` in `{function}` has no terminator")]
    UnterminatedBlock { function: String, block: String },
    #[error("block `{block}` in `{function}` branches to an unknown block")]
    UnknownBlock { function: String, block: String },
    #[error("block #{block} does not belong to `{function}`")]
    ForeignBlock { function: String, block: usize },
    #[error("block `{block}` in `{function}` is already terminated")]
    TerminatedBlock { function: String, block: String },

    #[error("color {0} has no spans")]
    EmptyColor(usize),
    #[error("span `{0}` is assigned to more than one color")]
    DuplicateSpan(String),
    #[error("span `{0}` is not assigned to any color")]
    UncoloredSpan(String),
    #[error("unknown span id {0}")]
    UnknownSpan(u32),
    #[error("span `{0}` refers to an undeclared callback")]
    UndeclaredCallback(String),

    #[error("callback `{callback}` returns {found}, but parser functions return {expected}")]
    ReturnTypeMismatch {
        callback: String,
        expected: Type,
        found: Type,
    },
    #[error("callback `{0}` must take (state, start, end) arguments")]
    CallbackParams(String),
    #[error("color {color} mixes callback signatures (`{first}` and `{other}`)")]
    MixedSignatures {
        color: usize,
        first: String,
        other: String,
    },
    #[error("resumption target `{0}` is not a parser function")]
    ResumeTarget(String),
    #[error("failure path of `{expected}` resumed in `{found}`")]
    ResumeElsewhere { expected: String, found: String },
    #[error("the error sentinel must differ from the success status 0")]
    ZeroSentinel,
}
