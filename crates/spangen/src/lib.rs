//! Span tracking for an incremental parser compiler.
//!
//! A parser compiled to a state machine is fed its input in arbitrary chunks.
//! Some grammar nodes mark *spans*: contiguous ranges of input reported to a
//! user callback as `(start, end)`. This crate lowers the span events of such
//! a machine into a small basic-block IR:
//!
//! - [`SpanCodegen::span_start`] records where a span opened;
//! - [`SpanCodegen::span_end`] closes it and calls its callback, recording an
//!   error and a resumption point if the callback fails;
//! - [`SpanCodegen::pre_execute`] and [`SpanCodegen::post_execute`] wrap every
//!   call of the parser so that spans crossing a buffer boundary are rebased
//!   and flushed.
//!
//! Spans that can never be open at the same time share storage; that grouping
//! (a *coloring*) comes from an allocator outside this crate as a
//! [`SpanAllocation`].
//!
//! ```rust
//! use spangen::{CodegenOptions, Compilation, SpanAllocation, SpanCodegen, ir::CallConv};
//!
//! let mut ctx = Compilation::new(CodegenOptions::default())?;
//! let on_url = ctx.declare_callback("on_url", CallConv::External)?;
//!
//! let mut spans = SpanAllocation::builder();
//! let url = spans.span("url", on_url);
//! spans.color([url]);
//! let codegen = SpanCodegen::new(&mut ctx, spans.build()?)?;
//!
//! assert_eq!(codegen.storage().colors().len(), 1);
//! assert!(ctx.module().state().lookup("_span_pos0").is_some());
//! # Ok::<(), spangen::CodegenError>(())
//! ```

#![no_std]
#![allow(missing_docs)]
extern crate alloc;

#[cfg(test)]
extern crate std;

mod error;
mod options;

pub mod context;
#[cfg(feature = "interp")]
pub mod interp;
pub mod ir;
pub mod span;

#[cfg(all(test, feature = "interp"))]
mod tests;

pub use context::Compilation;
pub use error::CodegenError;
pub use options::CodegenOptions;
pub use span::{
    ColorStorage, Dispatch, ErrorRecord, PendingResume, SpanAllocation, SpanAllocationBuilder,
    SpanCodegen, SpanDecl, SpanEnd, SpanId, SpanStorage,
};
