//! Span tracking: from the allocator's coloring to storage fields and the
//! code run when spans open, close, or outlive the current buffer.

mod allocation;
mod codegen;
mod record;
mod storage;

pub use allocation::{SpanAllocation, SpanAllocationBuilder, SpanDecl, SpanId};
pub use codegen::{PendingResume, SpanCodegen, SpanEnd};
pub use record::ErrorRecord;
pub use storage::{ColorStorage, Dispatch, SpanStorage};
