use alloc::{string::String, vec, vec::Vec};

use crate::{CodegenError, ir::FuncRef};

/// Identity of one capturable field of the grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SpanId(pub(crate) u32);

impl SpanId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanDecl {
    pub name: String,
    /// Invoked with `(state, start, end)` whenever the span closes or is
    /// flushed.
    pub callback: FuncRef,
}

/// The span allocator's verdict: which spans share storage.
///
/// Every color is a non-empty list of spans that are never open at the same
/// time; colors and members keep the order the allocator produced them in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanAllocation {
    spans: Vec<SpanDecl>,
    concurrency: Vec<Vec<SpanId>>,
    map: Vec<usize>,
}

impl SpanAllocation {
    /// # Errors
    ///
    /// Fails on an empty color, an unknown span id, or a span assigned to
    /// none or several colors.
    pub fn new(spans: Vec<SpanDecl>, concurrency: Vec<Vec<SpanId>>) -> Result<Self, CodegenError> {
        let mut map = vec![None; spans.len()];
        for (color, members) in concurrency.iter().enumerate() {
            if members.is_empty() {
                return Err(CodegenError::EmptyColor(color));
            }
            for &span in members {
                let slot = map
                    .get_mut(span.index())
                    .ok_or(CodegenError::UnknownSpan(span.0))?;
                if slot.replace(color).is_some() {
                    return Err(CodegenError::DuplicateSpan(spans[span.index()].name.clone()));
                }
            }
        }

        let map: Vec<usize> = map
            .into_iter()
            .zip(&spans)
            .map(|(color, decl)| color.ok_or_else(|| CodegenError::UncoloredSpan(decl.name.clone())))
            .collect::<Result<_, _>>()?;

        Ok(Self {
            spans,
            concurrency,
            map,
        })
    }

    /// Gives every span a color of its own.
    #[must_use]
    pub fn uncolored(spans: Vec<SpanDecl>) -> Self {
        let concurrency = (0u32..).map(|i| vec![SpanId(i)]).take(spans.len()).collect();
        let map = (0..spans.len()).collect();
        Self {
            spans,
            concurrency,
            map,
        }
    }

    #[must_use]
    pub fn builder() -> SpanAllocationBuilder {
        SpanAllocationBuilder::default()
    }

    #[must_use]
    pub fn spans(&self) -> &[SpanDecl] {
        &self.spans
    }

    #[must_use]
    pub fn span(&self, id: SpanId) -> Option<&SpanDecl> {
        self.spans.get(id.index())
    }

    #[must_use]
    pub fn concurrency(&self) -> &[Vec<SpanId>] {
        &self.concurrency
    }

    #[must_use]
    pub fn color_of(&self, id: SpanId) -> Option<usize> {
        self.map.get(id.index()).copied()
    }
}

/// Collects span declarations and colors, then validates them at once.
#[derive(Debug, Clone, Default)]
pub struct SpanAllocationBuilder {
    spans: Vec<SpanDecl>,
    concurrency: Vec<Vec<SpanId>>,
}

impl SpanAllocationBuilder {
    pub fn span(&mut self, name: impl Into<String>, callback: FuncRef) -> SpanId {
        let id = SpanId(u32::try_from(self.spans.len()).unwrap_or(u32::MAX));
        self.spans.push(SpanDecl {
            name: name.into(),
            callback,
        });
        id
    }

    pub fn color(&mut self, members: impl IntoIterator<Item = SpanId>) -> &mut Self {
        self.concurrency.push(members.into_iter().collect());
        self
    }

    /// # Errors
    ///
    /// See [`SpanAllocation::new`].
    pub fn build(self) -> Result<SpanAllocation, CodegenError> {
        SpanAllocation::new(self.spans, self.concurrency)
    }
}
