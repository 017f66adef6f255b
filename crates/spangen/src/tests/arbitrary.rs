use alloc::{boxed::Box, vec::Vec};

use quickcheck::{Arbitrary, Gen};

/// One step of a generated span event script.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Op {
    /// Opens the span if its color is free, closes it if it is the open
    /// member, and does nothing otherwise.
    Toggle { span: usize, advance: usize },
    /// Ends the current buffer and starts the next one.
    Flush { advance: usize },
}

impl Arbitrary for Op {
    fn arbitrary(g: &mut Gen) -> Self {
        let advance = usize::arbitrary(g) % 8;
        if u8::arbitrary(g) % 4 == 0 {
            Self::Flush { advance }
        } else {
            Self::Toggle {
                span: usize::arbitrary(g),
                advance,
            }
        }
    }
}

/// A coloring shape plus the events driven through it.
#[derive(Debug, Clone)]
pub(crate) struct Script {
    pub shape: Vec<usize>,
    pub ops: Vec<Op>,
}

impl Arbitrary for Script {
    fn arbitrary(g: &mut Gen) -> Self {
        let colors = 1 + usize::arbitrary(g) % 4;
        Self {
            shape: (0..colors).map(|_| 1 + usize::arbitrary(g) % 3).collect(),
            ops: Vec::arbitrary(g),
        }
    }

    fn shrink(&self) -> Box<dyn Iterator<Item = Self>> {
        let shape = self.shape.clone();
        Box::new(self.ops.shrink().map(move |ops| Self {
            shape: shape.clone(),
            ops,
        }))
    }
}

/// A failing callback: its status code and where the failure happens.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Failure {
    pub code: i32,
    pub start: usize,
    pub len: usize,
}

impl Arbitrary for Failure {
    fn arbitrary(g: &mut Gen) -> Self {
        let mut code = i32::arbitrary(g);
        while code == 0 {
            code = i32::arbitrary(g);
        }
        Self {
            code,
            start: usize::arbitrary(g) % 1024,
            len: usize::arbitrary(g) % 64,
        }
    }
}
