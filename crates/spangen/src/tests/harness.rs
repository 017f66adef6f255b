//! A small generated parser for exercising span code by simulation.
//!
//! Every span gets two node functions, `start_<span>` and `end_<span>`, that
//! do nothing but emit the corresponding span event. `pre` and `post` hold the
//! prologue and epilogue, and `resume` is the resumption target of every
//! failing span end.

use alloc::{format, rc::Rc, vec, vec::Vec};
use core::cell::RefCell;

use crate::{
    CodegenOptions, Compilation, SpanAllocation, SpanCodegen, SpanId,
    context::CURRENT_FIELD,
    interp::{Instance, InterpError, Interpreter, RtValue},
    ir::{CallConv, Constant, FuncRef, Module},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Call {
    pub span: usize,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Default)]
struct Host {
    calls: Vec<Call>,
    codes: Vec<i32>,
}

pub(crate) struct Harness {
    pub module: Module,
    pub codegen: SpanCodegen,
    pub spans: Vec<SpanId>,
    pub callbacks: Vec<FuncRef>,
    start_fns: Vec<FuncRef>,
    end_fns: Vec<FuncRef>,
    pub pre: FuncRef,
    pub post: FuncRef,
    pub resume: FuncRef,
}

impl Harness {
    /// `shape[i]` is the number of spans sharing color `i`.
    pub fn new(shape: &[usize], options: CodegenOptions) -> Self {
        let mut ctx = Compilation::new(options).unwrap();
        let mut builder = SpanAllocation::builder();
        let mut spans = Vec::new();
        let mut callbacks = Vec::new();
        for (color, &members) in shape.iter().enumerate() {
            let ids: Vec<SpanId> = (0..members)
                .map(|m| {
                    let cb = ctx
                        .declare_callback(&format!("on_{color}_{m}"), CallConv::External)
                        .unwrap();
                    callbacks.push(cb);
                    builder.span(format!("span_{color}_{m}"), cb)
                })
                .collect();
            spans.extend(ids.iter().copied());
            builder.color(ids);
        }
        let codegen = SpanCodegen::new(&mut ctx, builder.build().unwrap()).unwrap();

        let resume = ctx.declare_parser_function("resume").unwrap();
        let mut body = ctx.parser_function(resume).unwrap();
        body.ret(body.entry(), Constant::i32(0));
        ctx.define(body).unwrap();

        let mut start_fns = Vec::new();
        let mut end_fns = Vec::new();
        for &span in &spans {
            let name = codegen.allocation().span(span).unwrap().name.clone();

            let f = ctx.declare_parser_function(&format!("start_{name}")).unwrap();
            let mut body = ctx.parser_function(f).unwrap();
            let entry = body.entry();
            let next = codegen.span_start(&mut body, entry, span).unwrap();
            body.ret(next, Constant::i32(0));
            ctx.define(body).unwrap();
            start_fns.push(f);

            let f = ctx.declare_parser_function(&format!("end_{name}")).unwrap();
            let mut body = ctx.parser_function(f).unwrap();
            let entry = body.entry();
            let end = codegen.span_end(&mut body, entry, span).unwrap();
            body.ret(end.next, Constant::i32(0));
            end.on_error.resume_at(ctx.module(), &mut body, resume).unwrap();
            ctx.define(body).unwrap();
            end_fns.push(f);
        }

        let pre = ctx.declare_parser_function("pre").unwrap();
        let mut body = ctx.parser_function(pre).unwrap();
        let entry = body.entry();
        let next = codegen.pre_execute(&mut body, entry).unwrap();
        body.ret(next, Constant::i32(0));
        ctx.define(body).unwrap();

        let post = ctx.declare_parser_function("post").unwrap();
        let mut body = ctx.parser_function(post).unwrap();
        let entry = body.entry();
        let next = codegen.post_execute(&mut body, entry).unwrap();
        body.ret(next, Constant::i32(0));
        ctx.define(body).unwrap();

        Self {
            module: ctx.into_module(),
            codegen,
            spans,
            callbacks,
            start_fns,
            end_fns,
            pre,
            post,
            resume,
        }
    }

    pub fn color_of(&self, span: usize) -> usize {
        self.codegen.allocation().color_of(self.spans[span]).unwrap()
    }

    pub fn run(&self) -> Run<'_> {
        let host = Rc::new(RefCell::new(Host {
            calls: Vec::new(),
            codes: vec![0; self.spans.len()],
        }));
        let mut interp = Interpreter::new(&self.module);
        for (span, &cb) in self.callbacks.iter().enumerate() {
            let host = Rc::clone(&host);
            interp.on(cb, move |start, end| {
                let mut host = host.borrow_mut();
                host.calls.push(Call { span, start, end });
                host.codes[span]
            });
        }
        Run {
            harness: self,
            interp,
            instance: Instance::new(self.module.state()),
            host,
        }
    }
}

/// One parser instance driven through the harness functions.
pub(crate) struct Run<'h> {
    harness: &'h Harness,
    interp: Interpreter<'h, 'h>,
    pub instance: Instance,
    host: Rc<RefCell<Host>>,
}

impl Run<'_> {
    pub fn try_start(&mut self, span: usize, pos: usize, end: usize) -> Result<i32, InterpError> {
        let f = self.harness.start_fns[span];
        self.interp.invoke(&mut self.instance, f, pos, end)
    }

    pub fn try_end(&mut self, span: usize, pos: usize, end: usize) -> Result<i32, InterpError> {
        let f = self.harness.end_fns[span];
        self.interp.invoke(&mut self.instance, f, pos, end)
    }

    pub fn start(&mut self, span: usize, pos: usize, end: usize) -> i32 {
        self.try_start(span, pos, end).unwrap()
    }

    pub fn end(&mut self, span: usize, pos: usize, end: usize) -> i32 {
        self.try_end(span, pos, end).unwrap()
    }

    /// Prologue of a call on the buffer `[pos, end)`.
    pub fn pre(&mut self, pos: usize, end: usize) -> i32 {
        let f = self.harness.pre;
        self.interp.invoke(&mut self.instance, f, pos, end).unwrap()
    }

    /// Epilogue of a call whose buffer ends at `end`.
    pub fn post(&mut self, pos: usize, end: usize) -> i32 {
        let f = self.harness.post;
        self.interp.invoke(&mut self.instance, f, pos, end).unwrap()
    }

    pub fn fail_with(&self, span: usize, code: i32) {
        self.host.borrow_mut().codes[span] = code;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.host.borrow().calls.clone()
    }

    pub fn take_calls(&self) -> Vec<Call> {
        core::mem::take(&mut self.host.borrow_mut().calls)
    }

    pub fn field(&self, name: &str) -> RtValue {
        self.instance
            .by_name(self.harness.module.state(), name)
            .unwrap_or_else(|| panic!("no state field `{name}`"))
    }

    /// The `start` slot of `color`; `None` when no span of it is open.
    pub fn open_at(&self, color: usize) -> Option<usize> {
        match self.field(&format!("_span_pos{color}")) {
            RtValue::Ptr(pos) => pos,
            other => panic!("`_span_pos{color}` holds {other:?}"),
        }
    }

    pub fn current(&self) -> RtValue {
        self.field(CURRENT_FIELD)
    }
}

pub(crate) fn call(span: usize, start: usize, end: usize) -> Call {
    Call { span, start, end }
}

