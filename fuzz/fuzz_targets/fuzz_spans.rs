#![no_main]
use std::{cell::RefCell, rc::Rc};

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use spangen::{
    CodegenOptions, Compilation, SpanAllocation, SpanCodegen,
    interp::{Instance, Interpreter, RtValue},
    ir::{CallConv, Constant, FuncRef, Module},
};

#[derive(Debug, Arbitrary)]
enum Step {
    Toggle { span: u8, advance: u8, code: i8 },
    Flush { advance: u8 },
}

#[derive(Debug, Arbitrary)]
struct Input {
    shape: Vec<u8>,
    debug_checks: bool,
    steps: Vec<Step>,
}

struct Compiled {
    module: Module,
    callbacks: Vec<FuncRef>,
    colors: Vec<usize>,
    starts: Vec<FuncRef>,
    ends: Vec<FuncRef>,
    pre: FuncRef,
    post: FuncRef,
    resume: FuncRef,
}

fn compile(shape: &[usize], options: CodegenOptions) -> Compiled {
    let mut ctx = Compilation::new(options).unwrap();
    let mut builder = SpanAllocation::builder();
    let mut spans = Vec::new();
    let mut callbacks = Vec::new();
    let mut colors = Vec::new();
    for (color, &members) in shape.iter().enumerate() {
        let ids: Vec<_> = (0..members)
            .map(|m| {
                let cb = ctx
                    .declare_callback(&format!("on_{color}_{m}"), CallConv::External)
                    .unwrap();
                callbacks.push(cb);
                colors.push(color);
                builder.span(format!("span_{color}_{m}"), cb)
            })
            .collect();
        spans.extend(&ids);
        builder.color(ids);
    }
    let codegen = SpanCodegen::new(&mut ctx, builder.build().unwrap()).unwrap();

    let resume = ctx.declare_parser_function("resume").unwrap();
    let mut body = ctx.parser_function(resume).unwrap();
    let entry = body.entry();
    body.ret(entry, Constant::i32(0));
    ctx.define(body).unwrap();

    let mut starts = Vec::new();
    let mut ends = Vec::new();
    for (i, &span) in spans.iter().enumerate() {
        let f = ctx.declare_parser_function(&format!("start_{i}")).unwrap();
        let mut body = ctx.parser_function(f).unwrap();
        let entry = body.entry();
        let next = codegen.span_start(&mut body, entry, span).unwrap();
        body.ret(next, Constant::i32(0));
        ctx.define(body).unwrap();
        starts.push(f);

        let f = ctx.declare_parser_function(&format!("end_{i}")).unwrap();
        let mut body = ctx.parser_function(f).unwrap();
        let entry = body.entry();
        let end = codegen.span_end(&mut body, entry, span).unwrap();
        body.ret(end.next, Constant::i32(0));
        end.on_error.resume_at(ctx.module(), &mut body, resume).unwrap();
        ctx.define(body).unwrap();
        ends.push(f);
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

    Compiled {
        module: ctx.into_module(),
        callbacks,
        colors,
        starts,
        ends,
        pre,
        post,
        resume,
    }
}

fuzz_target!(|input: Input| {
    let shape: Vec<usize> = input
        .shape
        .iter()
        .take(8)
        .map(|&m| 1 + usize::from(m % 4))
        .collect();
    if shape.is_empty() {
        return;
    }
    let options = CodegenOptions {
        debug_checks: input.debug_checks,
        ..Default::default()
    };
    let c = compile(&shape, options);
    let text = c.module.to_string();
    assert!(text.contains("_span_pos0"));

    // Status code each callback returns next, and every call seen.
    let codes = Rc::new(RefCell::new(vec![0i32; c.callbacks.len()]));
    let calls = Rc::new(RefCell::new(Vec::new()));
    let mut interp = Interpreter::new(&c.module);
    for (span, &cb) in c.callbacks.iter().enumerate() {
        let codes = Rc::clone(&codes);
        let calls = Rc::clone(&calls);
        interp.on(cb, move |start, end| {
            calls.borrow_mut().push((span, start, end));
            codes.borrow()[span]
        });
    }
    let mut instance = Instance::new(c.module.state());
    let start_of = |instance: &Instance, color: usize| {
        match instance.by_name(c.module.state(), &format!("_span_pos{color}")) {
            Some(RtValue::Ptr(p)) => p,
            other => panic!("bad start slot {other:?}"),
        }
    };

    let mut open: Vec<Option<(usize, usize)>> = vec![None; shape.len()];
    let mut expected = Vec::new();
    let mut pos = 0usize;

    for step in input.steps.iter().take(256) {
        match *step {
            Step::Toggle {
                span,
                advance,
                code,
            } => {
                pos += usize::from(advance);
                let span = usize::from(span) % c.callbacks.len();
                let color = c.colors[span];
                match open[color] {
                    None => {
                        let status = interp.invoke(&mut instance, c.starts[span], pos, pos).unwrap();
                        assert_eq!(status, 0);
                        open[color] = Some((span, pos));
                    }
                    Some((member, start)) if member == span => {
                        codes.borrow_mut()[span] = i32::from(code);
                        let status = interp.invoke(&mut instance, c.ends[span], pos, pos).unwrap();
                        expected.push((span, start, pos));
                        open[color] = None;
                        if code == 0 {
                            assert_eq!(status, 0);
                        } else {
                            assert_eq!(status, -1);
                            assert_eq!(
                                instance.by_name(c.module.state(), "_current"),
                                Some(RtValue::Func(Some(c.resume)))
                            );
                            assert_eq!(
                                instance.by_name(c.module.state(), "error"),
                                Some(RtValue::Int(i64::from(code)))
                            );
                        }
                        codes.borrow_mut()[span] = 0;
                    }
                    Some(_) => {}
                }
            }
            Step::Flush { advance } => {
                pos += usize::from(advance);
                let status = interp.invoke(&mut instance, c.post, pos, pos).unwrap();
                assert_eq!(status, 0);
                expected.extend(open.iter().flatten().map(|&(span, start)| (span, start, pos)));
                pos = 0;
                interp.invoke(&mut instance, c.pre, pos, pos).unwrap();
                for slot in open.iter_mut().flatten() {
                    slot.1 = pos;
                }
            }
        }

        for (color, slot) in open.iter().enumerate() {
            assert_eq!(start_of(&instance, color), slot.map(|(_, start)| start));
        }
        assert_eq!(*calls.borrow(), expected);
    }
});
