//! Backtrace reconstruction from suspended frames

use std::sync::Arc;

use muon_runtime::{
    capture_backtrace, ArgMap, CallTags, CodeBlock, Frame, Opcode, Roots, Stack, Value,
};
use pretty_assertions::assert_eq;

fn new_stack(default_piece_capacity: usize) -> Stack {
    Stack::new(Arc::new(Roots::new()), default_piece_capacity).expect("stack allocation")
}

fn push_organic(stack: &mut Stack, frame: &mut Frame, capacity: usize) {
    stack
        .push_frame(frame, capacity, ArgMap::empty())
        .expect("push_frame");
}

fn tags(entries: Vec<(Value, usize)>) -> Arc<CallTags> {
    Arc::new(CallTags::new(entries))
}

#[test]
fn an_empty_stack_yields_an_empty_backtrace() {
    let mut stack = new_stack(16);
    let frame = stack.open();
    let trace = capture_backtrace(&stack, &frame);
    assert!(trace.is_empty());
    assert_eq!(trace.to_string(), "--- backtrace ---");
}

#[test]
fn invoke_entries_reconstruct_subject_selector_and_arguments() {
    let mut code = CodeBlock::new(4);
    code.emit_invoke(tags(vec![
        (Value::Key(0), 2),
        (Value::Key(1), 1),
        (Value::Int(0), 0),
    ]));
    let return_pc = code.current_offset();
    code.emit(Opcode::Return);
    let code = Arc::new(code);

    let mut stack = new_stack(32);
    let mut frame = stack.open();
    push_organic(&mut stack, &mut frame, 4);
    frame.set_code_block(&mut stack, Value::Code(Arc::clone(&code)));
    frame
        .push(&mut stack, Value::symbol("console"))
        .expect("subject");
    frame
        .push(&mut stack, Value::symbol("log"))
        .expect("selector");
    frame.push(&mut stack, Value::Int(42)).expect("argument");
    frame.set_pc(return_pc);

    let trace = capture_backtrace(&stack, &frame);
    assert_eq!(trace.len(), 1);
    let entry = &trace.entries()[0];
    assert_eq!(entry.opcode(), Opcode::Invoke);
    assert_eq!(
        entry.invocation(),
        Some(
            &[
                (Value::Key(0), Value::symbol("console")),
                (Value::Key(1), Value::symbol("log")),
                (Value::Int(0), Value::Int(42)),
            ][..]
        )
    );
    assert_eq!(trace.to_string(), "--- backtrace ---\n- console.log(42)");
}

#[test]
fn named_arguments_render_with_their_tags() {
    let mut code = CodeBlock::new(4);
    code.emit_invoke(tags(vec![
        (Value::Key(0), 2),
        (Value::Int(0), 1),
        (Value::symbol("mode"), 0),
    ]));
    let return_pc = code.current_offset();
    let code = Arc::new(code);

    let mut stack = new_stack(32);
    let mut frame = stack.open();
    push_organic(&mut stack, &mut frame, 4);
    frame.set_code_block(&mut stack, Value::Code(code));
    frame
        .push(&mut stack, Value::symbol("format"))
        .expect("subject");
    frame.push(&mut stack, Value::Int(42)).expect("argument");
    frame
        .push(&mut stack, Value::symbol("wide"))
        .expect("argument");
    frame.set_pc(return_pc);

    let trace = capture_backtrace(&stack, &frame);
    assert_eq!(trace.to_string(), "--- backtrace ---\n- format(42, mode: wide)");
}

#[test]
fn ensure_calls_render_without_argument_structure() {
    let mut code = CodeBlock::new(1);
    code.emit_ensure_call();
    let return_pc = code.current_offset();
    let code = Arc::new(code);

    let mut stack = new_stack(16);
    let mut frame = stack.open();
    push_organic(&mut stack, &mut frame, 1);
    frame.set_code_block(&mut stack, Value::Code(code));
    frame.set_pc(return_pc);

    let trace = capture_backtrace(&stack, &frame);
    assert_eq!(trace.len(), 1);
    assert_eq!(trace.entries()[0].opcode(), Opcode::CallEnsurer);
    assert_eq!(trace.entries()[0].invocation(), None);
    assert_eq!(trace.to_string(), "--- backtrace ---\n- ensure");
}

#[test]
fn builtin_escapes_read_the_tag_record_left_on_the_stack() {
    let mut code = CodeBlock::new(4);
    code.emit_builtin_maybe_escape();
    let return_pc = code.current_offset();
    let code = Arc::new(code);

    let mut stack = new_stack(32);
    let mut frame = stack.open();
    push_organic(&mut stack, &mut frame, 4);
    frame.set_code_block(&mut stack, Value::Code(code));
    frame
        .push(&mut stack, Value::symbol("file"))
        .expect("subject");
    frame
        .push(&mut stack, Value::symbol("close"))
        .expect("selector");
    // The builtin leaves its tag record on top; offsets count from below it.
    frame
        .push(
            &mut stack,
            Value::Tags(tags(vec![(Value::Key(0), 1), (Value::Key(1), 0)])),
        )
        .expect("tag record");
    frame.set_pc(return_pc);
    let sp_before = frame.stack_pointer();

    let trace = capture_backtrace(&stack, &frame);
    assert_eq!(trace.to_string(), "--- backtrace ---\n- leave.close()");
    // Capture never disturbs the live cursor.
    assert_eq!(frame.stack_pointer(), sp_before);
}

#[test]
fn capture_walks_through_a_piece_boundary() {
    let mut code = CodeBlock::new(4);
    code.emit_invoke(tags(vec![(Value::Key(0), 1), (Value::Key(1), 0)]));
    let return_pc = code.current_offset();
    let code = Arc::new(code);

    let mut stack = new_stack(16);
    let mut frame = stack.open();
    push_organic(&mut stack, &mut frame, 2);
    frame.set_code_block(&mut stack, Value::Code(code));
    frame
        .push(&mut stack, Value::symbol("main"))
        .expect("subject");
    frame
        .push(&mut stack, Value::symbol("run"))
        .expect("selector");
    frame.set_pc(return_pc);

    // The callee does not fit the first piece; its frame lands on a new one.
    let old_top = stack.top_piece();
    stack
        .push_frame(&mut frame, 20, ArgMap::direct(2))
        .expect("push_frame");
    assert_eq!(stack.top_piece().0, old_top.0 + 1);

    // The callee is not suspended at a call site, so only the caller's
    // invocation shows up, reconstructed from across the boundary.
    let trace = capture_backtrace(&stack, &frame);
    assert_eq!(trace.len(), 1);
    assert_eq!(trace.to_string(), "--- backtrace ---\n- main.run()");
}
