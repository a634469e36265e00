//! Stack growth, frame discipline and iteration

use std::sync::Arc;

use muon_runtime::{
    ArgMap, Condition, Frame, FrameIterator, FrameKind, PieceId, Roots, Stack, Value,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rstest::rstest;

fn new_stack(default_piece_capacity: usize) -> Stack {
    Stack::new(Arc::new(Roots::new()), default_piece_capacity).expect("stack allocation")
}

fn push_organic(stack: &mut Stack, frame: &mut Frame, capacity: usize) {
    stack
        .push_frame(frame, capacity, ArgMap::empty())
        .expect("push_frame");
}

#[test]
fn fresh_stack_has_no_organic_frames() {
    let mut stack = new_stack(16);
    let frame = stack.open();
    assert_eq!(frame.kind(), FrameKind::StackBottom);
    let mut iter = FrameIterator::from_frame(&stack, &frame);
    assert!(!iter.advance());
}

#[test]
fn iterator_visits_every_organic_frame_newest_to_oldest() {
    let mut stack = new_stack(16);
    let mut frame = stack.open();
    let mut pushed = Vec::new();
    // The middle push is large enough to force growth onto a second piece.
    for capacity in [2, 20, 1] {
        push_organic(&mut stack, &mut frame, capacity);
        pushed.push((frame.piece_id(), frame.frame_pointer()));
    }
    assert_eq!(stack.top_piece(), PieceId(1));

    let mut visited = vec![(frame.piece_id(), frame.frame_pointer())];
    let mut iter = FrameIterator::from_frame(&stack, &frame);
    while iter.advance() {
        let current = iter.current();
        assert_eq!(current.kind(), FrameKind::Organic);
        visited.push((current.piece_id(), current.frame_pointer()));
    }
    pushed.reverse();
    assert_eq!(visited, pushed);
}

#[test]
fn growth_scenario_ten_locals_on_a_piece_of_eight() {
    let mut stack = new_stack(8);
    let mut frame = stack.open();
    push_organic(&mut stack, &mut frame, 10);
    // One new piece, sized so the retried push succeeded.
    assert_eq!(stack.top_piece(), PieceId(1));
    for i in 0..10 {
        frame
            .push(&mut stack, Value::Int(100 + i as i64))
            .expect("push local");
    }
    for i in 0..10 {
        assert_eq!(
            frame.local(&stack, i).expect("local"),
            Value::Int(100 + i as i64)
        );
    }
    // The eleventh push falls outside the frame.
    assert!(matches!(
        frame.push(&mut stack, Value::Int(0)),
        Err(Condition::OutOfBounds { .. })
    ));
}

#[rstest]
#[case(8, 10, 0)]
#[case(8, 10, 3)]
#[case(16, 40, 5)]
#[case(8, 1, 2)]
fn growth_preserves_transferred_arguments(
    #[case] default_capacity: usize,
    #[case] frame_capacity: usize,
    #[case] arg_count: usize,
) {
    let mut stack = new_stack(default_capacity.max(8 + arg_count));
    let mut frame = stack.open();
    // Stage the pending arguments in an organic frame big enough to hold
    // them, then force the next push across the piece boundary.
    push_organic(&mut stack, &mut frame, arg_count);
    for i in 0..arg_count {
        frame
            .push(&mut stack, Value::Int(i as i64))
            .expect("pending argument");
    }
    let old_top = stack.top_piece();
    stack
        .push_frame(&mut frame, frame_capacity, ArgMap::direct(arg_count))
        .expect("push_frame");
    if frame.piece_id() != old_top {
        // Grown: exactly one new piece, and the arguments came across in
        // order with identity preserved.
        assert_eq!(stack.top_piece().0, old_top.0 + 1);
    }
    for i in 0..arg_count {
        assert_eq!(frame.argument(&stack, i), Value::Int(i as i64));
    }
    stack.validate();
}

#[test]
fn set_argument_overwrites_in_place() {
    let mut stack = new_stack(32);
    let mut frame = stack.open();
    push_organic(&mut stack, &mut frame, 2);
    frame.push(&mut stack, Value::Int(1)).expect("arg");
    frame.push(&mut stack, Value::Int(2)).expect("arg");
    stack
        .push_frame(&mut frame, 1, ArgMap::direct(2))
        .expect("push_frame");
    frame.set_argument(&mut stack, 0, Value::symbol("patched"));
    assert_eq!(frame.argument(&stack, 0), Value::symbol("patched"));
    assert_eq!(frame.argument(&stack, 1), Value::Int(2));
}

#[test]
fn close_then_open_reproduces_the_cursor_across_growth() {
    let mut stack = new_stack(8);
    let mut frame = stack.open();
    push_organic(&mut stack, &mut frame, 10);
    frame.push(&mut stack, Value::Bool(true)).expect("push");
    frame.set_pc(9);
    let before = frame.clone();
    stack.close(frame);
    let after = stack.open();
    assert_eq!(before, after);
}

#[test]
#[should_panic(expected = "open stack piece")]
fn opening_an_open_stack_is_a_protocol_violation() {
    let mut stack = new_stack(16);
    let _frame = stack.open();
    let _second = stack.open();
}

proptest! {
    // Within a frame's capacity, pushes and pops are exactly LIFO.
    #[test]
    fn values_pop_in_lifo_order(values in proptest::collection::vec(-1000i64..1000, 1..20)) {
        let mut stack = new_stack(64);
        let mut frame = stack.open();
        stack.push_frame(&mut frame, values.len(), ArgMap::empty()).unwrap();
        for v in &values {
            frame.push(&mut stack, Value::Int(*v)).unwrap();
        }
        for (i, v) in values.iter().rev().enumerate() {
            prop_assert_eq!(frame.peek(&stack, i).unwrap(), Value::Int(*v));
        }
        for v in values.iter().rev() {
            prop_assert_eq!(frame.pop(&stack).unwrap(), Value::Int(*v));
        }
        prop_assert!(
            matches!(frame.pop(&stack), Err(Condition::OutOfBounds { .. })),
            "expected OutOfBounds"
        );
    }

    // A push either fits the top piece or triggers exactly one growth;
    // it never takes two pieces to satisfy one push.
    #[test]
    fn growth_never_cascades(capacity in 0usize..48, arg_count in 0usize..5) {
        let mut stack = new_stack(8 + arg_count);
        let mut frame = stack.open();
        stack.push_frame(&mut frame, arg_count, ArgMap::empty()).unwrap();
        for i in 0..arg_count {
            frame.push(&mut stack, Value::Int(i as i64)).unwrap();
        }
        let before = stack.top_piece().0;
        stack.push_frame(&mut frame, capacity, ArgMap::direct(arg_count)).unwrap();
        prop_assert!(stack.top_piece().0 - before <= 1);
        stack.validate();
    }
}
