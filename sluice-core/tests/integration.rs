//! Integration Tests for the Dataflow Engine
//!
//! These tests verify that inputs, computed nodes, sockets and switches work
//! together through the public API.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use sluice_core::{
    BindError, Comparer, Content, Graph, GraphConfig, Input, Node, NodeError, Selection, SourceState,
    VisitEvent, Visited,
};

/// Input -> {v / 2, v % 2} -> left * 2 + right.
fn diamond(graph: &Graph) -> (Input<i32>, Node<i32>, Rc<Cell<usize>>) {
    let input = graph.input::<i32>();
    let left = graph.map(&input, |v| v / 2);
    let right = graph.map(&input, |v| v % 2);
    let runs = Rc::new(Cell::new(0));
    let counter = runs.clone();
    let combine = graph.computed_from_values(&[left, right], move |values| {
        counter.set(counter.get() + 1);
        Ok(values[0] * 2 + values[1])
    });
    (input, combine, runs)
}

/// Test that a diamond never sees a mix of old and new values.
#[test]
fn diamond_is_glitch_free() {
    let graph = Graph::new();
    let (input, combine, runs) = diamond(&graph);

    // Before any mutation there is neither a value nor an error
    assert!(combine.content().is_empty());
    assert_eq!(combine.try_error(), None);

    for v in 0..10 {
        input.set_value(v);
        assert_eq!(combine.value(), Ok(v));
    }

    // One recompute per mutation, never one per path
    assert_eq!(runs.get(), 10);
}

/// Test that resetting an input empties everything derived from it.
#[test]
fn reset_empties_derived_nodes() {
    let graph = Graph::new();
    let (input, combine, _) = diamond(&graph);

    input.set_value(7);
    assert_eq!(combine.value(), Ok(7));

    input.reset();
    assert!(combine.content().is_empty());
    assert_eq!(combine.try_value(), None);
    assert_eq!(combine.try_error(), None);
}

/// Test that errors aggregate exactly the failing sources.
#[test]
fn errors_aggregate_failing_sources() {
    let graph = Graph::new();
    let a = graph.input_with(1);
    let b = graph.input_with(2);
    let c = graph.input::<i32>();
    let sum = graph.computed_from_values(&[a.node(), b.node(), c.node()], |values| {
        Ok(values.iter().sum::<i32>())
    });

    // Empty without errors stays Empty
    assert!(sum.content().is_empty());

    let tx = graph.transaction();
    a.set_error_in(&tx, "a failed");
    c.set_error_in(&tx, "c failed");
    tx.commit();

    let error = sum.try_error().expect("sum should hold an error");
    assert_eq!(
        error.inner_errors(),
        &[NodeError::message("a failed"), NodeError::message("c failed")]
    );

    a.set_value(10);
    c.set_value(100);
    assert_eq!(sum.value(), Ok(112));
}

/// Test that a comparer stops the Changed cascade.
#[test]
fn comparer_suppresses_unchanged_results() {
    let graph = Graph::new();
    let input = graph.input_with(1);
    let parity = graph.computed_from_values_with(&[input.node()], Comparer::equality(), |values| {
        Ok(values[0] % 2)
    });
    let runs = Rc::new(Cell::new(0));
    let counter = runs.clone();
    let _label = graph.map(&parity, move |p| {
        counter.set(counter.get() + 1);
        if *p == 0 { "even" } else { "odd" }
    });
    assert_eq!(runs.get(), 1);

    input.set_value(3);
    assert_eq!(runs.get(), 1);

    input.set_value(4);
    assert_eq!(runs.get(), 2);
}

/// Test that without a comparer every set counts as a change.
#[test]
fn without_comparer_every_set_changes() {
    let graph = Graph::new();
    let input = graph.input_with(1);
    let runs = Rc::new(Cell::new(0));
    let counter = runs.clone();
    let _mirror = graph.map(&input, move |v| {
        counter.set(counter.get() + 1);
        *v
    });

    input.set_value(1);
    input.set_value(1);
    assert_eq!(runs.get(), 3);
}

/// Test that from-states computations see which sources took part.
#[test]
fn from_states_reports_participation() {
    let graph = Graph::new();
    let a = graph.input_with(1);
    let b = graph.input::<i32>();
    let snapshot: Rc<RefCell<Vec<(bool, Visited)>>> = Rc::default();
    let sink = snapshot.clone();
    let _node = graph.computed_from_states(&[a.node(), b.node()], move |states: &[SourceState<i32>]| {
        *sink.borrow_mut() = states
            .iter()
            .map(|state| (state.content.is_value(), state.visited))
            .collect();
        Ok(states.len())
    });
    assert_eq!(
        *snapshot.borrow(),
        vec![(true, Visited::NotVisited), (false, Visited::NotVisited)]
    );

    b.set_value(2);
    assert_eq!(
        *snapshot.borrow(),
        vec![(true, Visited::NotVisited), (true, Visited::VisitedWithChange)]
    );
}

/// Build Input -> Socket1 -> Socket2 in the given order.
fn socket_chain(bind_outer_first: bool, batched: bool) {
    let graph = Graph::new();
    let input = graph.input_with(42);
    let inner = graph.socket::<i32>();
    let outer = graph.socket::<i32>();
    let reader = graph.map(&outer, |v| v + 1);

    let tx = graph.transaction();
    let bind = |socket: &sluice_core::Socket<i32>, target: &Node<i32>| {
        if batched {
            socket.bind_in(&tx, target)
        } else {
            socket.bind(target)
        }
    };
    if bind_outer_first {
        bind(&outer, &inner.node()).unwrap();
        bind(&inner, &input.node()).unwrap();
    } else {
        bind(&inner, &input.node()).unwrap();
        bind(&outer, &inner.node()).unwrap();
    }
    tx.commit();

    assert_eq!(outer.value(), Ok(42));
    assert_eq!(outer.deep_target(), Some(input.node()));
    assert_eq!(reader.value(), Ok(43));

    input.set_value(1);
    assert_eq!(reader.value(), Ok(2));
}

/// Test that socket chains resolve the same in all four orderings.
#[test]
fn socket_chain_is_transparent_in_every_order() {
    for bind_outer_first in [false, true] {
        for batched in [false, true] {
            socket_chain(bind_outer_first, batched);
        }
    }
}

/// Test that a selection change and a bind to the switch commit together.
#[test]
fn batched_switch_and_bind_commit_atomically() {
    let graph = Graph::new();
    let a = graph.input_with("a");
    let b = graph.input_with("b");
    let selector = graph.input_with::<Selection<&str>>(Some(a.node()));
    let switch = graph.switch(&selector);
    let socket = graph.socket::<&str>();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    let reader = graph.map(&socket, move |v| {
        sink.borrow_mut().push(*v);
        v.to_uppercase()
    });
    assert_eq!(switch.value(), Ok("a"));

    let tx = graph.transaction();
    selector.set_value_in(&tx, Some(b.node()));
    socket.bind_in(&tx, &switch).unwrap();
    assert!(seen.borrow().is_empty());
    tx.commit();

    assert_eq!(reader.value().as_deref(), Ok("B"));
    assert_eq!(*seen.borrow(), vec!["b"]);
    assert_eq!(graph.active_target(&switch), Some(b.node()));
}

/// Same as above with the bind made before the selection change.
#[test]
fn bind_then_select_in_one_batch() {
    let graph = Graph::new();
    let a = graph.input_with(1);
    let b = graph.input_with(2);
    let selector = graph.input_with::<Selection<i32>>(Some(a.node()));
    let switch = graph.switch(&selector);
    let socket = graph.socket::<i32>();
    let runs = Rc::new(Cell::new(0));
    let counter = runs.clone();
    let reader = graph.map(&socket, move |v| {
        counter.set(counter.get() + 1);
        v * 100
    });

    let tx = graph.transaction();
    socket.bind_in(&tx, &switch).unwrap();
    selector.set_value_in(&tx, Some(b.node()));
    tx.commit();

    assert_eq!(reader.value(), Ok(200));
    assert_eq!(runs.get(), 1);
}

/// Test that switching away from a target mid-transaction drains it.
#[test]
fn switch_drops_old_target_in_the_same_transaction() {
    let graph = Graph::new();
    let a = graph.input_with(1);
    let b = graph.input_with(2);
    let selector = graph.input_with::<Selection<i32>>(Some(a.node()));
    let switch = graph.switch(&selector);
    let runs = Rc::new(Cell::new(0));
    let counter = runs.clone();
    let _reader = graph.map(&switch, move |v| {
        counter.set(counter.get() + 1);
        *v
    });
    assert_eq!(runs.get(), 1);

    // The selector leaves first, while the old target still owes its Leave
    let tx = graph.transaction();
    selector.set_value_in(&tx, Some(b.node()));
    a.set_value_in(&tx, 10);
    tx.commit();
    assert_eq!(switch.value(), Ok(2));
    assert_eq!(runs.get(), 2);

    // The old target no longer reaches the switch
    a.set_value(11);
    assert_eq!(runs.get(), 2);
    b.set_value(3);
    assert_eq!(switch.value(), Ok(3));
    assert_eq!(runs.get(), 3);
}

/// Test that self-referencing selections are reported as Looped.
#[test]
fn switch_selecting_itself_is_looped() {
    let graph = Graph::new();
    let selector = graph.input::<Selection<i32>>();
    let switch = graph.switch(&selector);
    let socket = graph.socket::<i32>();
    socket.bind(&switch).unwrap();

    // Directly
    selector.set_value(Some(switch.clone()));
    assert_eq!(switch.value(), Err(NodeError::Looped));

    // Through a socket bound to the switch
    selector.set_value(Some(socket.node()));
    assert_eq!(switch.value(), Err(NodeError::Looped));
    assert_eq!(socket.value(), Err(NodeError::Looped));
}

/// Test that cyclic binds fail immediately.
#[test]
fn cyclic_binds_are_rejected() {
    let graph = Graph::new();
    let first = graph.socket::<i32>();
    let second = graph.socket::<i32>();
    let descendant = graph.map(&first, |v| v * 2);

    assert_eq!(
        first.bind(&first.node()),
        Err(BindError::SelfBinding { socket: first.id() })
    );

    second.bind(&first.node()).unwrap();
    assert_eq!(
        first.bind(&second.node()),
        Err(BindError::Cycle {
            socket: first.id(),
            target: second.id()
        })
    );
    assert_eq!(
        first.bind(&descendant),
        Err(BindError::Cycle {
            socket: first.id(),
            target: descendant.id()
        })
    );
    assert!(!first.is_bound());
}

/// Test that nodes created mid-batch join the open transaction.
#[test]
fn late_subscribers_catch_up() {
    let graph = Graph::new();
    let input = graph.input_with(1);

    let tx = graph.transaction();
    input.set_value_in(&tx, 5);
    let doubled = graph.map(&input, |v| v * 2);
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = events.clone();
    doubled.observe(move |event, _| sink.borrow_mut().push(event));

    // Caught up with the Enter it missed
    assert_eq!(*events.borrow(), vec![VisitEvent::EnterUpdate]);
    tx.commit();

    assert_eq!(doubled.value(), Ok(10));
    assert_eq!(
        *events.borrow(),
        vec![VisitEvent::EnterUpdate, VisitEvent::LeaveChanged]
    );
}

/// Test that a bind probe shows up as a LoopSearch on the visit stream.
#[test]
fn bind_probe_is_observable() {
    let graph = Graph::with_config(GraphConfig::default().with_trace());
    let input = graph.input_with(1);
    let socket = graph.socket::<i32>();
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = events.clone();
    socket.observe(move |event, _| sink.borrow_mut().push(event));

    socket.bind(&input).unwrap();
    assert_eq!(
        *events.borrow(),
        vec![
            VisitEvent::EnterLoopSearch,
            VisitEvent::LeaveLoopSearch,
            VisitEvent::EnterUpdate,
            VisitEvent::LeaveChanged,
        ]
    );
    let trace = graph.take_trace();
    assert!(trace.iter().any(|record| record.event.is_loop_search()));
}

/// Test that two open transactions cannot share a node.
#[test]
#[should_panic(expected = "is occupied by")]
fn second_transaction_on_an_occupied_node_is_a_fault() {
    let graph = Graph::new();
    let input = graph.input::<i32>();
    let first = graph.transaction();
    let second = graph.transaction();
    input.set_value_in(&first, 1);
    input.set_value_in(&second, 2);
}

/// Test that one source can drive several graphs.
#[test]
fn one_batch_spans_graphs() {
    let left = Graph::new();
    let right = Graph::new();
    let a = left.input::<i32>();
    let b = right.input::<i32>();
    let a2 = left.map(&a, |v| v + 1);
    let b2 = right.map(&b, |v| v + 2);

    let tx = left.transaction();
    a.set_value_in(&tx, 1);
    b.set_value_in(&tx, 1);
    assert!(a2.content().is_empty());
    drop(tx);

    assert_eq!(a2.value(), Ok(2));
    assert_eq!(b2.value(), Ok(3));
}

/// Test the content model through a node handle.
#[test]
fn content_reads_never_fail() {
    let graph = Graph::new();
    let input = graph.input::<u8>();
    assert_eq!(input.get_or(9), 9);
    assert_eq!(input.content(), Content::Empty);
    input.set_error(NodeError::Disconnected);
    assert_eq!(input.get_or(9), 9);
    let kind = input.match_content(|_| "value", |e| {
        if e.is_empty_sentinel() {
            "empty"
        } else {
            "error"
        }
    });
    assert_eq!(kind, "error");
}

/// Test that a socket bound to a target already in the batch sees one
/// Enter and one Leave.
#[test]
fn bind_to_an_in_flight_target_observes_one_update() {
    let graph = Graph::new();
    let input = graph.input_with(1);
    let socket = graph.socket::<i32>();
    let reader = graph.map(&socket, |v| v * 10);
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = events.clone();
    socket.observe(move |event, _| {
        if !event.is_loop_search() {
            sink.borrow_mut().push(event);
        }
    });

    let tx = graph.transaction();
    input.set_value_in(&tx, 5);
    socket.bind_in(&tx, &input).unwrap();
    assert_eq!(*events.borrow(), vec![VisitEvent::EnterUpdate]);
    tx.commit();

    assert_eq!(
        *events.borrow(),
        vec![VisitEvent::EnterUpdate, VisitEvent::LeaveChanged]
    );
    assert_eq!(reader.value(), Ok(50));
}
