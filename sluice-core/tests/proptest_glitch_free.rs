//! Property-based invariant tests for propagation.
//!
//! Random layered graphs of summing nodes are driven by random batches of
//! input mutations. After every commit:
//!
//! 1. Every computation only ever saw final source values (no glitches).
//! 2. Every node downstream of a touched input recomputed exactly once, and
//!    every other node not at all.
//! 3. Every node holds the value a from-scratch evaluation gives.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use proptest::prelude::*;
use sluice_core::{Graph, Input, Node};

// ── Strategies ────────────────────────────────────────────────────────────

/// Inputs come first; computed node `k` reads from any of the nodes before it.
#[derive(Debug, Clone)]
struct Shape {
    inputs: Vec<i64>,
    computed: Vec<Vec<usize>>,
}

fn shape_strategy() -> impl Strategy<Value = Shape> {
    (1usize..=3, 1usize..=8).prop_flat_map(|(input_count, computed_count)| {
        let inputs = proptest::collection::vec(-100i64..100, input_count);
        let computed: Vec<_> = (0..computed_count)
            .map(|k| proptest::collection::vec(0..(input_count + k), 1..=3))
            .collect();
        (inputs, computed).prop_map(|(inputs, computed)| Shape { inputs, computed })
    })
}

/// Batches of (input index, value) mutations.
fn batches_strategy() -> impl Strategy<Value = Vec<Vec<(usize, i64)>>> {
    proptest::collection::vec(proptest::collection::vec((0usize..3, -100i64..100), 1..=4), 1..=6)
}

// ── Model ─────────────────────────────────────────────────────────────────

fn expected(shape: &Shape, inputs: &[i64], index: usize) -> i64 {
    if index < inputs.len() {
        return inputs[index];
    }
    shape.computed[index - inputs.len()]
        .iter()
        .fold(0i64, |acc, &source| acc.wrapping_add(expected(shape, inputs, source)))
}

fn depends_on_any(shape: &Shape, touched: &[bool], index: usize) -> bool {
    if index < touched.len() {
        return touched[index];
    }
    shape.computed[index - touched.len()]
        .iter()
        .any(|&source| depends_on_any(shape, touched, source))
}

struct Harness {
    graph: Graph,
    inputs: Vec<Input<i64>>,
    nodes: Vec<Node<i64>>,
    model: Rc<RefCell<Vec<i64>>>,
    runs: Rc<RefCell<Vec<usize>>>,
    glitched: Rc<Cell<bool>>,
}

fn build(shape: &Shape) -> Harness {
    let graph = Graph::new();
    let shape_rc = Rc::new(shape.clone());
    let model = Rc::new(RefCell::new(shape.inputs.clone()));
    let runs = Rc::new(RefCell::new(vec![0; shape.computed.len()]));
    let glitched = Rc::new(Cell::new(false));

    let inputs: Vec<Input<i64>> = shape.inputs.iter().map(|v| graph.input_with(*v)).collect();
    let mut nodes: Vec<Node<i64>> = inputs.iter().map(Input::node).collect();

    for (k, sources) in shape.computed.iter().enumerate() {
        let handles: Vec<Node<i64>> = sources.iter().map(|&s| nodes[s].clone()).collect();
        let sources = sources.clone();
        let (shape, model, runs, glitched) = (shape_rc.clone(), model.clone(), runs.clone(), glitched.clone());
        let node = graph.computed_from_values(&handles, move |values: &[i64]| {
            runs.borrow_mut()[k] += 1;
            let inputs = model.borrow();
            for (value, &source) in values.iter().zip(&sources) {
                if *value != expected(&shape, &inputs, source) {
                    glitched.set(true);
                }
            }
            Ok(values.iter().fold(0i64, |acc, v| acc.wrapping_add(*v)))
        });
        nodes.push(node);
    }

    Harness {
        graph,
        inputs,
        nodes,
        model,
        runs,
        glitched,
    }
}

// ═════════════════════════════════════════════════════════════════════════
// Propagation invariants
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn batches_are_glitch_free_and_minimal(shape in shape_strategy(), batches in batches_strategy()) {
        let harness = build(&shape);
        let input_count = shape.inputs.len();

        for batch in batches {
            harness.runs.borrow_mut().iter_mut().for_each(|r| *r = 0);
            let mut touched = vec![false; input_count];

            let tx = harness.graph.transaction();
            for (index, value) in batch {
                let index = index % input_count;
                touched[index] = true;
                harness.model.borrow_mut()[index] = value;
                harness.inputs[index].set_value_in(&tx, value);
            }
            tx.commit();

            prop_assert!(!harness.glitched.get(), "a computation saw a stale source");

            let runs = harness.runs.borrow().clone();
            for (k, count) in runs.iter().enumerate() {
                let affected = depends_on_any(&shape, &touched, input_count + k);
                prop_assert_eq!(*count, usize::from(affected), "node {} ran {} times", k, count);
            }

            let inputs = harness.model.borrow().clone();
            for (index, node) in harness.nodes.iter().enumerate() {
                prop_assert_eq!(node.value(), Ok(expected(&shape, &inputs, index)));
            }
        }
    }

    #[test]
    fn unbatched_sets_match_the_model(shape in shape_strategy(), sets in proptest::collection::vec((0usize..3, -50i64..50), 1..=10)) {
        let harness = build(&shape);
        let input_count = shape.inputs.len();

        for (index, value) in sets {
            let index = index % input_count;
            harness.model.borrow_mut()[index] = value;
            harness.inputs[index].set_value(value);

            let inputs = harness.model.borrow().clone();
            let last = harness.nodes.len() - 1;
            prop_assert_eq!(harness.nodes[last].value(), Ok(expected(&shape, &inputs, last)));
        }
        prop_assert!(!harness.glitched.get());
    }
}
