use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use sluice_core::{Graph, Input, Node};
use std::time::Duration;

fn make_chain(graph: &Graph, depth: usize) -> (Input<u64>, Node<u64>) {
    let input = graph.input_with(0u64);
    let mut last = input.node();
    for _ in 0..depth {
        last = graph.map(&last, |v| v.wrapping_add(1));
    }
    (input, last)
}

fn make_diamonds(graph: &Graph, layers: usize) -> (Input<u64>, Node<u64>) {
    let input = graph.input_with(0u64);
    let mut last = input.node();
    for _ in 0..layers {
        let left = graph.map(&last, |v| v.wrapping_mul(3));
        let right = graph.map(&last, |v| v.wrapping_add(7));
        last = graph.zip(&left, &right, |l, r| l ^ r);
    }
    (input, last)
}

fn make_fan_in(graph: &Graph, width: usize) -> (Vec<Input<u64>>, Node<u64>) {
    let inputs: Vec<Input<u64>> = (0..width).map(|i| graph.input_with(i as u64)).collect();
    let nodes: Vec<Node<u64>> = inputs.iter().map(Input::node).collect();
    let sum = graph.computed_from_values(&nodes, |values: &[u64]| Ok(values.iter().sum::<u64>()));
    (inputs, sum)
}

fn bench_chains(c: &mut Criterion) {
    let mut group = c.benchmark_group("chain");
    group.measurement_time(Duration::from_secs(5));

    for depth in [10, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::new("set_head", depth), depth, |b, &depth| {
            let graph = Graph::new();
            let (input, tail) = make_chain(&graph, depth);
            let mut next = 0u64;
            b.iter(|| {
                next += 1;
                input.set_value(black_box(next));
                black_box(tail.try_value())
            });
        });
    }

    group.finish();
}

fn bench_diamonds(c: &mut Criterion) {
    let mut group = c.benchmark_group("diamond");

    for layers in [1, 10, 100].iter() {
        group.bench_with_input(BenchmarkId::new("set_root", layers), layers, |b, &layers| {
            let graph = Graph::new();
            let (input, bottom) = make_diamonds(&graph, layers);
            let mut next = 0u64;
            b.iter(|| {
                next += 1;
                input.set_value(black_box(next));
                black_box(bottom.try_value())
            });
        });
    }

    group.finish();
}

fn bench_fan_in(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_in");

    for width in [8, 64, 512].iter() {
        // Every input in one transaction: the sum recomputes once.
        group.bench_with_input(BenchmarkId::new("batched", width), width, |b, &width| {
            let graph = Graph::new();
            let (inputs, sum) = make_fan_in(&graph, width);
            let mut next = 0u64;
            b.iter(|| {
                next += 1;
                let tx = graph.transaction();
                for input in &inputs {
                    input.set_value_in(&tx, black_box(next));
                }
                tx.commit();
                black_box(sum.try_value())
            });
        });

        group.bench_with_input(BenchmarkId::new("unbatched", width), width, |b, &width| {
            let graph = Graph::new();
            let (inputs, sum) = make_fan_in(&graph, width);
            let mut next = 0u64;
            b.iter(|| {
                next += 1;
                for input in &inputs {
                    input.set_value(black_box(next));
                }
                black_box(sum.try_value())
            });
        });
    }

    group.finish();
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build");

    for depth in [100, 1000].iter() {
        group.bench_with_input(BenchmarkId::new("chain", depth), depth, |b, &depth| {
            b.iter(|| {
                let graph = Graph::new();
                let (_input, tail) = make_chain(&graph, black_box(depth));
                black_box(tail.try_value())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_chains, bench_diamonds, bench_fan_in, bench_build);
criterion_main!(benches);
