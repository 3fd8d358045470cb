//! Performance benchmarks for the composition text format parser
//!
//! Run with: cargo bench --bench composition_parser_bench

use cableflow::graph::serialization::parse_composition;
use cableflow::NodeClassCatalog;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

/// Generate a chain composition with the given node count
fn generate_chain(nodes: usize) -> String {
    let mut text = String::from("digraph Bench\n{\nname=\"Bench\";\n\n");
    for i in 0..nodes {
        text.push_str(&format!(
            "n{0} [type=\"bench.pass\", pos=\"{1}.000000,0.000000\", _value=\"{0}\"];\n",
            i,
            i * 100
        ));
    }
    text.push('\n');
    for i in 1..nodes {
        text.push_str(&format!("n{}:out -> n{}:value;\n", i - 1, i));
    }
    text.push_str("}\n");
    text
}

fn bench_parse_small(c: &mut Criterion) {
    let text = generate_chain(10);
    c.bench_function("parse_10_node_chain", |b| {
        b.iter(|| {
            let catalog = NodeClassCatalog::new();
            black_box(parse_composition(black_box(&text), &catalog).unwrap())
        })
    });
}

fn bench_parse_large(c: &mut Criterion) {
    let text = generate_chain(500);
    c.bench_function("parse_500_node_chain", |b| {
        b.iter(|| {
            let catalog = NodeClassCatalog::new();
            black_box(parse_composition(black_box(&text), &catalog).unwrap())
        })
    });
}

fn bench_round_trip(c: &mut Criterion) {
    let text = generate_chain(100);
    let catalog = NodeClassCatalog::new();
    let outcome = parse_composition(&text, &catalog).unwrap();

    c.bench_function("serialize_100_node_chain", |b| {
        b.iter(|| black_box(outcome.composition.to_graph_text()))
    });
}

criterion_group!(benches, bench_parse_small, bench_parse_large, bench_round_trip);
criterion_main!(benches);
