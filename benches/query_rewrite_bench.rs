use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use stacks_events_query::lexer::Lexer;
use stacks_events_query::parser::Parser;
use stacks_events_query::{StacksAndEventsQueryMode, StacksAndEventsQueryVisitor};
use std::hint::black_box;

const TEST_CASES: &[(&str, &str)] = &[
    ("simple", "status:open"),
    ("medium", "blah:true (status:fixed OR status:open) is_hidden:false"),
    (
        "complex",
        "project:123 (status:open OR status:regressed) (ref.session:5f3dce2668de920001466635 OR project:234) first:[2020-01-01 TO *] NOT tag:ui",
    ),
];

// Tokenizing
fn benchmark_lexer(c: &mut Criterion) {
    let mut group = c.benchmark_group("lexer_performance");

    for &(name, filter) in TEST_CASES {
        group.bench_with_input(BenchmarkId::new("tokenize", name), &filter, |b, &filter| {
            b.iter(|| {
                let tokens: Vec<_> = Lexer::new(black_box(filter)).collect();
                black_box(tokens)
            })
        });
    }

    group.finish();
}

// Parsing pre-tokenized input
fn benchmark_parser(c: &mut Criterion) {
    let mut group = c.benchmark_group("parser_performance");

    for &(name, filter) in TEST_CASES {
        let tokens: Vec<_> = Lexer::new(filter).collect();

        group.bench_with_input(BenchmarkId::new("parse", name), &tokens, |b, tokens| {
            b.iter(|| {
                let mut parser = Parser::new(black_box(tokens));
                match parser.parse() {
                    Ok(tree) => black_box(tree),
                    Err(_) => panic!("parse failed"),
                }
            })
        });
    }

    group.finish();
}

// Rewriting an already parsed tree under each mode
fn benchmark_rewrite(c: &mut Criterion) {
    let mut group = c.benchmark_group("rewrite_performance");

    for &(name, filter) in TEST_CASES {
        let tree = stacks_events_query::parse(filter).expect("parse should succeed");

        for mode in StacksAndEventsQueryMode::ALL {
            let id = format!("{}/{:?}", name, mode);
            group.bench_with_input(BenchmarkId::new("rewrite", id), &tree, |b, tree| {
                b.iter(|| black_box(StacksAndEventsQueryVisitor::run(black_box(tree.clone()), mode)))
            });
        }
    }

    group.finish();
}

// Text in, three filters out
fn benchmark_end_to_end(c: &mut Criterion) {
    let mut group = c.benchmark_group("end_to_end_performance");

    for &(name, filter) in TEST_CASES {
        group.bench_with_input(BenchmarkId::new("split", name), &filter, |b, &filter| {
            b.iter(|| {
                for mode in StacksAndEventsQueryMode::ALL {
                    let result = StacksAndEventsQueryVisitor::run_query(black_box(filter), mode)
                        .expect("rewrite should succeed");
                    black_box(result);
                }
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_lexer,
    benchmark_parser,
    benchmark_rewrite,
    benchmark_end_to_end
);
criterion_main!(benches);
