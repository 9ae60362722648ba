use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use formula_topn::{
    scan_segment, AggregatorSpec, ColumnSchema, InMemorySegment, InMemorySegmentBuilder,
    ScanGuard, TopNMetricSpec, TopNQuery, Value,
};
use std::num::NonZeroUsize;
use std::time::Duration;

fn bench_rows() -> usize {
    std::env::var("FORMULA_TOPN_BENCH_ROWS")
        .ok()
        .and_then(|v| v.replace('_', "").parse::<usize>().ok())
        .filter(|&v| v >= 10_000)
        .unwrap_or(1_000_000)
}

fn build_segment(rows: usize, cardinality: usize) -> InMemorySegment {
    let pages: Vec<String> = (0..cardinality).map(|i| format!("page_{i:07}")).collect();
    let mut builder = InMemorySegmentBuilder::new(
        format!("bench_{cardinality}"),
        vec![
            ColumnSchema::dimension("page"),
            ColumnSchema::long("hits"),
            ColumnSchema::double("latency"),
        ],
    );
    for row in 0..rows {
        let page = &pages[row.wrapping_mul(2_654_435_761) % cardinality];
        builder
            .append_row(&[
                Value::from(page.as_str()),
                Value::Long((row % 97) as i64),
                Value::Double((row % 13) as f64 * 0.5),
            ])
            .unwrap();
    }
    builder.finalize()
}

fn bench_topn_scan(c: &mut Criterion) {
    let rows = bench_rows();
    let plan = TopNQuery::new("page", TopNMetricSpec::numeric("hits"), 10)
        .with_aggregator(AggregatorSpec::long_sum("hits", "hits"))
        .with_aggregator(AggregatorSpec::double_max("latency", "latency"))
        .with_aggregator(AggregatorSpec::count("rows"))
        .plan()
        .unwrap();
    let guard = ScanGuard::unbounded();

    let mut group = c.benchmark_group("topn_scan");
    group.sample_size(10);
    group.measurement_time(Duration::from_secs(5));

    for cardinality in [1_000usize, 100_000] {
        let segment = build_segment(rows, cardinality);
        for per_pass in [None, Some(cardinality / 4), Some(cardinality / 16)] {
            let label = match per_pass {
                None => "single_pass".to_string(),
                Some(n) => format!("multi_pass_{n}"),
            };
            group.bench_with_input(
                BenchmarkId::new(label, cardinality),
                &segment,
                |b, segment| {
                    b.iter(|| {
                        let result = scan_segment(
                            segment,
                            &plan,
                            per_pass.and_then(NonZeroUsize::new),
                            &guard,
                        )
                        .unwrap();
                        black_box(result.len())
                    })
                },
            );
        }
    }

    group.finish();
}

criterion_group!(benches, bench_topn_scan);
criterion_main!(benches);
