use std::path::Path;

use codescope::config::IndexingConfig;
use codescope::ir::IrBuilder;
use codescope::resolver;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tempfile::TempDir;

fn write_module_chain(root: &Path, modules: usize) {
    for i in 0..modules {
        let body = if i == 0 {
            "def helper():\n    return 1\n".to_string()
        } else {
            format!("from mod_{prev} import helper\n\ndef step_{i}():\n    return helper()\n", prev = i - 1)
        };
        std::fs::write(root.join(format!("mod_{i}.py")), body).unwrap();
    }
}

fn resolver_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve");

    for modules in [10usize, 50, 200] {
        let temp_dir = TempDir::new().unwrap();
        write_module_chain(temp_dir.path(), modules);

        let config = IndexingConfig::default();
        let builder = IrBuilder::new("bench", &config);

        group.bench_with_input(BenchmarkId::from_parameter(modules), &modules, |b, _| {
            b.iter_batched(
                || builder.build(temp_dir.path()).expect("bench fixture parses").0,
                |mut snapshot| black_box(resolver::resolve(&mut snapshot)),
                criterion::BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

criterion_group!(benches, resolver_benchmark);
criterion_main!(benches);
