use std::collections::HashMap;

use codescope::chunk::{Chunk, ChunkId};
use codescope::index::SearchHit;
use codescope::retrieval::{fuse, Intent, MultiIndexResult};
use codescope::types::{NodeId, NodeKind};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn make_chunk(n: usize) -> Chunk {
    let id = ChunkId::from_node(NodeId::compute("bench", NodeKind::Function, "src/lib.rs", &format!("fn_{n}")));
    Chunk {
        id,
        file_path: "src/lib.rs".to_string(),
        start_line: n as u32,
        end_line: n as u32 + 10,
        symbol_id: None,
        content: format!("fn fn_{n}() {{}}"),
        name: format!("fn_{n}"),
        importance_score: (n % 7) as f64 / 7.0,
    }
}

fn fusion_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("fuse");

    for size in [50usize, 500, 5000] {
        let chunks: Vec<Chunk> = (0..size).map(make_chunk).collect();
        let chunk_lookup: HashMap<ChunkId, &Chunk> = chunks.iter().map(|c| (c.id, c)).collect();

        let hits: Vec<SearchHit> =
            chunks.iter().enumerate().map(|(rank, chunk)| SearchHit { chunk_id: chunk.id, score: 1.0 / (rank as f64 + 1.0) }).collect();

        let results = MultiIndexResult {
            lexical: hits.clone(),
            vector: hits.clone(),
            symbol: hits.clone(),
            graph: hits,
            errors: HashMap::new(),
        };

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                black_box(fuse(&results, Intent::Balanced, &chunk_lookup, |id| {
                    chunk_lookup.get(&id).map(|c| c.importance_score).unwrap_or(0.0)
                }))
            })
        });
    }

    group.finish();
}

criterion_group!(benches, fusion_benchmark);
criterion_main!(benches);
