use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use prolly::{ChunkConfig, ChunkLoader, TreeBuilder};
use storage::MemoryStore;

fn pairs(count: u32) -> Vec<(Vec<u8>, Vec<u8>)> {
    (0..count)
        .map(|i| {
            (
                format!("key{i:08}").into_bytes(),
                format!("value{i:08}").into_bytes(),
            )
        })
        .collect()
}

fn bulk_build(c: &mut Criterion) {
    let entries = pairs(10_000);
    c.bench_function("bulk_build_10k", |b| {
        b.iter_batched(
            MemoryStore::new,
            |store| {
                let loader = ChunkLoader::new(&store);
                let builder = TreeBuilder::new(&store, &loader, ChunkConfig::default());
                builder.build_map(entries.clone()).unwrap()
            },
            BatchSize::SmallInput,
        )
    });
}

fn point_splice(c: &mut Criterion) {
    let store = MemoryStore::new();
    let root = {
        let loader = ChunkLoader::new(&store);
        let builder = TreeBuilder::new(&store, &loader, ChunkConfig::default());
        builder.build_map(pairs(10_000)).unwrap()
    };
    c.bench_function("point_splice_10k", |b| {
        b.iter(|| {
            let loader = ChunkLoader::new(&store);
            let builder = TreeBuilder::new(&store, &loader, ChunkConfig::default());
            builder.map_put(&root, b"key00005000", b"poked").unwrap()
        })
    });
}

criterion_group!(benches, bulk_build, point_splice);
criterion_main!(benches);
