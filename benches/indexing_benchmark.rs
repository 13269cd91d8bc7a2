use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use tempfile::TempDir;

use strata::collection::collection::Collection;
use strata::schema::schema::IndexingErrors;

const WORDS: &[&str] = &[
    "search", "engine", "index", "fragment", "document", "schema", "query",
    "collection", "pipeline", "mapping", "category", "term", "value", "commit",
];

fn random_text(rng: &mut StdRng, words: usize) -> String {
    (0..words)
        .map(|_| WORDS[rng.gen_range(0..WORDS.len())])
        .collect::<Vec<_>>()
        .join(" ")
}

fn build_collection(dir: &TempDir, docs: usize) -> Collection {
    let mut rng = StdRng::seed_from_u64(42);
    let mut coll = Collection::new("bench", dir.path().join("bench"));
    coll.open_writable().unwrap();
    for i in 0..docs {
        let doc = json!({
            "id": i.to_string(),
            "text": random_text(&mut rng, 20),
            "tag": WORDS[rng.gen_range(0..WORDS.len())],
        });
        let mut errors = IndexingErrors::default();
        let (processed, idterm) = coll
            .process_doc(&doc, "default", "", &mut errors)
            .unwrap();
        coll.raw_update_doc(processed, &idterm).unwrap();
    }
    coll.commit().unwrap();
    coll
}

fn bench_process_and_index(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let mut coll = Collection::new("bench", dir.path().join("bench"));
    coll.open_writable().unwrap();
    let mut rng = StdRng::seed_from_u64(7);
    let mut next_id = 0usize;

    c.bench_function("process_and_index_doc", |b| {
        b.iter(|| {
            let doc = json!({
                "id": next_id.to_string(),
                "text": random_text(&mut rng, 20),
            });
            next_id += 1;
            let mut errors = IndexingErrors::default();
            let (processed, idterm) = coll
                .process_doc(&doc, "default", "", &mut errors)
                .unwrap();
            coll.raw_update_doc(processed, &idterm).unwrap();
        })
    });
}

fn bench_search(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let mut coll = build_collection(&dir, 1000);

    c.bench_function("search_text_field", |b| {
        b.iter(|| {
            let results = coll
                .perform_search(
                    &json!({
                        "query": {"field": ["text", "text", "search engine"]},
                        "size": 10
                    }),
                    "default",
                )
                .unwrap();
            black_box(results);
        })
    });

    c.bench_function("search_with_occur_spy", |b| {
        b.iter(|| {
            let results = coll
                .perform_search(
                    &json!({
                        "query": {"matchall": true},
                        "size": 10,
                        "info": [{"occur": {"prefix": "t", "result_limit": 5}}]
                    }),
                    "default",
                )
                .unwrap();
            black_box(results);
        })
    });
}

criterion_group!(benches, bench_process_and_index, bench_search);
criterion_main!(benches);
