use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use pagesnap::{CaptureRequest, OutputCache};

fn bench_fingerprint(c: &mut Criterion) {
    let req = CaptureRequest::new("https://example.com/some/long/path?q=1")
        .viewport(1280, 720)
        .full_page(true)
        .device("iPhone X");

    c.bench_function("fingerprint", |b| b.iter(|| black_box(&req).fingerprint()));
}

fn bench_output_cache(c: &mut Criterion) {
    let cache = OutputCache::new(Duration::from_secs(3600));
    let png: Arc<[u8]> = vec![0u8; 256 * 1024].into();
    let keys: Vec<String> = (0..1000)
        .map(|i| CaptureRequest::new(format!("https://site{}.test", i)).fingerprint())
        .collect();
    for key in &keys {
        cache.put(key, png.clone());
    }

    c.bench_function("output_cache_get_hit", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % keys.len();
            black_box(cache.get(&keys[i]))
        })
    });

    c.bench_function("output_cache_put", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % keys.len();
            cache.put(&keys[i], png.clone())
        })
    });
}

criterion_group!(benches, bench_fingerprint, bench_output_cache);
criterion_main!(benches);
