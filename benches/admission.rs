use criterion::{criterion_group, criterion_main, Criterion};
use querydeck::rate_limit::{RateLimitConfig, RateLimitPolicy, TokenBucketStore};
use std::hint::black_box;
use std::net::{IpAddr, Ipv4Addr};

fn bench_admit(c: &mut Criterion) {
    let policy = RateLimitPolicy::from_config(&RateLimitConfig {
        requests_per_minute: 6_000,
        burst_size: 1_000,
        ..RateLimitConfig::default()
    })
    .expect("Failed to build benchmark policy");

    // No runtime here, so the store runs without its sweep task
    let store: TokenBucketStore<IpAddr> = TokenBucketStore::new("bench", policy);
    let hot = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));

    // Benchmark: one client hammering its own bucket
    c.bench_function("admit_single_client", |b| {
        b.iter(|| black_box(store.admit(black_box(&hot))));
    });

    // Benchmark: admissions spread over 65k distinct clients
    c.bench_function("admit_many_clients", |b| {
        let mut n: u32 = 0;
        b.iter(|| {
            n = n.wrapping_add(1);
            let client = IpAddr::V4(Ipv4Addr::from(0x0a00_0000 | (n & 0xffff)));
            black_box(store.admit(&client))
        });
    });
}

criterion_group!(benches, bench_admit);
criterion_main!(benches);
