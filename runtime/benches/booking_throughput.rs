//! Booking service throughput benchmarks
//!
//! Measures the service over in-memory adapters:
//! - Slot queries: cache hit vs. recomputation
//! - Create + cancel cycle through the provider-day lock
//! - Uncontended lock acquisition
//!
//! Run with: `cargo bench --bench booking_throughput`

#![allow(missing_docs)] // Benchmarks don't need extensive docs
#![allow(clippy::expect_used)] // Benchmarks can use expect for setup

use booking_engine_core::{ProviderDay, ProviderId};
use booking_engine_runtime::{BookingConfig, ProviderDayLocks};
use booking_engine_testing::BookingHarness;
use booking_engine_testing::fixtures::{hm, test_date};
use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use std::time::Duration;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Runtime::new().expect("Failed to create runtime")
}

fn bench_slot_queries(c: &mut Criterion) {
    let runtime = runtime();
    let mut group = c.benchmark_group("slot_queries");
    group.throughput(Throughput::Elements(1));

    group.bench_function("cached", |b| {
        let harness = runtime.block_on(async { BookingHarness::new() });
        b.to_async(&runtime).iter(|| async {
            let slots = harness
                .service
                .get_available_slots(black_box(harness.provider_id), test_date(), 60)
                .await
                .expect("slots");
            black_box(slots);
        });
    });

    group.bench_function("uncached", |b| {
        let harness = runtime.block_on(async {
            BookingHarness::with_config(BookingConfig::default().with_slot_cache_ttl_ms(0))
        });
        b.to_async(&runtime).iter(|| async {
            let slots = harness
                .service
                .get_available_slots(black_box(harness.provider_id), test_date(), 60)
                .await
                .expect("slots");
            black_box(slots);
        });
    });

    group.finish();
}

fn bench_create_cancel(c: &mut Criterion) {
    let runtime = runtime();
    let mut group = c.benchmark_group("writes");
    group.throughput(Throughput::Elements(2));

    group.bench_function("create_then_cancel", |b| {
        let harness = runtime.block_on(async { BookingHarness::new() });
        b.to_async(&runtime).iter(|| async {
            let booking = harness
                .book(test_date(), hm(10, 0), hm(11, 0))
                .await
                .expect("create");
            harness
                .service
                .cancel_booking(booking.id, harness.client(), "bench")
                .await
                .expect("cancel");
        });
    });

    group.finish();
}

fn bench_locks(c: &mut Criterion) {
    let runtime = runtime();
    let mut group = c.benchmark_group("provider_day_locks");
    let locks = ProviderDayLocks::new();
    let day = ProviderDay::new(ProviderId::new(), test_date());

    group.bench_function("acquire_release", |b| {
        b.to_async(&runtime).iter(|| async {
            let guard = locks
                .acquire(black_box(day), Duration::from_secs(1))
                .await
                .expect("lock");
            drop(guard);
        });
    });

    group.finish();
}

criterion_group!(benches, bench_slot_queries, bench_create_cancel, bench_locks);
criterion_main!(benches);
