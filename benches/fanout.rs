use std::hint::black_box;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use eventscope::{CompositeSubscription, EventChannel, Subscription};

fn channel_with_listeners(n: usize) -> (EventChannel<u64>, Vec<Subscription>, Arc<AtomicU64>) {
    let channel = EventChannel::named("bench");
    let sum = Arc::new(AtomicU64::new(0));
    let subs = (0..n)
        .map(|_| {
            let sum = Arc::clone(&sum);
            channel.subscribe(move |v: &u64| {
                sum.fetch_add(*v, Ordering::Relaxed);
            })
        })
        .collect();
    (channel, subs, sum)
}

fn bench_emit_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("emit_fanout");

    for listeners in [1usize, 8, 64] {
        group.throughput(Throughput::Elements(listeners as u64));
        group.bench_with_input(BenchmarkId::from_parameter(listeners), &listeners, |b, &n| {
            let (channel, _subs, sum) = channel_with_listeners(n);
            b.iter(|| channel.emit(black_box(1)));
            black_box(sum.load(Ordering::Relaxed));
        });
    }

    group.finish();
}

fn bench_subscribe_dispose(c: &mut Criterion) {
    c.bench_function("channel/subscribe_dispose", |b| {
        let channel: EventChannel<u64> = EventChannel::new();
        b.iter(|| {
            let sub = channel.subscribe(|v: &u64| {
                black_box(v);
            });
            sub.dispose();
        });
    });
}

fn bench_composite_teardown(c: &mut Criterion) {
    c.bench_function("composite/dispose_all_32", |b| {
        b.iter_custom(|iters| {
            // Fresh subscriptions per iteration; only the teardown is timed.
            let channel: EventChannel<u64> = EventChannel::new();
            let mut elapsed = std::time::Duration::ZERO;
            for _ in 0..iters {
                let tokens = CompositeSubscription::new();
                for _ in 0..32 {
                    tokens.add(channel.subscribe(|_: &u64| {}));
                }
                let start = Instant::now();
                let _ = tokens.dispose_all();
                elapsed += start.elapsed();
            }
            elapsed
        });
    });
}

criterion_group!(
    fanout,
    bench_emit_fanout,
    bench_subscribe_dispose,
    bench_composite_teardown
);
criterion_main!(fanout);
