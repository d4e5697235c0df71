#[macro_use]
extern crate criterion;

use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput};

use hearth_core::alloc::{ArenaResource, MemoryManager};
use hearth_core::events::{AnyEvent, DummyListener, Event, EventBus, Listener};

struct Tick(u64);

impl Event for Tick {
    const TAG: &'static str = "bench.tick";
}

fn subscribed(bus: &EventBus, n: usize) -> Vec<Listener<DummyListener<impl Fn(&dyn AnyEvent) + 'static>>> {
    (0..n)
        .map(|_| {
            let listener = bus.closure_listener(|event| {
                if let Some(tick) = event.downcast_ref::<Tick>() {
                    criterion::black_box(tick.0);
                }
            });
            bus.subscribe::<Tick, _>(&listener);
            listener
        })
        .collect()
}

fn bench_fire(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_bus_fire");

    for listeners in [1, 16, 256] {
        group.throughput(Throughput::Elements(listeners as u64));
        group.bench_with_input(BenchmarkId::from_parameter(listeners), &listeners, |b, &n| {
            let bus = EventBus::new(Arc::new(MemoryManager::system()));
            let _handles = subscribed(&bus, n);
            b.iter(|| bus.fire(&Tick(1)));
        });
    }
    group.finish();
}

fn bench_post_process(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_bus_deferred");

    for batch in [64, 1024] {
        group.throughput(Throughput::Elements(batch as u64));
        group.bench_function(format!("system_{batch}"), |b| {
            let bus = EventBus::new(Arc::new(MemoryManager::system()));
            let _handles = subscribed(&bus, 4);
            b.iter(|| {
                for i in 0..batch {
                    bus.post(Tick(i)).unwrap();
                }
                bus.process_events()
            });
        });
        group.bench_function(format!("arena_{batch}"), |b| {
            let memory = Arc::new(MemoryManager::new(ArenaResource::with_capacity(1 << 20)));
            let bus = EventBus::new(memory.clone());
            let _handles = subscribed(&bus, 4);
            b.iter(|| {
                for i in 0..batch {
                    bus.post(Tick(i)).unwrap();
                }
                let fired = bus.process_events();
                memory.release_upstream().unwrap();
                fired
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_fire, bench_post_process);
criterion_main!(benches);
