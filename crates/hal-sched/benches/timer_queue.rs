use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use hal_sched::{MockClock, Parker, Period, Scheduler, SchedulerConfig};
use std::sync::Arc;
use std::time::Duration;

/// Parker that lets the mock clock run out the timeout
struct SkipParker(Arc<MockClock>);

impl Parker for SkipParker {
    fn park(&self, timeout: Duration) {
        self.0.advance(timeout.as_micros() as u32);
    }

    fn unpark(&self) {}
}

fn scheduler(timers: usize) -> (Scheduler, Arc<MockClock>) {
    let clock = Arc::new(MockClock::new());
    let config = SchedulerConfig::new("bench", 0).with_task_limits(timers + 1, 4);
    let scheduler = Scheduler::builder(config)
        .clock(clock.clone())
        .parker(Arc::new(SkipParker(clock.clone())))
        .build();
    (scheduler, clock)
}

fn bench_add_remove(c: &mut Criterion) {
    let mut group = c.benchmark_group("add_remove");

    for queued in [8usize, 64, 256] {
        let (scheduler, _) = scheduler(queued);
        for i in 0..queued {
            scheduler.add_timer_task(|| {}, Period::micros(1_000 + i as u32 * 17), true);
        }
        let handle = scheduler.add_timer_task(|| {}, Period::Never, false);

        group.bench_with_input(BenchmarkId::new("reschedule", queued), &queued, |b, _| {
            let mut period = 0u32;
            b.iter(|| {
                period = (period + 7_919) % 10_000;
                scheduler.reschedule_timer_task(black_box(handle), Period::micros(period));
                scheduler.remove_timer_task(handle);
            });
        });
    }

    group.finish();
}

fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch");

    for queued in [8usize, 64] {
        let (scheduler, _) = scheduler(queued);
        for i in 0..queued {
            scheduler.add_timer_task(|| {}, Period::micros(500 + i as u32 * 31), true);
        }

        group.bench_with_input(BenchmarkId::new("run_pass", queued), &queued, |b, _| {
            b.iter(|| black_box(scheduler.run_pass()));
        });
    }

    group.finish();
}

fn bench_events(c: &mut Criterion) {
    let (scheduler, _) = scheduler(1);
    let event = scheduler.create_event_task(|| {});

    c.bench_function("send_and_drain_event", |b| {
        b.iter(|| {
            scheduler.send_event_from_interrupt(black_box(event));
            scheduler.run_pass()
        });
    });
}

criterion_group!(benches, bench_add_remove, bench_dispatch, bench_events);
criterion_main!(benches);
