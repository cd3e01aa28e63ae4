use criterion::{black_box, criterion_group, criterion_main, Criterion};
use kernscope_core::{KernelIntrospector, SimThread, SimulatedTarget};

fn populated_target() -> SimulatedTarget {
    let mut target = SimulatedTarget::with_kernel();
    for i in 0..16 {
        target.add_thread(&SimThread {
            priority: i,
            ..SimThread::named(&format!("worker{i}"))
        });
        target.add_timer(10 + i, 0x0800_0101, i);
    }
    let main = target.add_thread(&SimThread::named("main"));
    target.enable_trace(64);
    for time in 0..100 {
        target.record_switch(time, main, 0, 0);
    }
    target
}

fn bench_thread_registry_walk(c: &mut Criterion) {
    let mut introspector = KernelIntrospector::new(populated_target());
    c.bench_function("read_threads_17", |b| {
        b.iter(|| {
            let _ = black_box(introspector.read_threads());
        })
    });
}

fn bench_timer_list_walk(c: &mut Criterion) {
    let mut introspector = KernelIntrospector::new(populated_target());
    c.bench_function("read_timers_16", |b| {
        b.iter(|| {
            let _ = black_box(introspector.read_timers());
        })
    });
}

fn bench_trace_buffer(c: &mut Criterion) {
    let mut introspector = KernelIntrospector::new(populated_target());
    c.bench_function("read_trace_buffer_64", |b| {
        b.iter(|| {
            let _ = black_box(introspector.read_trace_buffer());
        })
    });
}

criterion_group!(benches, bench_thread_registry_walk, bench_timer_list_walk, bench_trace_buffer);
criterion_main!(benches);
