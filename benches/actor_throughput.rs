//! Throughput benchmarks for message actors and buffer queues.

use cadence::actor::{ActorConfig, DispatchTable, Message, MessageActor, MessageParams};
use cadence::buffer::MediaBuffer;
use cadence::flow::{BufferQueue, CountingMonitor};
use cadence::format::MediaType;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;

const COUNT: u32 = 1;
const ECHO: u32 = 2;

fn counter() -> MessageActor {
    let table = DispatchTable::<u64>::new()
        .on(COUNT, |count, msg, _| *count += msg.param1())
        .on(ECHO, |count, msg, ctx| {
            ctx.reply(&msg, MessageParams::new().with_param1(*count));
        });
    MessageActor::spawn(0u64, table, ActorConfig::named("bench")).unwrap()
}

fn bench_post(c: &mut Criterion) {
    let mut group = c.benchmark_group("actor_post");

    for batch in [100u64, 1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(*batch));
        group.bench_with_input(BenchmarkId::from_parameter(batch), batch, |b, &batch| {
            let actor = counter();
            b.iter(|| {
                for i in 0..batch {
                    actor.post(Message::new(COUNT).with_param1(black_box(i)));
                }
                // Wait for the batch to drain.
                black_box(actor.send(Message::new(ECHO)).unwrap());
            });
        });
    }

    group.finish();
}

fn bench_send_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("actor_send");
    group.throughput(Throughput::Elements(1));

    let actor = counter();
    group.bench_function("round_trip", |b| {
        b.iter(|| black_box(actor.send(Message::new(ECHO)).unwrap()));
    });

    group.finish();
}

fn bench_queue_tracked(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_tracked");

    for size in [64usize, 4096].iter() {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let queue = BufferQueue::new(8);
            let monitor = Arc::new(CountingMonitor::with_name("bench"));
            let payload = vec![0u8; size];
            b.iter(|| {
                let buffer = MediaBuffer::new(MediaType::Video, payload.clone()).tracked(monitor.clone());
                queue.try_push(buffer).unwrap();
                black_box(queue.try_pop());
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_post, bench_send_round_trip, bench_queue_tracked);
criterion_main!(benches);
