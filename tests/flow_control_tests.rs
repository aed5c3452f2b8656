//! Integration tests for flow control.
//!
//! These tests verify that:
//! - A producer sharing a `TrafficControl` with its consumer blocks at the
//!   high watermark and resumes only at the low watermark
//! - Buffers account for themselves on drop, from any thread
//! - End of stream arrives after exactly the buffers that were pushed

use cadence::buffer::MediaBuffer;
use cadence::component::{Component, Event, MediaType, ReadOutcome, Transition};
use cadence::components::{AppSource, AppSourceConfig};
use cadence::flow::{BufferQueue, CountingMonitor, Monitor, TrafficControl, WaterMarks};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

fn started_source(capacity: usize) -> Arc<AppSource> {
    let source = Arc::new(
        AppSource::new(AppSourceConfig {
            name: "producer".to_string(),
            capacity,
            ..AppSourceConfig::default()
        })
        .unwrap(),
    );
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    source
        .set_listener(Arc::new(move |e: Event| {
            let _ = tx.lock().unwrap().send(e);
        }))
        .unwrap();
    source.init().unwrap();
    source.prepare().unwrap();
    source.start().unwrap();
    loop {
        let event = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        if event.completes() == Some(Transition::Start) {
            break;
        }
    }
    source
}

#[test]
fn test_producer_blocks_at_high_resumes_at_low() {
    let traffic = Arc::new(TrafficControl::new(WaterMarks::new(10, 5).unwrap()).with_name("a-to-b"));
    let source = started_source(256);
    let max_pending = Arc::new(AtomicU64::new(0));
    let resumes = Arc::new(Mutex::new(Vec::new()));

    let producer = {
        let source = source.clone();
        let traffic = traffic.clone();
        let max_pending = max_pending.clone();
        let resumes = resumes.clone();
        thread::spawn(move || {
            for i in 0..100i64 {
                if traffic.wait_on_full() {
                    resumes.lock().unwrap().push(traffic.pending());
                }
                let buffer = MediaBuffer::new(MediaType::Video, vec![0u8; 32])
                    .with_pts(i * 1_000)
                    .tracked(traffic.clone());
                max_pending.fetch_max(traffic.pending(), Ordering::SeqCst);
                assert!(source.push(buffer).unwrap().is_accepted());
            }
            assert!(source.end_stream().unwrap().is_accepted());
        })
    };

    // The consumer is slower than the producer.
    let reader = source.reader(MediaType::Video).unwrap();
    let mut reads = 0u64;
    let mut next_pts = 0i64;
    let outcome = loop {
        match reader.read().unwrap() {
            ReadOutcome::Buffer(buffer) => {
                assert_eq!(buffer.pts(), Some(next_pts));
                next_pts += 1_000;
                reads += 1;
                thread::sleep(Duration::from_micros(500));
                drop(buffer);
            }
            ReadOutcome::Again => continue,
            eos @ ReadOutcome::Eos => break eos,
        }
    };
    producer.join().unwrap();

    assert_eq!(reads, 100);
    assert!(outcome.is_eos());
    assert!(reader.read().unwrap().is_eos());
    assert!(max_pending.load(Ordering::SeqCst) <= 10);

    let resumes = resumes.lock().unwrap();
    assert!(!resumes.is_empty(), "producer never hit the high watermark");
    assert!(resumes.iter().all(|&pending| pending <= 5), "resumed above low: {:?}", resumes);

    assert_eq!(traffic.produced(), 100);
    assert_eq!(traffic.consumed(), 100);
    assert_eq!(traffic.pending(), 0);
}

#[test]
fn test_buffers_release_on_other_threads() {
    let monitor = Arc::new(CountingMonitor::with_name("cross-thread"));
    let queue = BufferQueue::new(64).with_name("handoff");
    for i in 0..50 {
        let buffer = MediaBuffer::new(MediaType::Audio, vec![0u8; 8])
            .with_pts(i)
            .tracked(monitor.clone());
        queue.try_push(buffer).unwrap();
    }
    assert_eq!(monitor.pending(), 50);

    let consumers: Vec<_> = (0..4)
        .map(|_| {
            let queue = queue.clone();
            thread::spawn(move || {
                while let Some(buffer) = queue.pop_timeout(Duration::from_millis(20)) {
                    drop(buffer);
                }
            })
        })
        .collect();
    for c in consumers {
        c.join().unwrap();
    }

    assert_eq!(monitor.produced(), 50);
    assert_eq!(monitor.consumed(), 50);
    assert_eq!(queue.stats().total_popped, 50);
}

#[test]
fn test_flush_releases_tracked_buffers() {
    let traffic = Arc::new(TrafficControl::new(WaterMarks::new(4, 1).unwrap()));
    let queue = BufferQueue::new(8);
    for _ in 0..4 {
        queue
            .try_push(MediaBuffer::new(MediaType::Video, vec![1u8]).tracked(traffic.clone()))
            .unwrap();
    }
    assert!(traffic.is_full());
    assert!(!traffic.wait_on_full_timeout(Duration::from_millis(10)));

    assert_eq!(queue.flush(), 4);
    assert_eq!(traffic.pending(), 0);
    assert!(traffic.wait_on_full_timeout(Duration::from_millis(10)));
}

#[test]
fn test_unblock_releases_stuck_producer() {
    let traffic = Arc::new(TrafficControl::new(WaterMarks::new(2, 0).unwrap()));
    let held: Vec<MediaBuffer> = (0..2)
        .map(|_| MediaBuffer::new(MediaType::Video, vec![0u8]).tracked(traffic.clone()))
        .collect();

    let producer = {
        let traffic = traffic.clone();
        thread::spawn(move || {
            traffic.wait_on_full();
            traffic.is_unblocked()
        })
    };
    thread::sleep(Duration::from_millis(20));
    traffic.unblock_wait(true);
    assert!(producer.join().unwrap());
    drop(held);
    assert_eq!(traffic.pending(), 0);
}
