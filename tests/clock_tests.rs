//! Integration tests for the media clock.
//!
//! Time is driven by `ManualTimeSource`, so none of these tests sleep.

use cadence::clock::{ClockWrapper, ManualTimeSource, MediaClock, SinkRole, TimeSource};
use cadence::error::Error;
use std::sync::Arc;
use std::thread;

fn manual() -> Arc<ManualTimeSource> {
    Arc::new(ManualTimeSource::new(1_000_000))
}

#[test]
fn test_position_follows_anchor() {
    let time = manual();
    let owner = MediaClock::new_owned(time.clone());
    owner.set_anchor_time(5_000_000, time.now_us(), None);

    time.advance_us(2_000_000);
    assert_eq!(owner.current_position().unwrap(), 7_000_000);
    assert_eq!(owner.media_late_us(7_500_000).unwrap(), 500_000);
    assert_eq!(owner.media_late_us(6_000_000).unwrap(), -1_000_000);
}

#[test]
fn test_play_rate_keeps_position_continuous() {
    let time = manual();
    let owner = MediaClock::new_owned(time.clone());
    owner.set_anchor_time(5_000_000, time.now_us(), None);

    time.advance_us(1_000_000);
    owner.set_play_rate(2.0).unwrap();
    assert_eq!(owner.current_position().unwrap(), 6_000_000);

    time.advance_us(1_500_000);
    assert_eq!(owner.current_position().unwrap(), 9_000_000);

    assert!(matches!(owner.set_play_rate(0.0), Err(Error::InvalidParam(_))));
    assert!(matches!(owner.set_play_rate(f32::NAN), Err(Error::InvalidParam(_))));
}

#[test]
fn test_anchor_max_clamps() {
    let time = manual();
    let owner = MediaClock::new_owned(time.clone());
    owner.set_anchor_time(0, time.now_us(), Some(40_000));

    time.advance_us(100_000);
    assert_eq!(owner.current_position().unwrap(), 40_000);
}

#[test]
fn test_pause_freezes_and_resume_continues() {
    let time = manual();
    let owner = MediaClock::new_owned(time.clone());
    owner.set_anchor_time(0, time.now_us(), None);

    time.advance_us(300_000);
    owner.pause();
    time.advance_us(10_000_000);
    assert_eq!(owner.current_position().unwrap(), 300_000);

    owner.resume();
    time.advance_us(200_000);
    assert_eq!(owner.current_position().unwrap(), 500_000);
}

#[test]
fn test_flush_clears_anchor() {
    let time = manual();
    let owner = MediaClock::new_owned(time.clone());
    owner.set_anchor_time(0, time.now_us(), None);
    owner.flush();
    assert!(matches!(owner.current_position(), Err(Error::Unsupported(_))));
    assert!(!owner.clock().is_anchored());
}

#[test]
fn test_single_owner() {
    let time = manual();
    let clock = MediaClock::new(time);
    let owner = clock.claim().unwrap();
    assert!(matches!(clock.claim(), Err(Error::InvalidOperation(_))));

    drop(owner);
    assert!(!clock.has_owner());
    assert!(clock.claim().is_ok());
}

#[test]
fn test_borrowers_gated_while_owner_present() {
    let time = manual();
    let owner = MediaClock::new_owned(time.clone());
    let borrower = owner.borrower();

    assert!(!borrower.try_set_anchor_time(9_000_000, time.now_us(), None));
    assert!(!borrower.try_pause());
    owner.set_anchor_time(1_000, time.now_us(), None);
    assert_eq!(borrower.current_position().unwrap(), 1_000);

    drop(owner);
    assert!(borrower.try_pause());
    assert!(borrower.clock().is_paused());
    assert!(borrower.try_resume());
    assert!(borrower.try_flush());
}

#[test]
fn test_audio_video_sinks_share_one_timeline() {
    let time = manual();
    let mut audio = ClockWrapper::new(SinkRole::AudioSink);
    let mut video = ClockWrapper::new(SinkRole::VideoSink);
    video.set_clock(audio.provide_clock(time.clone()));

    audio.set_anchor_time(0, time.now_us(), None).unwrap();
    time.advance_us(40_000);

    // A video frame at 33ms is 7ms late; one at 80ms is 40ms early.
    assert_eq!(video.media_late_us(33_000).unwrap(), -7_000);
    assert_eq!(video.media_late_us(80_000).unwrap(), 40_000);

    // Video controls the rate, audio does not.
    video.set_play_rate(0.5).unwrap();
    assert!(matches!(audio.set_play_rate(2.0), Err(Error::Unsupported(_))));
    time.advance_us(20_000);
    assert_eq!(audio.current_position().unwrap(), 50_000);
}

#[test]
fn test_position_readable_from_many_threads() {
    let time = manual();
    let owner = MediaClock::new_owned(time.clone());
    owner.set_anchor_time(0, time.now_us(), None);

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let borrower = owner.borrower();
            thread::spawn(move || {
                let mut last = 0;
                for _ in 0..1_000 {
                    let pos = borrower.current_position().unwrap();
                    assert!(pos >= last);
                    last = pos;
                }
            })
        })
        .collect();
    for _ in 0..1_000 {
        time.advance_us(10);
    }
    for r in readers {
        r.join().unwrap();
    }
    assert_eq!(owner.current_position().unwrap(), 10_000);
}
