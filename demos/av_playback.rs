//! Audio/video playback against one shared clock.
//!
//! ```text
//! [asrc] → [audiosink]   (owns the clock)
//! [vsrc] → [videosink]   (follows it, drops late frames)
//! ```
//!
//! Two producer threads feed one second of 20ms audio packets and 30fps
//! video frames. The audio sink paces playback in real time; the video sink
//! renders each frame when the shared clock reaches its timestamp.
//!
//! Run: `RUST_LOG=cadence=debug cargo run --example av_playback`

use cadence::buffer::MediaBuffer;
use cadence::component::{Component, WriteOutcome};
use cadence::components::{AppSink, AppSinkConfig, AppSource, AppSourceConfig};
use cadence::error::Result;
use cadence::format::MediaType;
use cadence::metadata::{keys, MediaMeta};
use cadence::pipeline::{Pipeline, PipelineEvent};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const AUDIO_PACKET_US: i64 = 20_000;
const VIDEO_FRAME_US: i64 = 33_333;
const DURATION_US: i64 = 1_000_000;

/// Push `buffer`, retrying while the source queue is full.
fn push_blocking(source: &AppSource, mut buffer: MediaBuffer) -> Result<()> {
    loop {
        match source.push(buffer)? {
            WriteOutcome::Accepted => return Ok(()),
            WriteOutcome::Again(back) => {
                buffer = back;
                thread::sleep(Duration::from_millis(2));
            }
        }
    }
}

fn produce(source: Arc<AppSource>, media: MediaType, step_us: i64, size: usize) -> thread::JoinHandle<Result<()>> {
    thread::spawn(move || {
        let mut pts = 0;
        while pts < DURATION_US {
            push_blocking(&source, MediaBuffer::new(media, vec![0u8; size]).with_pts(pts))?;
            pts += step_us;
        }
        push_blocking(&source, MediaBuffer::eos(media))
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let audio_src = Arc::new(AppSource::new(AppSourceConfig {
        name: "asrc".into(),
        media_type: MediaType::Audio,
        capacity: 16,
        ..AppSourceConfig::default()
    })?);
    let video_src = Arc::new(AppSource::new(AppSourceConfig {
        name: "vsrc".into(),
        capacity: 8,
        ..AppSourceConfig::default()
    })?);
    video_src.set_parameter(&MediaMeta::new().with(keys::WIDTH, 1280i32).with(keys::HEIGHT, 720i32))?;

    let audio_sink = Arc::new(AppSink::new(AppSinkConfig::audio())?);
    let video_sink = Arc::new(AppSink::new(AppSinkConfig::video())?);
    video_sink.set_render(|frame| {
        tracing::info!("video frame {:?}us", frame.pts());
    });

    let mut pipeline = Pipeline::new();
    let asrc = pipeline.add(audio_src.clone())?;
    let vsrc = pipeline.add(video_src.clone())?;
    let asink = pipeline.add(audio_sink.clone())?;
    let vsink = pipeline.add(video_sink.clone())?;
    pipeline.connect(asrc, asink, MediaType::Audio)?;
    pipeline.connect(vsrc, vsink, MediaType::Video)?;

    let mut events = pipeline.subscribe();
    pipeline.play().await?;
    println!("Playing ({:?})", pipeline);

    let audio = produce(audio_src, MediaType::Audio, AUDIO_PACKET_US, 3_840);
    let video = produce(video_src, MediaType::Video, VIDEO_FRAME_US, 1_280 * 720 * 3 / 2);

    let outcome = loop {
        match events.recv().await {
            Some(PipelineEvent::Eos) => break Ok(()),
            Some(error @ PipelineEvent::Error { .. }) => break Err(error.to_string()),
            Some(event) => println!("{}", event),
            None => break Err("event channel closed".to_string()),
        }
    };

    for producer in [audio, video] {
        if let Ok(Err(err)) = producer.join() {
            eprintln!("producer failed: {}", err);
        }
    }

    let stats = video_sink.stats();
    println!(
        "Done ({:?}): audio clock at {}us, video rendered {} dropped {}",
        outcome,
        audio_sink.position().unwrap_or(0),
        stats.rendered,
        stats.dropped
    );

    pipeline.stop().await?;
    pipeline.reset().await?;
    Ok(())
}
