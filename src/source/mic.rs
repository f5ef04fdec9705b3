//! Microphone capture for the `/mic` frontend: a cpal input stream
//! fills an SPSC ring, and a pump thread cuts the ring into
//! frame-sized L16 chunks for HTTP subscribers.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::HeapRb;
use tokio::sync::broadcast;
use tracing::{error, info};

use super::l16::L16Format;

/// Frames of capture buffered ahead of the slowest subscriber. Capture
/// must stay ahead of classifier latency or frames are dropped here.
const BUFFER_FRAMES: usize = 8;

pub struct MicCapture {
    format: L16Format,
    tx: broadcast::Sender<Vec<u8>>,
}

impl MicCapture {
    /// Open the default input device and start the capture thread.
    /// `frame_size` is in samples per channel.
    pub fn start(rate: u32, channels: u16, frame_size: usize) -> Result<Self, anyhow::Error> {
        let format = L16Format {
            rate,
            channels,
            frame_size,
        };

        let (tx, _) = broadcast::channel(BUFFER_FRAMES * 4);
        let sender = tx.clone();

        std::thread::Builder::new()
            .name("mic-capture".to_string())
            .spawn(move || {
                if let Err(e) = run_capture(format, sender) {
                    error!("Microphone capture failed: {}", e);
                }
            })?;

        Ok(Self { format, tx })
    }

    pub fn format(&self) -> L16Format {
        self.format
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Vec<u8>> {
        self.tx.subscribe()
    }
}

/// Owns the cpal stream for the lifetime of the process; cpal streams
/// are not Send, so creation and pumping stay on one thread.
fn run_capture(format: L16Format, tx: broadcast::Sender<Vec<u8>>) -> Result<(), anyhow::Error> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow::anyhow!("No input device available"))?;

    info!("Audio input device: {}", device.name().unwrap_or_default());

    // Look for a config covering the requested rate and channel count.
    let mut selected = None;
    for config_range in device.supported_input_configs()? {
        if config_range.channels() == format.channels
            && config_range.min_sample_rate().0 <= format.rate
            && config_range.max_sample_rate().0 >= format.rate
        {
            selected = Some(config_range.with_sample_rate(cpal::SampleRate(format.rate)));
            break;
        }
    }
    let config = selected.ok_or_else(|| {
        anyhow::anyhow!(
            "Input device does not support {}Hz with {} channels",
            format.rate,
            format.channels
        )
    })?;

    info!(
        "Audio config selected: Rate={}Hz, Channels={}",
        format.rate, format.channels
    );

    let samples_per_frame = format.frame_size * format.channels as usize;
    let rb = HeapRb::<i16>::new(BUFFER_FRAMES * samples_per_frame);
    let (mut producer, mut consumer) = rb.split();

    let err_fn = |err| error!("an error occurred on stream: {}", err);

    let stream = match config.sample_format() {
        cpal::SampleFormat::I16 => device.build_input_stream(
            &config.into(),
            move |data: &[i16], _: &_| {
                // If the ring is full the push is partial and capture
                // drops frames (lossy).
                producer.push_slice(data);
            },
            err_fn,
            None,
        )?,
        cpal::SampleFormat::F32 => device.build_input_stream(
            &config.into(),
            move |data: &[f32], _: &_| {
                for &sample in data {
                    let _ = producer.try_push((sample * i16::MAX as f32) as i16);
                }
            },
            err_fn,
            None,
        )?,
        other => return Err(anyhow::anyhow!("Unsupported sample format {:?}", other)),
    };

    stream.play()?;

    let mut frame = vec![0i16; samples_per_frame];
    loop {
        // A full frame or nothing; sleep briefly while the ring fills.
        if consumer.occupied_len() < samples_per_frame {
            std::thread::sleep(std::time::Duration::from_millis(5));
            continue;
        }

        consumer.pop_slice(&mut frame);

        let mut bytes = Vec::with_capacity(samples_per_frame * 2);
        for &sample in &frame {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }

        // No subscribers is fine; keep capturing so the next request
        // starts from live audio.
        let _ = tx.send(bytes);
    }
}
