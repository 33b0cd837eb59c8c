//! Live microphone capture using cpal
//! The input stream lives on its own thread; frames are read from a shared ring

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Sample, SampleFormat, SizedSample};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;

use crate::audio::window::FrameSource;

/// Failure to open or keep the audio input. Fatal to a listening session.
#[derive(Error, Debug, Clone)]
pub enum AcquisitionError {
    #[error("No input device available")]
    NoInputDevice,
    #[error("Failed to get default input config: {0}")]
    ConfigError(String),
    #[error("Failed to build input stream: {0}")]
    StreamError(String),
    #[error("Input stream did not start within {0:?}")]
    StartTimeout(Duration),
    #[error("Input stream stopped: {0}")]
    Disconnected(String),
}

const START_TIMEOUT: Duration = Duration::from_secs(5);

/// Default microphone as a [`FrameSource`]
///
/// Frames are the most recent `len` samples; before the ring has filled
/// the frame is zero padded at the front.
pub struct MicrophoneSource {
    ring: Arc<Mutex<VecDeque<f32>>>,
    sample_rate: u32,
    stop_signal: Arc<AtomicBool>,
    stream_error: Arc<Mutex<Option<String>>>,
    thread: Option<JoinHandle<()>>,
}

impl MicrophoneSource {
    /// Open the default input device and start streaming into a ring of
    /// `ring_len` mono samples
    pub fn open(ring_len: usize) -> Result<Self, AcquisitionError> {
        let ring_len = ring_len.max(1);
        let ring = Arc::new(Mutex::new(VecDeque::with_capacity(ring_len)));
        let stop_signal = Arc::new(AtomicBool::new(false));
        let stream_error = Arc::new(Mutex::new(None));
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<u32, AcquisitionError>>(1);

        let thread = {
            let ring = Arc::clone(&ring);
            let stop_signal = Arc::clone(&stop_signal);
            let stream_error = Arc::clone(&stream_error);
            thread::Builder::new()
                .name("hearo-capture".to_string())
                .spawn(move || {
                    run_capture(ring, ring_len, stop_signal, stream_error, ready_tx);
                })
                .map_err(|e| AcquisitionError::StreamError(e.to_string()))?
        };

        let sample_rate = match ready_rx.recv_timeout(START_TIMEOUT) {
            Ok(Ok(rate)) => rate,
            Ok(Err(err)) => {
                let _ = thread.join();
                return Err(err);
            }
            Err(_) => {
                stop_signal.store(true, Ordering::SeqCst);
                return Err(AcquisitionError::StartTimeout(START_TIMEOUT));
            }
        };

        log::info!("Microphone opened at {} Hz", sample_rate);

        Ok(MicrophoneSource {
            ring,
            sample_rate,
            stop_signal,
            stream_error,
            thread: Some(thread),
        })
    }
}

impl FrameSource for MicrophoneSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read_frame(&mut self, len: usize) -> Result<Option<Vec<f32>>, AcquisitionError> {
        if let Some(reason) = self
            .stream_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            return Err(AcquisitionError::Disconnected(reason));
        }

        let ring = self.ring.lock().unwrap_or_else(PoisonError::into_inner);
        let available = ring.len().min(len);
        let mut frame = vec![0.0; len - available];
        frame.extend(ring.iter().skip(ring.len() - available));

        Ok(Some(frame))
    }
}

impl Drop for MicrophoneSource {
    fn drop(&mut self) {
        self.stop_signal.store(true, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

/// Body of the capture thread. Reports the negotiated sample rate (or the
/// failure) once, then keeps the stream alive until stopped.
fn run_capture(
    ring: Arc<Mutex<VecDeque<f32>>>,
    ring_len: usize,
    stop_signal: Arc<AtomicBool>,
    stream_error: Arc<Mutex<Option<String>>>,
    ready_tx: mpsc::SyncSender<Result<u32, AcquisitionError>>,
) {
    let stream = match build_stream(ring, ring_len, Arc::clone(&stream_error)) {
        Ok((stream, sample_rate)) => {
            let _ = ready_tx.send(Ok(sample_rate));
            stream
        }
        Err(err) => {
            log::error!("Audio input unavailable: {}", err);
            let _ = ready_tx.send(Err(err));
            return;
        }
    };

    while !stop_signal.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(50));
    }

    // Stream is dropped here, stopping capture
    drop(stream);
    log::debug!("Capture thread stopped");
}

fn build_stream(
    ring: Arc<Mutex<VecDeque<f32>>>,
    ring_len: usize,
    stream_error: Arc<Mutex<Option<String>>>,
) -> Result<(cpal::Stream, u32), AcquisitionError> {
    let host = cpal::default_host();

    let device = host
        .default_input_device()
        .ok_or(AcquisitionError::NoInputDevice)?;

    let config = device
        .default_input_config()
        .map_err(|e| AcquisitionError::ConfigError(e.to_string()))?;

    let sample_rate = config.sample_rate().0;
    let channels = config.channels().max(1) as usize;

    let stream = match config.sample_format() {
        SampleFormat::F32 => input_stream::<f32>(&device, &config.into(), channels, ring, ring_len, stream_error),
        SampleFormat::I16 => input_stream::<i16>(&device, &config.into(), channels, ring, ring_len, stream_error),
        SampleFormat::U16 => input_stream::<u16>(&device, &config.into(), channels, ring, ring_len, stream_error),
        other => {
            return Err(AcquisitionError::ConfigError(format!(
                "Unsupported sample format {:?}",
                other
            )))
        }
    }?;

    stream
        .play()
        .map_err(|e| AcquisitionError::StreamError(e.to_string()))?;

    Ok((stream, sample_rate))
}

fn input_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    channels: usize,
    ring: Arc<Mutex<VecDeque<f32>>>,
    ring_len: usize,
    stream_error: Arc<Mutex<Option<String>>>,
) -> Result<cpal::Stream, AcquisitionError>
where
    T: SizedSample,
    f32: cpal::FromSample<T>,
{
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let mut ring = ring.lock().unwrap_or_else(PoisonError::into_inner);
                for frame in data.chunks(channels) {
                    let mono = frame.iter().map(|s| s.to_sample::<f32>()).sum::<f32>()
                        / frame.len() as f32;
                    if ring.len() == ring_len {
                        ring.pop_front();
                    }
                    ring.push_back(mono);
                }
            },
            move |err| {
                log::error!("Audio input stream error: {}", err);
                *stream_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(err.to_string());
            },
            None,
        )
        .map_err(|e| AcquisitionError::StreamError(e.to_string()))
}
