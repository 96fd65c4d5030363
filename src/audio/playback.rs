//! Audio playback.
//!
//! Outputs play decoded audio on a blocking thread; a [`PlaybackHandle`]
//! lets the async side observe, stop and join that work.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::decode::DecodedAudio;
use crate::error::{Result, SpeechError};

/// Granularity at which blocking outputs check the stop flag.
const STOP_POLL: Duration = Duration::from_millis(10);

/// A sink that plays decoded audio.
pub trait AudioOutput: Send + Sync {
    /// Output name for logs.
    fn name(&self) -> &str;

    /// Play `audio`, blocking until it finishes or `stop` becomes true.
    ///
    /// # Errors
    ///
    /// Returns [`SpeechError::Audio`] if the device cannot play.
    fn play(&self, audio: &DecodedAudio, stop: &AtomicBool) -> Result<()>;
}

/// Handle to playback running on a blocking thread.
///
/// Dropping the handle requests a stop.
#[derive(Debug)]
pub struct PlaybackHandle {
    stop: Arc<AtomicBool>,
    playing: Arc<AtomicBool>,
    task: Option<JoinHandle<Result<()>>>,
}

impl PlaybackHandle {
    /// Start playing `audio` on `output`.
    pub fn start(output: Arc<dyn AudioOutput>, audio: DecodedAudio) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let playing = Arc::new(AtomicBool::new(true));
        let task = {
            let stop = Arc::clone(&stop);
            let playing = Arc::clone(&playing);
            tokio::task::spawn_blocking(move || {
                debug!(
                    output = output.name(),
                    duration_ms = audio.duration().as_millis() as u64,
                    "playback started"
                );
                let result = output.play(&audio, &stop);
                playing.store(false, Ordering::Release);
                result
            })
        };
        Self {
            stop,
            playing,
            task: Some(task),
        }
    }

    /// A handle with nothing to play.
    pub fn idle() -> Self {
        Self {
            stop: Arc::new(AtomicBool::new(true)),
            playing: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }

    /// Whether audio is still playing.
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    /// Ask the output to stop as soon as possible.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Wait for playback to end.
    ///
    /// # Errors
    ///
    /// Returns the output's error, or [`SpeechError::Pipeline`] if the playback
    /// thread panicked.
    pub async fn wait(mut self) -> Result<()> {
        match self.task.take() {
            Some(task) => task
                .await
                .map_err(|e| SpeechError::Pipeline(format!("playback task failed: {e}")))?,
            None => Ok(()),
        }
    }
}

impl Drop for PlaybackHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Output that plays nothing but takes as long as the audio would.
///
/// Used when no speaker backend is compiled in, so pacing and joining
/// behave the same with or without sound.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentPlayback;

impl AudioOutput for SilentPlayback {
    fn name(&self) -> &str {
        "silent"
    }

    fn play(&self, audio: &DecodedAudio, stop: &AtomicBool) -> Result<()> {
        let deadline = Instant::now() + audio.duration();
        while !stop.load(Ordering::Acquire) {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep(STOP_POLL.min(deadline - now));
        }
        Ok(())
    }
}

#[cfg(feature = "speaker")]
pub use speaker::CpalPlayback;

#[cfg(feature = "speaker")]
mod speaker {
    use super::{AudioOutput, DecodedAudio, STOP_POLL};
    use crate::error::{Result, SpeechError};
    use cpal::StreamConfig;
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use tracing::{error, info};

    /// Audio playback to system speakers via cpal.
    pub struct CpalPlayback {
        device: cpal::Device,
        name: String,
    }

    impl CpalPlayback {
        /// Open the named output device, or the default one.
        ///
        /// # Errors
        ///
        /// Returns an error if no matching output device is available.
        pub fn new(device_name: Option<&str>) -> Result<Self> {
            let host = cpal::default_host();
            let device = if let Some(name) = device_name {
                host.output_devices()
                    .map_err(|e| SpeechError::Audio(format!("cannot enumerate devices: {e}")))?
                    .find(|d| {
                        d.description()
                            .ok()
                            .is_some_and(|desc| desc.name() == name)
                    })
                    .ok_or_else(|| SpeechError::Audio(format!("output device '{name}' not found")))?
            } else {
                host.default_output_device()
                    .ok_or_else(|| SpeechError::Audio("no default output device".into()))?
            };

            let name = device
                .description()
                .map(|d| d.name().to_owned())
                .unwrap_or_else(|_| "<unknown>".into());
            info!("using output device: {name}");
            Ok(Self { device, name })
        }
    }

    struct PlaybackBuffer {
        samples: Vec<f32>,
        position: usize,
        finished: bool,
    }

    impl AudioOutput for CpalPlayback {
        fn name(&self) -> &str {
            &self.name
        }

        fn play(&self, audio: &DecodedAudio, stop: &AtomicBool) -> Result<()> {
            let stream_config = StreamConfig {
                channels: 1,
                sample_rate: audio.sample_rate,
                buffer_size: cpal::BufferSize::Default,
            };
            let buffer = Arc::new(Mutex::new(PlaybackBuffer {
                samples: audio.samples.clone(),
                position: 0,
                finished: false,
            }));
            let buffer_clone = Arc::clone(&buffer);

            let stream = self
                .device
                .build_output_stream(
                    &stream_config,
                    move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                        let Ok(mut buf) = buffer_clone.lock() else {
                            return;
                        };
                        for sample in data.iter_mut() {
                            if buf.position < buf.samples.len() {
                                *sample = buf.samples[buf.position];
                                buf.position += 1;
                            } else {
                                *sample = 0.0;
                                buf.finished = true;
                            }
                        }
                    },
                    move |err| {
                        error!("audio output stream error: {err}");
                    },
                    None,
                )
                .map_err(|e| SpeechError::Audio(format!("failed to build output stream: {e}")))?;

            stream
                .play()
                .map_err(|e| SpeechError::Audio(format!("failed to start output stream: {e}")))?;

            while !stop.load(Ordering::Acquire) {
                std::thread::sleep(STOP_POLL);
                let buf = buffer
                    .lock()
                    .map_err(|e| SpeechError::Audio(format!("playback buffer lock poisoned: {e}")))?;
                if buf.finished {
                    break;
                }
            }
            drop(stream);
            Ok(())
        }
    }
}

/// Log and swallow a playback failure; audio problems never fail a turn.
pub(crate) fn log_playback_error(result: Result<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "playback failed");
            false
        }
    }
}
