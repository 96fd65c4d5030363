//! Fakes shared by unit tests across the crate.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream;

use crate::audio::decode::DecodedAudio;
use crate::audio::playback::{AudioOutput, SilentPlayback};
use crate::error::{Result, SpeechError};
use crate::llm::error::LlmError;
use crate::llm::provider::{ReplyProvider, TokenStream};
use crate::llm::types::{Message, RequestOptions};
use crate::pipeline::display::TextSink;
use crate::tts::SpeechSynthesizer;

/// Write a 16-bit PCM WAV file.
pub fn write_wav(path: &Path, channels: u16, sample_rate: u32, frames: &[i16]) {
    let data_len = (frames.len() * 2) as u32;
    let byte_rate = sample_rate * u32::from(channels) * 2;
    let mut bytes = Vec::with_capacity(44 + frames.len() * 2);
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
    bytes.extend_from_slice(b"WAVEfmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&channels.to_le_bytes());
    bytes.extend_from_slice(&sample_rate.to_le_bytes());
    bytes.extend_from_slice(&byte_rate.to_le_bytes());
    bytes.extend_from_slice(&(channels * 2).to_le_bytes());
    bytes.extend_from_slice(&16u16.to_le_bytes());
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len.to_le_bytes());
    for s in frames {
        bytes.extend_from_slice(&s.to_le_bytes());
    }
    std::fs::write(path, bytes).unwrap();
}

/// One scripted provider response.
#[derive(Debug, Clone)]
pub enum Step {
    /// The request fails before any token arrives.
    Fail(LlmError),
    /// The stream yields these fragments, then optionally an error.
    Stream {
        tokens: Vec<String>,
        error: Option<LlmError>,
    },
}

impl Step {
    pub fn tokens<S: AsRef<str>>(tokens: &[S]) -> Self {
        Self::Stream {
            tokens: tokens.iter().map(|t| t.as_ref().to_owned()).collect(),
            error: None,
        }
    }

    pub fn tokens_then_error<S: AsRef<str>>(tokens: &[S], error: LlmError) -> Self {
        Self::Stream {
            tokens: tokens.iter().map(|t| t.as_ref().to_owned()).collect(),
            error: Some(error),
        }
    }

    pub fn fail(error: LlmError) -> Self {
        Self::Fail(error)
    }
}

/// Provider that replays a fixed list of steps, one per request.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    steps: Mutex<VecDeque<Step>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Model names requested so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReplyProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream(
        &self,
        model: &str,
        _messages: &[Message],
        _options: &RequestOptions,
    ) -> std::result::Result<TokenStream, LlmError> {
        self.calls.lock().unwrap().push(model.to_owned());
        let step = self
            .steps
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| LlmError::ProviderError("script exhausted".into()))?;
        match step {
            Step::Fail(error) => Err(error),
            Step::Stream { tokens, error } => {
                let items: Vec<std::result::Result<String, LlmError>> =
                    tokens.into_iter().map(Ok).chain(error.map(Err)).collect();
                Ok(Box::pin(stream::iter(items)))
            }
        }
    }
}

/// What a [`ScriptedSynth`] produces.
#[derive(Debug, Clone, Copy)]
pub enum SynthOutcome {
    /// A valid WAV file of this length.
    Audio { millis: u64 },
    /// An engine error.
    Fail,
    /// A file that cannot be decoded.
    Garbage,
}

/// Synthesizer writing canned WAV audio.
#[derive(Debug)]
pub struct ScriptedSynth {
    outcome: SynthOutcome,
    delay: Duration,
    requests: Mutex<Vec<(String, String)>>,
}

impl ScriptedSynth {
    pub fn new(outcome: SynthOutcome) -> Self {
        Self {
            outcome,
            delay: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Sleep this long before producing the outcome.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// `(text, voice)` pairs received so far.
    pub fn requests(&self) -> Vec<(String, String)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechSynthesizer for ScriptedSynth {
    fn name(&self) -> &str {
        "scripted"
    }

    fn file_extension(&self) -> &str {
        "wav"
    }

    async fn synthesize(&self, text: &str, voice: &str, output: &Path) -> Result<()> {
        self.requests
            .lock()
            .unwrap()
            .push((text.to_owned(), voice.to_owned()));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.outcome {
            SynthOutcome::Audio { millis } => {
                let frames = vec![0i16; (millis * 8) as usize];
                write_wav(output, 1, 8_000, &frames);
                Ok(())
            }
            SynthOutcome::Fail => Err(SpeechError::Tts("engine unavailable".into())),
            SynthOutcome::Garbage => {
                std::fs::write(output, b"definitely not audio")?;
                Ok(())
            }
        }
    }
}

/// Output that records what it was asked to play.
///
/// By default `play` returns at once; [`RecordingOutput::realtime`] takes
/// as long as the audio unless stopped.
#[derive(Debug, Default)]
pub struct RecordingOutput {
    fail: bool,
    realtime: bool,
    stopped: AtomicBool,
    played: Mutex<Vec<Duration>>,
}

impl RecordingOutput {
    /// An output whose device always errors.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// An output that plays for the audio's duration and honours stop.
    pub fn realtime() -> Self {
        Self {
            realtime: true,
            ..Self::default()
        }
    }

    pub fn played(&self) -> Vec<Duration> {
        self.played.lock().unwrap().clone()
    }

    /// Whether a playback was ended by the stop flag.
    pub fn was_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

impl AudioOutput for RecordingOutput {
    fn name(&self) -> &str {
        "recording"
    }

    fn play(&self, audio: &DecodedAudio, stop: &AtomicBool) -> Result<()> {
        if self.fail {
            return Err(SpeechError::Audio("device unplugged".into()));
        }
        self.played.lock().unwrap().push(audio.duration());
        if self.realtime {
            SilentPlayback.play(audio, stop)?;
            if stop.load(Ordering::Acquire) {
                self.stopped.store(true, Ordering::Release);
            }
        }
        Ok(())
    }
}

/// Text sink that keeps every word.
#[derive(Debug, Default)]
pub struct CollectingSink {
    speakers: Vec<String>,
    words: Vec<String>,
    finished: usize,
}

impl CollectingSink {
    pub fn words(&self) -> Vec<String> {
        self.words.clone()
    }

    pub fn speakers(&self) -> Vec<String> {
        self.speakers.clone()
    }

    /// How many replies were completed.
    pub fn finished(&self) -> usize {
        self.finished
    }
}

impl TextSink for CollectingSink {
    fn begin(&mut self, speaker: &str) -> Result<()> {
        self.speakers.push(speaker.to_owned());
        Ok(())
    }

    fn word(&mut self, word: &str) -> Result<()> {
        self.words.push(word.to_owned());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished += 1;
        Ok(())
    }
}
