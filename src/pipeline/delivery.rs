//! Synchronized delivery: paced text alongside speech playback.
//!
//! Delivery waits (bounded) for the speech job, starts playback on a
//! blocking thread, paces the words on the calling task, and only returns
//! once both have finished. When speech is missing the words are paced at a
//! nominal cadence and nothing is played.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::display::TextSink;
use crate::audio::playback::{AudioOutput, PlaybackHandle, log_playback_error};
use crate::config::{DisplayConfig, TtsConfig};
use crate::error::{Result, SpeechError};
use crate::runtime::{RuntimeEvent, RuntimeSender, emit};
use crate::tts::SpeechJob;

/// Default per-word cadence when the audio duration is unknown.
pub const DEFAULT_NOMINAL_WORD: Duration = Duration::from_millis(350);

/// Default bound on waiting for speech.
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(10);

/// What happened during one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Words displayed.
    pub words: usize,
    /// Delay between consecutive words.
    pub per_word: Duration,
    /// Whether speech became ready in time.
    pub speech_ready: bool,
    /// Whether audio was played to completion without error.
    pub audio_played: bool,
}

/// Joins paced display and playback for one reply.
pub struct DeliverySynchronizer {
    output: Arc<dyn AudioOutput>,
    speaker: String,
    ready_timeout: Duration,
    nominal_word: Duration,
    runtime_tx: Option<RuntimeSender>,
}

impl std::fmt::Debug for DeliverySynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliverySynchronizer")
            .field("output", &self.output.name())
            .field("speaker", &self.speaker)
            .field("ready_timeout", &self.ready_timeout)
            .field("nominal_word", &self.nominal_word)
            .finish()
    }
}

impl DeliverySynchronizer {
    /// Create a synchronizer playing through `output`.
    pub fn new(output: Arc<dyn AudioOutput>, speaker: impl Into<String>) -> Self {
        Self {
            output,
            speaker: speaker.into(),
            ready_timeout: DEFAULT_READY_TIMEOUT,
            nominal_word: DEFAULT_NOMINAL_WORD,
            runtime_tx: None,
        }
    }

    /// Create a synchronizer from the `[tts]` and `[display]` sections.
    pub fn from_config(
        output: Arc<dyn AudioOutput>,
        speaker: impl Into<String>,
        tts: &TtsConfig,
        display: &DisplayConfig,
    ) -> Self {
        Self::new(output, speaker)
            .with_ready_timeout(tts.ready_timeout())
            .with_nominal_word(Duration::from_millis(display.nominal_word_ms))
    }

    /// Set the bound on waiting for speech.
    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    /// Set the cadence used without audio.
    pub fn with_nominal_word(mut self, cadence: Duration) -> Self {
        self.nominal_word = cadence;
        self
    }

    /// Attach a runtime event broadcaster for UI/observability.
    pub fn with_runtime_events(mut self, tx: RuntimeSender) -> Self {
        self.runtime_tx = Some(tx);
        self
    }

    /// Display `text` on `sink` while playing the speech from `job`.
    ///
    /// # Errors
    ///
    /// Returns [`SpeechError::Cancelled`] if `cancel` fires (playback is
    /// stopped and the audio file removed), or the sink's error if the text
    /// cannot be shown. Speech and playback failures are logged, not
    /// returned.
    pub async fn deliver(
        &self,
        text: &str,
        mut job: SpeechJob,
        sink: &mut dyn TextSink,
        cancel: &CancellationToken,
    ) -> Result<DeliveryReport> {
        let speech_ready = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(SpeechError::Cancelled),
            ready = job.await_ready(self.ready_timeout) => ready,
        };
        emit(
            self.runtime_tx.as_ref(),
            RuntimeEvent::SpeechReady {
                ready: speech_ready,
            },
        );
        let artifact = job.take_artifact();
        drop(job);

        let words: Vec<&str> = text.split_whitespace().collect();
        let (file_guard, playback, per_word) = match artifact {
            Some(artifact) => {
                let (path, audio) = artifact.into_parts();
                let per_word = pace(audio.duration(), words.len());
                let handle = PlaybackHandle::start(Arc::clone(&self.output), audio);
                (Some(path), handle, per_word)
            }
            None => (None, PlaybackHandle::idle(), self.nominal_word),
        };
        let has_audio = file_guard.is_some();
        debug!(
            words = words.len(),
            per_word_ms = per_word.as_millis() as u64,
            has_audio,
            "delivering reply"
        );

        sink.begin(&self.speaker)?;
        let start = Instant::now();
        for (i, word) in words.iter().enumerate() {
            let target = start + per_word.saturating_mul(u32::try_from(i).unwrap_or(u32::MAX));
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    playback.stop();
                    return Err(SpeechError::Cancelled);
                }
                () = tokio::time::sleep_until(target) => {}
            }
            sink.word(word)?;
        }
        sink.finish()?;

        let played = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(SpeechError::Cancelled),
            result = playback.wait() => log_playback_error(result),
        };
        drop(file_guard);

        let audio_played = has_audio && played;
        emit(
            self.runtime_tx.as_ref(),
            RuntimeEvent::DeliveryFinished { audio_played },
        );
        Ok(DeliveryReport {
            words: words.len(),
            per_word,
            speech_ready,
            audio_played,
        })
    }
}

/// Per-word delay that spreads `words` evenly across `duration`.
fn pace(duration: Duration, words: usize) -> Duration {
    match u32::try_from(words) {
        Ok(n) if n > 0 => duration / n,
        _ => Duration::ZERO,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::test_utils::{CollectingSink, RecordingOutput, ScriptedSynth, SynthOutcome};

    fn synchronizer(output: &Arc<RecordingOutput>) -> DeliverySynchronizer {
        let output: Arc<dyn AudioOutput> = output.clone();
        DeliverySynchronizer::new(output, "Saiyaara")
    }

    #[test]
    fn pace_divides_duration_by_words() {
        assert_eq!(pace(Duration::from_secs(2), 4), Duration::from_millis(500));
        assert_eq!(pace(Duration::from_secs(2), 0), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn without_speech_uses_nominal_cadence() {
        let output = Arc::new(RecordingOutput::default());
        let sync = synchronizer(&output);
        let mut sink = CollectingSink::default();

        let started = Instant::now();
        let report = sync
            .deliver(
                "one two three",
                SpeechJob::disabled("one two three"),
                &mut sink,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(sink.words(), vec!["one", "two", "three"]);
        assert_eq!(sink.finished(), 1);
        assert_eq!(report.per_word, DEFAULT_NOMINAL_WORD);
        assert!(!report.speech_ready);
        assert!(!report.audio_played);
        let elapsed = started.elapsed();
        assert!(elapsed >= DEFAULT_NOMINAL_WORD * 2 && elapsed < Duration::from_secs(1));
        assert!(output.played().is_empty());
    }

    #[tokio::test]
    async fn with_speech_paces_by_audio_duration_and_plays() {
        let dir = tempfile::tempdir().unwrap();
        let output = Arc::new(RecordingOutput::default());
        let sync = synchronizer(&output);
        let mut sink = CollectingSink::default();
        let synth = Arc::new(ScriptedSynth::new(SynthOutcome::Audio { millis: 400 }));
        let job = SpeechJob::start(synth, "Hi there", "voice", Some(dir.path().to_path_buf()));

        let report = sync
            .deliver("Hi there", job, &mut sink, &CancellationToken::new())
            .await
            .unwrap();

        assert!(report.speech_ready);
        assert!(report.audio_played);
        assert_eq!(report.per_word, Duration::from_millis(200));
        assert_eq!(sink.words(), vec!["Hi", "there"]);
        assert_eq!(output.played(), vec![Duration::from_millis(400)]);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn waits_for_playback_that_outlasts_the_text() {
        let dir = tempfile::tempdir().unwrap();
        let output = Arc::new(RecordingOutput::realtime());
        let sync = synchronizer(&output);
        let mut sink = CollectingSink::default();
        let synth = Arc::new(ScriptedSynth::new(SynthOutcome::Audio { millis: 800 }));
        let job = SpeechJob::start(synth, "Hello", "voice", Some(dir.path().to_path_buf()));

        let started = std::time::Instant::now();
        let report = sync
            .deliver("Hello", job, &mut sink, &CancellationToken::new())
            .await
            .unwrap();

        assert!(report.audio_played);
        assert_eq!(sink.words(), vec!["Hello"]);
        assert!(started.elapsed() >= Duration::from_millis(800));
        assert!(!output.was_stopped());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn cancellation_during_playback_stops_the_audio() {
        let dir = tempfile::tempdir().unwrap();
        let output = Arc::new(RecordingOutput::realtime());
        let sync = synchronizer(&output);
        let mut sink = CollectingSink::default();
        let synth = Arc::new(ScriptedSynth::new(SynthOutcome::Audio { millis: 5_000 }));
        let job = SpeechJob::start(synth, "A long reply", "voice", Some(dir.path().to_path_buf()));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let err = sync
            .deliver("A long reply", job, &mut sink, &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

        let deadline = std::time::Instant::now() + Duration::from_secs(1);
        while !output.was_stopped() && std::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(output.was_stopped());
        assert_eq!(output.played(), vec![Duration::from_millis(5_000)]);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_speech_falls_back_to_text_after_timeout() {
        let output = Arc::new(RecordingOutput::default());
        let sync = synchronizer(&output);
        let mut sink = CollectingSink::default();
        let synth = Arc::new(
            ScriptedSynth::new(SynthOutcome::Audio { millis: 100 }).with_delay(Duration::from_secs(60)),
        );
        let job = SpeechJob::start(synth, "late reply", "voice", None);

        let started = Instant::now();
        let report = sync
            .deliver("late reply", job, &mut sink, &CancellationToken::new())
            .await
            .unwrap();

        assert!(!report.speech_ready);
        assert!(!report.audio_played);
        assert_eq!(sink.words(), vec!["late", "reply"]);
        let elapsed = started.elapsed();
        assert!(elapsed >= DEFAULT_READY_TIMEOUT + DEFAULT_NOMINAL_WORD);
        assert!(elapsed < DEFAULT_READY_TIMEOUT + Duration::from_secs(1));
        assert!(output.played().is_empty());
    }

    #[tokio::test]
    async fn playback_failure_is_not_a_delivery_failure() {
        let output = Arc::new(RecordingOutput::failing());
        let sync = synchronizer(&output);
        let mut sink = CollectingSink::default();
        let synth = Arc::new(ScriptedSynth::new(SynthOutcome::Audio { millis: 100 }));
        let job = SpeechJob::start(synth, "hello", "voice", None);

        let report = sync
            .deliver("hello", job, &mut sink, &CancellationToken::new())
            .await
            .unwrap();
        assert!(report.speech_ready);
        assert!(!report.audio_played);
        assert_eq!(sink.words(), vec!["hello"]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_mid_display_stops_early() {
        let output = Arc::new(RecordingOutput::default());
        let sync = synchronizer(&output);
        let mut sink = CollectingSink::default();
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(800)).await;
            trigger.cancel();
        });

        let text = "a b c d e f g h";
        let err = sync
            .deliver(text, SpeechJob::disabled(text), &mut sink, &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(sink.words().len() < 8);
        assert_eq!(sink.finished(), 0);
    }
}
