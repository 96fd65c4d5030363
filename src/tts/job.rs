//! Background speech synthesis with a one-shot readiness signal.
//!
//! The job owns the synthesized file until [`SpeechJob::take_artifact`]
//! hands it to playback. The file lives in a [`TempPath`], so it is
//! deleted whenever the artifact is dropped: after playback, on timeout,
//! on cancellation, or when a late result arrives after the caller gave up.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempPath;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::SpeechSynthesizer;
use crate::audio::decode::{DecodedAudio, decode_file};
use crate::error::{Result, SpeechError};

/// A synthesized, decoded utterance backed by a temporary file.
#[derive(Debug)]
pub struct SpeechArtifact {
    path: TempPath,
    audio: DecodedAudio,
}

impl SpeechArtifact {
    /// Location of the audio file (deleted when the artifact drops).
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Decoded samples.
    pub fn audio(&self) -> &DecodedAudio {
        &self.audio
    }

    /// Playback length.
    pub fn duration(&self) -> Duration {
        self.audio.duration()
    }

    /// Split into the file guard and the samples. The file is deleted when
    /// the guard drops.
    pub fn into_parts(self) -> (TempPath, DecodedAudio) {
        (self.path, self.audio)
    }
}

/// One background synthesis run.
#[derive(Debug)]
pub struct SpeechJob {
    text: String,
    ready_rx: Option<oneshot::Receiver<Option<SpeechArtifact>>>,
    artifact: Option<SpeechArtifact>,
    task: Option<JoinHandle<()>>,
}

impl SpeechJob {
    /// Spawn synthesis of `text` and return immediately.
    ///
    /// The audio file is created in `dir`, or the system temp directory.
    pub fn start(
        synth: Arc<dyn SpeechSynthesizer>,
        text: impl Into<String>,
        voice: impl Into<String>,
        dir: Option<PathBuf>,
    ) -> Self {
        let text = text.into();
        let voice = voice.into();
        let (tx, rx) = oneshot::channel();
        let task = {
            let text = text.clone();
            tokio::spawn(async move {
                let artifact = match synthesize(synth.as_ref(), &text, &voice, dir.as_deref()).await
                {
                    Ok(artifact) => Some(artifact),
                    Err(e) => {
                        warn!(engine = synth.name(), error = %e, "speech synthesis failed");
                        None
                    }
                };
                // A dropped receiver means the caller gave up; dropping the
                // artifact here deletes its file.
                let _ = tx.send(artifact);
            })
        };
        Self {
            text,
            ready_rx: Some(rx),
            artifact: None,
            task: Some(task),
        }
    }

    /// A job that never produces audio (speech disabled).
    pub fn disabled(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ready_rx: None,
            artifact: None,
            task: None,
        }
    }

    /// Text being spoken.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Wait up to `timeout` for synthesis to finish.
    ///
    /// Returns whether a playable artifact exists. On timeout the synthesis
    /// is abandoned and any result it produces later is discarded.
    pub async fn await_ready(&mut self, timeout: Duration) -> bool {
        if let Some(rx) = self.ready_rx.take() {
            match tokio::time::timeout(timeout, rx).await {
                Ok(Ok(artifact)) => self.artifact = artifact,
                Ok(Err(_)) => warn!("speech task ended without a result"),
                Err(_) => {
                    warn!(timeout_ms = timeout.as_millis() as u64, "speech not ready in time");
                    self.abort();
                }
            }
        }
        self.artifact.is_some()
    }

    /// Hand the artifact to the caller, if one is ready.
    pub fn take_artifact(&mut self) -> Option<SpeechArtifact> {
        self.artifact.take()
    }

    fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for SpeechJob {
    fn drop(&mut self) {
        self.abort();
    }
}

async fn synthesize(
    synth: &dyn SpeechSynthesizer,
    text: &str,
    voice: &str,
    dir: Option<&Path>,
) -> Result<SpeechArtifact> {
    let suffix = format!(".{}", synth.file_extension());
    let mut builder = tempfile::Builder::new();
    builder.prefix("saiyaara-speech-").suffix(&suffix);
    let file = match dir {
        Some(dir) => builder.tempfile_in(dir)?,
        None => builder.tempfile()?,
    };
    let path = file.into_temp_path();

    synth.synthesize(text, voice, &path).await?;

    let decode_path = path.to_path_buf();
    let audio = tokio::task::spawn_blocking(move || decode_file(&decode_path))
        .await
        .map_err(|e| SpeechError::Pipeline(format!("decode task failed: {e}")))??;
    if audio.is_empty() {
        return Err(SpeechError::Tts("synthesized audio is empty".into()));
    }
    debug!(
        duration_ms = audio.duration().as_millis() as u64,
        path = %path.display(),
        "speech ready"
    );
    Ok(SpeechArtifact { path, audio })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::test_utils::{ScriptedSynth, SynthOutcome};

    #[tokio::test]
    async fn ready_artifact_is_decoded_and_deleted_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let synth = Arc::new(ScriptedSynth::new(SynthOutcome::Audio { millis: 500 }));
        let mut job = SpeechJob::start(
            synth.clone(),
            "Hi there",
            "en-US-JennyNeural",
            Some(dir.path().to_path_buf()),
        );

        assert!(job.await_ready(Duration::from_secs(10)).await);
        let artifact = job.take_artifact().unwrap();
        assert_eq!(artifact.duration(), Duration::from_millis(500));
        let path = artifact.path().to_path_buf();
        assert!(path.exists());
        assert_eq!(synth.requests(), vec![("Hi there".to_string(), "en-US-JennyNeural".to_string())]);

        drop(artifact);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn synthesis_failure_signals_not_ready_and_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let synth = Arc::new(ScriptedSynth::new(SynthOutcome::Fail));
        let mut job = SpeechJob::start(synth, "text", "voice", Some(dir.path().to_path_buf()));

        assert!(!job.await_ready(Duration::from_secs(10)).await);
        assert!(job.take_artifact().is_none());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn undecodable_audio_is_not_ready() {
        let dir = tempfile::tempdir().unwrap();
        let synth = Arc::new(ScriptedSynth::new(SynthOutcome::Garbage));
        let mut job = SpeechJob::start(synth, "text", "voice", Some(dir.path().to_path_buf()));
        assert!(!job.await_ready(Duration::from_secs(10)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_synthesis_times_out() {
        let synth = Arc::new(
            ScriptedSynth::new(SynthOutcome::Audio { millis: 100 }).with_delay(Duration::from_secs(30)),
        );
        let mut job = SpeechJob::start(synth, "text", "voice", None);

        let started = tokio::time::Instant::now();
        assert!(!job.await_ready(Duration::from_secs(10)).await);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(10) && elapsed < Duration::from_secs(11));
        assert!(job.take_artifact().is_none());
        assert!(!job.await_ready(Duration::from_secs(10)).await);
    }

    #[tokio::test]
    async fn disabled_job_is_never_ready() {
        let mut job = SpeechJob::disabled("quiet");
        assert_eq!(job.text(), "quiet");
        assert!(!job.await_ready(Duration::from_secs(10)).await);
    }
}
