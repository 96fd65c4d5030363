//! Turn orchestrator that wires reply acquisition, speech and delivery together.

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::delivery::{DeliveryReport, DeliverySynchronizer};
use super::display::TextSink;
use crate::error::Result;
use crate::history::Turn;
use crate::llm::{Reply, ReplySession};
use crate::transcript::TranscriptSink;
use crate::tts::{SpeechJob, SpeechSynthesizer};

/// Everything needed to start a speech job.
struct Voice {
    synth: Arc<dyn SpeechSynthesizer>,
    name: String,
    dir: Option<PathBuf>,
}

/// Result of one conversational turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    /// The reply that was delivered.
    pub reply: Reply,
    /// How delivery went.
    pub report: DeliveryReport,
}

/// Runs conversational turns end to end.
///
/// Each turn obtains a reply from the session, starts speech synthesis in
/// the background, then paces the text while the audio plays.
pub struct TurnPipeline {
    session: ReplySession,
    delivery: DeliverySynchronizer,
    voice: Option<Voice>,
    transcripts: Option<Arc<dyn TranscriptSink>>,
}

impl std::fmt::Debug for TurnPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnPipeline")
            .field("session", &self.session)
            .field("delivery", &self.delivery)
            .field("voice", &self.voice.as_ref().map(|v| v.synth.name()))
            .field("transcripts", &self.transcripts.is_some())
            .finish()
    }
}

impl TurnPipeline {
    /// Create a text-only pipeline.
    pub fn new(session: ReplySession, delivery: DeliverySynchronizer) -> Self {
        Self {
            session,
            delivery,
            voice: None,
            transcripts: None,
        }
    }

    /// Speak replies with `synth` using `voice`.
    pub fn with_speech(mut self, synth: Arc<dyn SpeechSynthesizer>, voice: impl Into<String>) -> Self {
        self.voice = Some(Voice {
            synth,
            name: voice.into(),
            dir: None,
        });
        self
    }

    /// Write synthesized audio into `dir` instead of the system temp directory.
    pub fn with_speech_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        if let Some(voice) = self.voice.as_mut() {
            voice.dir = Some(dir.into());
        }
        self
    }

    /// Archive history to `sink` when the session ends.
    pub fn with_transcripts(mut self, sink: Arc<dyn TranscriptSink>) -> Self {
        self.transcripts = Some(sink);
        self
    }

    /// The reply session and its history.
    pub fn session(&self) -> &ReplySession {
        &self.session
    }

    /// Continue from previously stored turns.
    pub fn restore_history(&mut self, turns: Vec<Turn>) {
        info!(turns = turns.len(), "restoring conversation history");
        self.session.restore_history(turns);
    }

    /// Answer `utterance` and deliver the reply on `sink`.
    ///
    /// # Errors
    ///
    /// Returns [`SpeechError::Cancelled`](crate::error::SpeechError::Cancelled)
    /// if `cancel` fires, or an error from `sink`. Generation failures are
    /// delivered as apologies, not returned.
    pub async fn take_turn(
        &mut self,
        utterance: &str,
        sink: &mut dyn TextSink,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome> {
        let reply = self.session.acquire_reply(utterance, cancel).await?;
        let report = self.say(&reply.text, sink, cancel).await?;
        Ok(TurnOutcome { reply, report })
    }

    /// Deliver `text` without touching history, e.g. a farewell.
    ///
    /// # Errors
    ///
    /// Same as [`TurnPipeline::take_turn`].
    pub async fn say(
        &self,
        text: &str,
        sink: &mut dyn TextSink,
        cancel: &CancellationToken,
    ) -> Result<DeliveryReport> {
        let job = match &self.voice {
            Some(voice) => SpeechJob::start(
                Arc::clone(&voice.synth),
                text,
                voice.name.clone(),
                voice.dir.clone(),
            ),
            None => SpeechJob::disabled(text),
        };
        self.delivery.deliver(text, job, sink, cancel).await
    }

    /// Archive and clear the history.
    ///
    /// The endpoint chain cursor is kept, so endpoints exhausted earlier
    /// stay skipped. Returns where the transcript was written, if anywhere.
    ///
    /// # Errors
    ///
    /// Returns the transcript sink's error. The history is cleared either
    /// way.
    pub fn end_session(&mut self) -> Result<Option<PathBuf>> {
        let turns = self.session.take_history();
        let Some(sink) = &self.transcripts else {
            return Ok(None);
        };
        match sink.archive(&turns) {
            Ok(path) => Ok(path),
            Err(e) => {
                warn!(error = %e, turns = turns.len(), "failed to archive transcript");
                Err(e)
            }
        }
    }
}
