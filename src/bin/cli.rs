//! CLI binary for saiyaara.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use saiyaara::audio::AudioOutput;
use saiyaara::llm::{OpenAiCompatConfig, OpenAiCompatProvider, ReplyProvider, ReplySession};
use saiyaara::pipeline::{DeliverySynchronizer, TerminalSink, TurnPipeline};
use saiyaara::prompt::Persona;
use saiyaara::transcript::JsonTranscriptStore;
use saiyaara::tts::{HttpSpeechSynthesizer, HttpTtsConfig};
use saiyaara::{AssistantConfig, RuntimeEvent};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Words that end a text session when typed on their own.
const EXIT_WORDS: &[&str] = &["quit", "exit", "bye", "goodbye", "stop", "close", "end"];

const FAREWELL: &str = "Nice talking to you. Take care!";

/// Saiyaara: a friendly companion that talks back.
#[derive(Parser)]
#[command(name = "saiyaara", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Option<Command>,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Start a text conversation with spoken replies.
    Chat {
        /// Continue from a saved transcript.
        #[arg(long)]
        resume: Option<PathBuf>,
    },

    /// Show configuration.
    Config {
        /// Print the effective configuration as TOML.
        #[arg(long)]
        print: bool,
    },

    /// List saved conversations, newest first.
    Chats {
        /// How many to show.
        #[arg(short = 'n', long, default_value_t = 10)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    // Quiet by default so logs do not break up the paced reply text.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("saiyaara=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(AssistantConfig::default_config_path);
    let config = load_config(&config_path, cli.config.is_some())?;

    match cli.command.unwrap_or(Command::Chat { resume: None }) {
        Command::Chat { resume } => run_chat(config, resume).await,
        Command::Config { print } => show_config(&config, &config_path, print),
        Command::Chats { limit } => list_chats(&config, limit),
    }
}

/// Read the config file, or fall back to defaults when the default path is absent.
fn load_config(path: &Path, explicit: bool) -> anyhow::Result<AssistantConfig> {
    if explicit || path.exists() {
        Ok(AssistantConfig::from_file(path)?)
    } else {
        let config = AssistantConfig::default();
        config.validate()?;
        Ok(config)
    }
}

fn show_config(config: &AssistantConfig, path: &Path, print: bool) -> anyhow::Result<()> {
    if print {
        print!("{}", toml::to_string_pretty(&config.redacted())?);
    } else {
        println!("{}", path.display());
    }
    Ok(())
}

fn list_chats(config: &AssistantConfig, limit: usize) -> anyhow::Result<()> {
    let store = JsonTranscriptStore::new(&config.transcripts.dir);
    let entries = store.recent(limit)?;
    if entries.is_empty() {
        println!("No saved conversations in {}", store.dir().display());
        return Ok(());
    }
    for entry in entries {
        println!("{}  {}  ({})", entry.date, entry.title, entry.path.display());
    }
    Ok(())
}

async fn run_chat(config: AssistantConfig, resume: Option<PathBuf>) -> anyhow::Result<()> {
    println!("Saiyaara v{}", env!("CARGO_PKG_VERSION"));

    let api_key = config.llm.effective_api_key();
    if api_key.is_empty() {
        anyhow::bail!("no API key: set llm.api_key or GEMINI_API_KEY");
    }
    let provider: Arc<dyn ReplyProvider> = Arc::new(OpenAiCompatProvider::new(
        OpenAiCompatConfig::new(api_key)
            .with_base_url(config.llm.base_url.clone())
            .with_request_timeout(Duration::from_secs(config.llm.request_timeout_secs)),
    )?);

    let (events_tx, events_rx) = broadcast::channel(64);
    tokio::spawn(report_progress(events_rx));

    let persona = Persona::from_config(&config.persona);
    let speaker = persona.name().to_owned();
    let session =
        ReplySession::from_config(provider, &config.llm, persona).with_runtime_events(events_tx.clone());
    let delivery =
        DeliverySynchronizer::from_config(open_output(), speaker, &config.tts, &config.display)
            .with_runtime_events(events_tx);

    let mut pipeline = TurnPipeline::new(session, delivery)
        .with_transcripts(Arc::new(JsonTranscriptStore::new(&config.transcripts.dir)));
    if config.tts.enabled {
        match HttpSpeechSynthesizer::new(HttpTtsConfig::from(&config.tts)) {
            Ok(synth) => pipeline = pipeline.with_speech(Arc::new(synth), config.tts.voice.clone()),
            Err(e) => warn!(error = %e, "speech disabled"),
        }
    }

    if let Some(path) = resume {
        let transcript = JsonTranscriptStore::load(&path)?;
        println!("Continuing \"{}\" from {}", transcript.title, transcript.date);
        pipeline.restore_history(transcript.to_turns());
    }

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl+C, shutting down...");
            cancel_clone.cancel();
        }
    });

    println!("\nType a message and press Enter. Say \"bye\" or press Ctrl+C to leave.");
    let result = converse(&mut pipeline, &config, &cancel).await;

    match pipeline.end_session() {
        Ok(Some(path)) => println!("\nConversation saved to {}", path.display()),
        Ok(None) => {}
        Err(e) => eprintln!("\nCould not save conversation: {e}"),
    }
    result
}

async fn converse(
    pipeline: &mut TurnPipeline,
    config: &AssistantConfig,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let mut sink = TerminalSink::stdout(config.display.line_width);
    let mut lines = spawn_line_reader();

    loop {
        print!("\nYou: ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            () = cancel.cancelled() => return Ok(()),
            line = lines.recv() => line,
        };
        let Some(line) = line else {
            return Ok(());
        };
        let utterance = line.trim();
        if utterance.is_empty() {
            continue;
        }

        if is_exit(utterance) {
            return match pipeline.say(FAREWELL, &mut sink, cancel).await {
                Err(e) if !e.is_cancelled() => Err(e.into()),
                _ => Ok(()),
            };
        }

        match pipeline.take_turn(utterance, &mut sink, cancel).await {
            Ok(outcome) => info!(kind = ?outcome.reply.kind, words = outcome.report.words, "turn done"),
            Err(e) if e.is_cancelled() => return Ok(()),
            Err(e) => return Err(e.into()),
        }
    }
}

/// Read stdin lines on a plain thread so a pending read never holds up
/// runtime shutdown.
fn spawn_line_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Whether `text` contains an exit word as a whole word.
fn is_exit(text: &str) -> bool {
    text.split(|c: char| !c.is_alphanumeric())
        .any(|word| EXIT_WORDS.iter().any(|exit| word.eq_ignore_ascii_case(exit)))
}

/// Pick the speaker output, falling back to a silent clock.
fn open_output() -> Arc<dyn AudioOutput> {
    #[cfg(feature = "speaker")]
    match saiyaara::audio::CpalPlayback::new(None) {
        Ok(output) => return Arc::new(output),
        Err(e) => warn!(error = %e, "no speaker available, replies will be text only"),
    }
    Arc::new(saiyaara::audio::SilentPlayback)
}

/// Print retry and fallback notices while the user waits for a reply.
async fn report_progress(mut rx: broadcast::Receiver<RuntimeEvent>) {
    loop {
        match rx.recv().await {
            Ok(RuntimeEvent::RateLimited { backoff, .. }) => {
                eprintln!("  (busy right now, trying again in {}s)", backoff.as_secs());
            }
            Ok(RuntimeEvent::EndpointExhausted {
                next: Some(next), ..
            }) => {
                eprintln!("  (switching to {next})");
            }
            Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_words_match_whole_words_only() {
        assert!(is_exit("bye"));
        assert!(is_exit("OK, goodbye!"));
        assert!(is_exit("please stop"));
        assert!(!is_exit("tell me about the weekend"));
        assert!(!is_exit("byebye"));
        assert!(!is_exit("legend"));
    }

    #[test]
    fn cli_defaults_to_chat() {
        let cli = Cli::try_parse_from(["saiyaara"]).unwrap_or_else(|e| panic!("{e}"));
        assert!(cli.command.is_none());

        let cli = Cli::try_parse_from(["saiyaara", "chats", "-n", "3"]).unwrap_or_else(|e| panic!("{e}"));
        assert!(matches!(cli.command, Some(Command::Chats { limit: 3 })));
    }
}
