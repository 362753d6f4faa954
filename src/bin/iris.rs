//! CLI binary for iris.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use iris::actions::calc::{CalculateAction, ConvertUnitsAction};
use iris::actions::notes::{GetNotesAction, NotesStore, SaveNoteAction};
use iris::actions::system::{ShutdownAction, SleepAction, SystemInfoAction};
use iris::actions::time::TimeAction;
use iris::actions::timer::SetTimerAction;
use iris::actions::vision::{CaptureImageAction, NoCamera};
use iris::actions::web::{WeatherAction, WikipediaSummaryAction};
use iris::actions::ActionRegistry;
use iris::audio::CpalSource;
use iris::dictation::FileDictationLog;
use iris::engine::CliEngine;
use iris::recognizer::CommandRecognizer;
use iris::speech::{NullSpeech, SayCommand, SpeechOutput};
use iris::{SessionConfig, SessionCoordinator};

/// Iris: a voice-driven assistant session.
#[derive(Parser)]
#[command(name = "iris", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print replies only, never speak.
    #[arg(short, long)]
    quiet: bool,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Option<Command>,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Start a voice session.
    Listen,

    /// List available audio input devices.
    Devices,

    /// Write a default configuration file and exit.
    InitConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so they never collide with spoken-reply output.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("iris=info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = if let Some(ref path) = cli.config {
        SessionConfig::from_file(path)?
    } else {
        let default_path = SessionConfig::default_config_path();
        if default_path.exists() {
            SessionConfig::from_file(&default_path)?
        } else {
            SessionConfig::default()
        }
    };
    if cli.quiet {
        config.voice.quiet = true;
    }

    match cli.command.unwrap_or(Command::Listen) {
        Command::Listen => run_session(config).await,
        Command::Devices => list_devices(),
        Command::InitConfig => init_config(),
    }
}

async fn run_session(config: SessionConfig) -> anyhow::Result<()> {
    println!("Iris v{}", env!("CARGO_PKG_VERSION"));

    let engine = CliEngine::new(&config.engine.program)?;
    let recognizer = CommandRecognizer::new(&config.recognizer)?;
    let speech: Arc<dyn SpeechOutput> = if config.voice.quiet {
        Arc::new(NullSpeech)
    } else {
        match SayCommand::new("say", config.voice.clone()) {
            Ok(say) => Arc::new(say),
            Err(e) => {
                info!("no speech synthesizer available ({e}), replies will be silent");
                Arc::new(NullSpeech)
            }
        }
    };

    let dictation_dir = config
        .dictation
        .log_dir
        .clone()
        .unwrap_or_else(FileDictationLog::default_dir);
    let dictation_log = FileDictationLog::create_in(&dictation_dir)?;

    let registry = build_registry(Arc::clone(&speech));
    let source = CpalSource::new(config.audio.clone());
    let wake_name = config.wake.name.clone();

    let session = SessionCoordinator::new(config)
        .with_engine(Box::new(engine))
        .with_recognizer(Box::new(recognizer))
        .with_source(Box::new(source))
        .with_speech(speech)
        .with_registry(registry)
        .with_dictation_log(Box::new(dictation_log));

    let cancel = session.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl+C, shutting down...");
            cancel.cancel();
        }
    });

    println!("\nListening for \"{wake_name}\"... Press Ctrl+C to quit.\n");
    session.run().await?;
    Ok(())
}

/// The default action catalog.
fn build_registry(speech: Arc<dyn SpeechOutput>) -> ActionRegistry {
    let notes = Arc::new(NotesStore::new(NotesStore::default_dir()));
    let mut registry = ActionRegistry::new();
    registry.register(Arc::new(TimeAction));
    registry.register(Arc::new(CalculateAction));
    registry.register(Arc::new(ConvertUnitsAction));
    registry.register(Arc::new(SaveNoteAction::new(Arc::clone(&notes))));
    registry.register(Arc::new(GetNotesAction::new(notes)));
    registry.register(Arc::new(SetTimerAction::new(speech)));
    registry.register(Arc::new(CaptureImageAction::new(Arc::new(NoCamera))));
    registry.register(Arc::new(WeatherAction::new()));
    registry.register(Arc::new(WikipediaSummaryAction::new()));
    registry.register(Arc::new(SystemInfoAction));
    registry.register(Arc::new(SleepAction));
    registry.register(Arc::new(ShutdownAction));
    registry
}

fn list_devices() -> anyhow::Result<()> {
    println!("Input devices:");
    for name in CpalSource::list_input_devices()? {
        println!("  - {name}");
    }
    Ok(())
}

fn init_config() -> anyhow::Result<()> {
    let path = SessionConfig::default_config_path();
    if path.exists() {
        anyhow::bail!("config already exists at {}", path.display());
    }
    SessionConfig::default().save_to_file(&path)?;
    println!("wrote {}", path.display());
    Ok(())
}
