use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use billy_gateway::config::resolve;
use billy_gateway::{
    Assistant, AudioSink, Capability, Config, EnvSnapshot, FileAudioSink, LoggingAudioSink,
    ProviderFactory, TurnOutcome, VoiceParams, VoiceProvider,
};

/// Billy - talking-fish voice assistant front-end
#[derive(Parser)]
#[command(name = "billy", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Skip voice synthesis (replies are printed only)
    #[arg(long)]
    text_only: bool,

    /// Save reply audio as numbered WAV files in this directory
    #[arg(long, env = "BILLY_AUDIO_DIR")]
    audio_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// List registered providers
    Providers,
    /// Validate the resolved configuration without contacting any backend
    Check,
    /// Synthesize text with the configured voice provider
    Say {
        /// Text to speak
        #[arg(default_value = "Hey, I'm Billy. Wanna hear a fish joke?")]
        text: String,
        /// Voice override
        #[arg(long)]
        voice: Option<String>,
        /// Write the audio to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Run a single turn and exit
    Ask {
        /// Message to send
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let debug_mode = resolve::resolve_modes(&EnvSnapshot::from_process()).debug;

    // Set up logging based on verbosity
    let filter = match (cli.verbose, debug_mode) {
        (0, false) => "info,billy_gateway=info",
        (0 | 1, _) => "info,billy_gateway=debug",
        (2, _) => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    if cli.text_only {
        config.modes.text_only = true;
    }
    tracing::debug!(
        llm = ?config.llm.summary(),
        voice = ?config.voice.summary(),
        modes = ?config.modes,
        "loaded configuration"
    );

    let factory = ProviderFactory::builtin();
    let audio_sink: Arc<dyn AudioSink> = match &cli.audio_dir {
        Some(dir) => Arc::new(FileAudioSink::new(dir)),
        None => Arc::new(LoggingAudioSink),
    };

    match cli.command {
        Some(Command::Providers) => {
            list_providers(factory);
            Ok(())
        }
        Some(Command::Check) => check(&config, factory),
        Some(Command::Say {
            text,
            voice,
            output,
        }) => say(&config, factory, &text, voice, output).await,
        Some(Command::Ask { text }) => {
            let mut assistant = Assistant::from_config(&config, factory)
                .await?
                .with_audio_sink(audio_sink);
            let outcome = assistant.process_user_input(&text).await;
            assistant.shutdown().await;
            match outcome? {
                TurnOutcome::Failed(message) => anyhow::bail!("turn failed: {message}"),
                _ => Ok(()),
            }
        }
        None => {
            let assistant = Assistant::from_config(&config, factory)
                .await?
                .with_audio_sink(audio_sink);
            interactive(assistant).await
        }
    }
}

fn list_providers(factory: &ProviderFactory) {
    println!("Language model providers:");
    for name in factory.available_llm_providers() {
        print_provider(factory, Capability::Llm, &name);
    }
    println!("\nVoice providers:");
    for name in factory.available_voice_providers() {
        print_provider(factory, Capability::Voice, &name);
    }
}

fn print_provider(factory: &ProviderFactory, capability: Capability, name: &str) {
    let required = factory
        .required_fields(capability, name)
        .unwrap_or_default()
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>();
    if required.is_empty() {
        println!("  {name}");
    } else {
        println!("  {name} (requires {})", required.join(", "));
    }
}

fn check(config: &Config, factory: &ProviderFactory) -> anyhow::Result<()> {
    factory.validate_config(Capability::Llm, &config.llm)?;
    println!("llm: {}", serde_json::to_string_pretty(&config.llm.summary())?);

    if config.modes.text_only {
        println!("voice: skipped (text-only mode)");
    } else {
        factory.validate_config(Capability::Voice, &config.voice)?;
        println!("voice: {}", serde_json::to_string_pretty(&config.voice.summary())?);
    }

    println!("\nConfiguration OK");
    Ok(())
}

async fn say(
    config: &Config,
    factory: &ProviderFactory,
    text: &str,
    voice: Option<String>,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    println!("Synthesizing: \"{text}\"");

    let provider = factory.create_voice_provider(&config.voice).await?;
    let params = VoiceParams::new(voice.or_else(|| config.voice.voice.clone()), config.voice.speed);
    let audio = provider.text_to_speech(text, &params).await?;
    println!("Got {} bytes of audio from {}", audio.len(), provider.name());

    if let Some(path) = output {
        tokio::fs::write(&path, &audio).await?;
        println!("Wrote {}", path.display());
    }
    Ok(())
}

/// Read lines from stdin until EOF, `quit`, or Ctrl-C while idle
async fn interactive(mut assistant: Assistant) -> anyhow::Result<()> {
    assistant.start_session().await?;
    let handle = assistant.interrupt_handle();

    println!("Billy is listening. Type a message, or 'quit' to exit. Ctrl-C interrupts a reply.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if matches!(input, "quit" | "exit") {
            break;
        }

        let turn = assistant.process_user_input(input);
        tokio::pin!(turn);
        let outcome = loop {
            tokio::select! {
                outcome = &mut turn => break outcome,
                _ = tokio::signal::ctrl_c() => {
                    handle.interrupt();
                }
            }
        };

        match outcome {
            Ok(TurnOutcome::Cancelled) => println!("(interrupted)"),
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "turn rejected"),
        }
    }

    assistant.shutdown().await;
    Ok(())
}
