use std::fs::{self, OpenOptions};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fitbot::app::App;
use fitbot::handler::{handle_capture_event, handle_event, handle_pipeline_event};
use fitbot::tui::{self, EventHandler};
use fitbot::voice::{CommandRecognizer, Recognizer, VoiceCapture};
use fitbot::{Config, FileStore, HttpResponder, Pipeline, ThemeStore};

#[derive(Parser)]
#[command(name = "fitbot")]
#[command(about = "Chat with the FitBot fitness assistant from your terminal")]
struct Cli {
    /// Backend chat URL (overrides config and FITBOT_ENDPOINT)
    #[arg(short, long)]
    endpoint: Option<String>,
    /// Conversation id sent with every request
    #[arg(short, long)]
    session: Option<String>,
    /// Milliseconds between revealed characters
    #[arg(long)]
    char_delay: Option<u64>,
    /// Write the effective configuration to the config file and exit
    #[arg(long)]
    save_config: bool,
}

fn init_logging() -> Result<()> {
    let log_dir = dirs::cache_dir()
        .context("Could not determine cache directory")?
        .join("fitbot");
    fs::create_dir_all(&log_dir)?;
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("fitbot.log"))?;

    // The terminal belongs to the UI, so logs go to a file
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fitbot=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(log_file)),
        )
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging()?;

    let mut config = Config::load()?.with_env_overrides();
    if let Some(endpoint) = cli.endpoint {
        config.endpoint = endpoint;
    }
    if let Some(session) = cli.session {
        config.session_id = Some(session);
    }
    if let Some(delay) = cli.char_delay {
        config.char_delay_ms = delay;
    }

    if cli.save_config {
        config.save()?;
        println!("Saved configuration to {}", Config::get_config_path()?.display());
        return Ok(());
    }

    let responder = HttpResponder::new(&config)?;
    info!(endpoint = responder.endpoint(), "Starting FitBot chat");

    let prefs = FileStore::open(FileStore::default_path()?);
    info!(path = %prefs.path().display(), "theme preferences");
    let mut themes = ThemeStore::new(prefs);

    let recognizer = config
        .voice_command
        .as_ref()
        .map(|cmd| Box::new(CommandRecognizer::new(cmd.clone())) as Box<dyn Recognizer>);

    let (capture_tx, mut capture_rx) = mpsc::unbounded_channel();
    let mut app = App::new(
        themes.get(),
        VoiceCapture::new(recognizer),
        capture_tx,
        config.endpoint.clone(),
    );

    let (mut pipeline, mut pipeline_rx) = Pipeline::new(Arc::new(responder), config.char_delay());

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = EventHandler::new();

    pipeline.start_welcome(&mut app, &config.welcome_message, config.welcome_delay());

    let result: Result<()> = async {
        loop {
            terminal.draw(|frame| fitbot::ui::render(&mut app, frame))?;

            tokio::select! {
                Some(event) = events.next() => {
                    handle_event(&mut app, &mut pipeline, &mut themes, event)?;
                }
                Some(event) = pipeline_rx.recv() => {
                    handle_pipeline_event(&mut app, &mut pipeline, event);
                }
                Some(event) = capture_rx.recv() => {
                    handle_capture_event(&mut app, &mut pipeline, event);
                }
                else => break,
            }

            if app.should_quit {
                break;
            }
        }
        Ok(())
    }
    .await;

    pipeline.shutdown();
    app.voice.stop();
    tui::restore()?;
    info!("FitBot chat closed");
    result
}
