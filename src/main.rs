use std::time::Duration;
use anyhow::{Result, anyhow};
use clap::Parser;
use tracing::info;

mod app;
mod config;
mod error;
mod gemini;
mod handler;
mod tui;
mod ui;

use app::App;
use config::Config;
use gemini::GeminiClient;

const DEFAULT_MODEL: &str = "gemini-2.0-flash";
const TICK_RATE: Duration = Duration::from_millis(300);

#[derive(Parser)]
#[command(name = "gemchat")]
#[command(about = "Terminal chat client for the Google Gemini API")]
struct Cli {
    /// Gemini model to use
    #[arg(short, long)]
    model: Option<String>,

    /// API key (overrides GEMINI_API_KEY and the config file)
    #[arg(long)]
    api_key: Option<String>,

    /// Base URL of the generative language API (e.g. a local proxy)
    #[arg(long)]
    api_base: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Keep the log guard alive for the lifetime of the app
    let _log_guard = init_tracing();

    let config = Config::load().unwrap_or_default();

    // Resolve the API key: flag, then environment, then config file
    let api_key = cli
        .api_key
        .or_else(|| std::env::var("GEMINI_API_KEY").ok())
        .or_else(|| config.api_key.clone())
        .ok_or_else(|| {
            anyhow!(
                "No API key found. Pass --api-key, set GEMINI_API_KEY, \
                 or add \"api_key\" to the config file."
            )
        })?;

    let model = cli
        .model
        .or_else(|| config.default_model.clone())
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());

    let client = match cli.api_base {
        Some(base) => GeminiClient::with_base_url(&api_key, &base),
        None => GeminiClient::new(&api_key),
    };

    info!(model, "starting chat session");

    let mut app = App::new(client, model);

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let result = run(&mut terminal, &mut app).await;
    tui::restore()?;
    result
}

async fn run(terminal: &mut tui::Tui, app: &mut App) -> Result<()> {
    let mut events = tui::EventHandler::new(TICK_RATE);

    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        if let Some(event) = events.next().await {
            handler::handle_event(app, event)?;
        }

        // Apply a settled request, if any; ticks keep this running while
        // the keyboard is idle.
        app.poll_response().await;
    }

    Ok(())
}

fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_dir = dirs::data_local_dir()?.join("gemini-chat").join("logs");
    let appender = tracing_appender::rolling::daily(log_dir, "gemini-chat.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("GEMINI_CHAT_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("gemini_chat=debug")),
        )
        .with_ansi(false)
        .with_writer(writer)
        .init();

    Some(guard)
}
