mod cache;
mod control;
mod favorites;
mod fetcher;
mod history;
mod logging;
mod navigator;
mod notify;
mod orchestrator;
mod page;
mod relay;
mod selector;
mod terminal;
mod trigger;

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use songpick_proto::config::Config;
use songpick_proto::protocol::{ControlReply, ControlRequest};
use songpick_proto::settings::{Settings, SettingsStore};
use tracing::{debug, info};

use crate::fetcher::{FavoritesFetcher, HttpSource};
use crate::history::PlaybackHistory;
use crate::navigator::SystemBrowser;
use crate::notify::{NotificationPresenter, NotificationSink, StderrSink, TerminalSink};
use crate::orchestrator::{PlayOutcome, PlaybackOrchestrator};
use crate::page::{ButtonSlot, PageContext};
use crate::relay::BroadcastRelay;
use crate::terminal::TerminalButton;

#[derive(Parser)]
#[command(name = "songpick", version, about = "Play a random song from your Songsterr favorites")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive session (default): press the shortcut key to play
    Run,
    /// Play one random favorite and exit
    Play {
        /// Ignore cached favorites
        #[arg(long)]
        refresh: bool,
    },
    /// Show or change settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Clear the favorites cache and playback history of the running session
    Clear,
}

#[derive(Subcommand)]
enum SettingsAction {
    Show,
    /// Set the keyboard shortcut
    SetKey { key: String },
    /// Turn debug logging on or off
    Debug {
        #[arg(value_enum)]
        state: Toggle,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

type Page = PageContext<HttpSource, SystemBrowser>;

fn build_page(config: &Config, settings: Settings, sink: Arc<dyn NotificationSink>) -> anyhow::Result<Page> {
    let source = HttpSource::new(
        &config.site.favorites_url,
        config.site.session_cookie.as_deref(),
    )?;
    let presenter = Arc::new(NotificationPresenter::new(
        sink,
        config.notifications.duration_ms,
    ));
    let orchestrator = PlaybackOrchestrator::new(
        FavoritesFetcher::new(source, config.cache.ttl()),
        PlaybackHistory::new(config.cache.history_capacity),
        presenter,
        SystemBrowser::new(config.browser.command.as_deref()),
        config.site.expected_host.clone(),
    );
    Ok(PageContext::new(settings, orchestrator))
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let config = Config::load()?;
    let store = Arc::new(SettingsStore::open(SettingsStore::default_path()));
    let settings = store.get().await;

    let log_path = songpick_proto::platform::data_dir().join("songpick.log");
    let log = logging::init(&log_path, settings.debug)?;
    info!("Config loaded from: {:?}", Config::config_path());

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            eprintln!("songpick log: {}", log_path.display());
            run_session(&config, store, settings, log).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Play { refresh } => play_once(&config, settings, refresh).await,
        Command::Settings { action } => {
            let request = match action {
                SettingsAction::Show => ControlRequest::GetSettings,
                SettingsAction::SetKey { key } => ControlRequest::SetShortcutKey { key },
                SettingsAction::Debug { state } => ControlRequest::SetDebug {
                    enabled: matches!(state, Toggle::On),
                },
            };
            send_control(&config, &store, request).await
        }
        Command::Clear => send_control(&config, &store, ControlRequest::ClearCacheAndHistory).await,
    }
}

async fn run_session(
    config: &Config,
    store: Arc<SettingsStore>,
    settings: Settings,
    log: logging::LogControl,
) -> anyhow::Result<()> {
    let listener = control::bind(&config.control.address()).await?;

    let relay = Arc::new(BroadcastRelay::new());
    let _forwarder = relay.clone().spawn_settings_forwarder(store.clone());
    let _server = control::serve(listener, store, relay.clone());
    let (_page_id, messages) = relay.register();

    let button: Arc<dyn ButtonSlot> = Arc::new(TerminalButton::place()?);
    let page = build_page(config, settings, Arc::new(TerminalSink::new()))?
        .with_debug_hook(move |on| log.set_debug(on))
        .with_button(Some(button));

    terminal::run(&page, messages).await
}

async fn play_once(config: &Config, settings: Settings, refresh: bool) -> anyhow::Result<ExitCode> {
    let page = build_page(config, settings, Arc::new(StderrSink))?;
    match page.orchestrator().play_random(refresh).await {
        PlayOutcome::Navigating { url, loading } => {
            loading.dismiss();
            println!("{}", url);
            Ok(ExitCode::SUCCESS)
        }
        PlayOutcome::Empty | PlayOutcome::Failed(_) => Ok(ExitCode::FAILURE),
    }
}

/// Route `request` through the running session, or apply it to the settings
/// file directly when none is listening.
async fn send_control(
    config: &Config,
    store: &SettingsStore,
    request: ControlRequest,
) -> anyhow::Result<ExitCode> {
    let reply = match control::request(&config.control.address(), request.clone()).await {
        Ok(reply) => reply,
        Err(e) => {
            debug!("No running session ({:#}); using settings file", e);
            if matches!(request, ControlRequest::ClearCacheAndHistory) {
                eprintln!("No running session; nothing to clear");
                return Ok(ExitCode::SUCCESS);
            }
            control::handle_request(store, None, request).await
        }
    };

    match reply {
        ControlReply::Settings { shortcut_key, debug } => {
            println!("shortcut_key = {:?}", shortcut_key);
            println!("debug = {}", debug);
            Ok(ExitCode::SUCCESS)
        }
        ControlReply::Cleared { .. } => {
            println!("{}", page::CLEARED_MESSAGE);
            Ok(ExitCode::SUCCESS)
        }
        ControlReply::Error { message } => {
            eprintln!("{}", message);
            Ok(ExitCode::FAILURE)
        }
    }
}
