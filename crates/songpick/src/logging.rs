use std::path::Path;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{reload, EnvFilter, Registry};

const BASE_DIRECTIVES: &str = "info,hyper_util=warn,hyper=warn,reqwest=warn";

fn filter_for(debug: bool) -> EnvFilter {
    if debug {
        EnvFilter::new(format!("{},songpick=debug", BASE_DIRECTIVES))
    } else {
        EnvFilter::new(BASE_DIRECTIVES)
    }
}

/// Lets the debug setting raise or lower the log level at runtime.
#[derive(Clone)]
pub struct LogControl {
    handle: Option<reload::Handle<EnvFilter, Registry>>,
}

impl LogControl {
    pub fn set_debug(&self, debug: bool) {
        // RUST_LOG wins over the setting.
        let Some(handle) = &self.handle else { return };
        if let Err(e) = handle.reload(filter_for(debug)) {
            tracing::warn!("Failed to change log level: {}", e);
        }
    }
}

/// Log to `log_path` (appending).  `RUST_LOG` overrides the level entirely.
pub fn init(log_path: &Path, debug: bool) -> anyhow::Result<LogControl> {
    if let Some(dir) = log_path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);

    let from_env = EnvFilter::try_from_default_env().ok();
    let reloadable = from_env.is_none();
    let (filter, handle) = reload::Layer::new(from_env.unwrap_or_else(|| filter_for(debug)));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(LogControl {
        handle: reloadable.then_some(handle),
    })
}
