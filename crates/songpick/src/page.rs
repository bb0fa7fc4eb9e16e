//! PageContext: everything one page (session) owns: its copy of the
//! settings, the orchestrator with cache and history, and the play button.
//!
//! Inbound relay messages and user triggers both land here.  The host feeds
//! them in one at a time, in the order it received them.

use std::sync::{Arc, RwLock};

use songpick_proto::protocol::SettingsChanged;
use songpick_proto::settings::Settings;
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::fetcher::FavoritesSource;
use crate::navigator::Navigator;
use crate::orchestrator::{PlayOutcome, PlaybackOrchestrator};
use crate::trigger::{classify_key, FocusContext, KeyPress, Trigger};

pub const CLEARED_MESSAGE: &str = "Cache and history cleared";

/// Messages a page receives from the relay.
#[derive(Debug)]
pub enum PageMessage {
    SettingsChanged(SettingsChanged),
    /// Drop cache and history, then acknowledge on `ack`.
    ClearCacheAndHistory { ack: oneshot::Sender<()> },
}

/// The spot where the host placed the play button.
pub trait ButtonSlot: Send + Sync {
    fn set_title(&self, title: &str);
}

pub fn button_title(shortcut_key: &str) -> String {
    format!("Play Random Song (Shortcut: {})", shortcut_key)
}

type DebugHook = Box<dyn Fn(bool) + Send + Sync>;

pub struct PageContext<S, N> {
    settings: RwLock<Settings>,
    orchestrator: PlaybackOrchestrator<S, N>,
    button: Option<Arc<dyn ButtonSlot>>,
    on_debug: Option<DebugHook>,
}

impl<S: FavoritesSource, N: Navigator> PageContext<S, N> {
    pub fn new(settings: Settings, orchestrator: PlaybackOrchestrator<S, N>) -> Self {
        Self {
            settings: RwLock::new(settings),
            orchestrator,
            button: None,
            on_debug: None,
        }
    }

    /// Called with the new value whenever debug mode changes, and once now.
    pub fn with_debug_hook(mut self, hook: impl Fn(bool) + Send + Sync + 'static) -> Self {
        hook(self.settings().debug);
        self.on_debug = Some(Box::new(hook));
        self
    }

    /// Attach the play button if the host found somewhere to put it.
    pub fn with_button(mut self, slot: Option<Arc<dyn ButtonSlot>>) -> Self {
        match &slot {
            Some(slot) => slot.set_title(&button_title(&self.settings().shortcut_key)),
            None => debug!(
                "No place for the play button; keyboard shortcut still available: {}",
                self.settings().shortcut_key
            ),
        }
        self.button = slot;
        self
    }

    pub fn settings(&self) -> Settings {
        self.settings
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn orchestrator(&self) -> &PlaybackOrchestrator<S, N> {
        &self.orchestrator
    }

    pub fn apply_settings(&self, changed: &SettingsChanged) {
        let mut settings = self.settings.write().unwrap_or_else(|e| e.into_inner());

        if let Some(key) = &changed.shortcut_key {
            settings.shortcut_key = key.clone();
            debug!("Shortcut key updated to: {}", key);
            if let Some(button) = &self.button {
                button.set_title(&button_title(key));
            }
        }
        if let Some(enabled) = changed.debug {
            settings.debug = enabled;
            if let Some(hook) = &self.on_debug {
                hook(enabled);
            }
            debug!("Debug mode updated to: {}", enabled);
        }
    }

    pub fn clear_cache_and_history(&self) {
        self.orchestrator.clear_cache_and_history();
        self.orchestrator.presenter().success(CLEARED_MESSAGE);
        info!("Favorites cache and playback history cleared");
    }

    pub fn handle_message(&self, message: PageMessage) {
        match message {
            PageMessage::SettingsChanged(changed) => self.apply_settings(&changed),
            PageMessage::ClearCacheAndHistory { ack } => {
                self.clear_cache_and_history();
                // The requester may have given up waiting.
                let _ = ack.send(());
            }
        }
    }

    /// Play if `press` is the shortcut.  Returns `None` when the key was not
    /// meant for us.
    pub async fn handle_key(&self, press: &KeyPress, focus: FocusContext) -> Option<PlayOutcome> {
        let shortcut = self.settings().shortcut_key;
        let trigger = classify_key(press, focus, &shortcut)?;
        debug!("Shortcut key pressed: {} ({:?})", shortcut, trigger);
        Some(
            self.orchestrator
                .play_random(trigger == Trigger::ForceRefresh)
                .await,
        )
    }

    /// The play button was clicked, with Shift when `force_refresh`.
    pub async fn activate(&self, force_refresh: bool) -> PlayOutcome {
        debug!("Random button clicked (force refresh: {})", force_refresh);
        self.orchestrator.play_random(force_refresh).await
    }
}
