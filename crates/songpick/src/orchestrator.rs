//! PlaybackOrchestrator: the "play a random favorite" operation.
//!
//! States:
//! ```text
//!  Idle ──trigger──▶ Loading ──▶ Navigating   (loading notification left up)
//!                           ├──▶ Empty  ──▶ Idle
//!                           └──▶ Failed ──▶ Idle
//! ```
//! Every exit other than `Navigating` dismisses the loading notification.
//! Failures never escape `play_random`; they become an outcome plus a
//! user-facing notification.

use std::sync::{Arc, Mutex, MutexGuard};

use reqwest::Url;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::fetcher::{FavoritesFetcher, FavoritesSource, FetchError};
use crate::history::PlaybackHistory;
use crate::navigator::Navigator;
use crate::notify::{NotificationHandle, NotificationPresenter};
use crate::selector::select_random;

pub const LOADING_MESSAGE: &str = "Loading favorites...";
pub const EMPTY_MESSAGE: &str = "No favorites found. Add some songs to your favorites first!";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Loading,
    Navigating,
    Failed,
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlayError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// The chosen link does not parse or points away from the site.
    #[error("invalid song URL {0:?}")]
    InvalidUrl(String),
}

impl PlayError {
    /// The text shown to the user for this failure.
    pub fn user_message(&self) -> String {
        match self {
            PlayError::Fetch(FetchError::AuthRequired) => {
                "Please log in to Songsterr to use this feature".to_string()
            }
            PlayError::Fetch(FetchError::Http(status)) => {
                format!("Failed to fetch favorites (Error {})", status)
            }
            PlayError::Fetch(FetchError::Network(_)) => {
                "Failed to load favorites. Please try again.".to_string()
            }
            PlayError::InvalidUrl(_) => "Invalid song URL detected".to_string(),
        }
    }
}

#[derive(Debug)]
pub enum PlayOutcome {
    /// Navigation to `url` has started.  The loading notification is handed
    /// to the caller, whose page is about to go away.
    Navigating {
        url: Url,
        loading: NotificationHandle,
    },
    Empty,
    Failed(PlayError),
}

enum Pick {
    Song(Url),
    Empty,
}

pub struct PlaybackOrchestrator<S, N> {
    fetcher: FavoritesFetcher<S>,
    history: Mutex<PlaybackHistory>,
    presenter: Arc<NotificationPresenter>,
    navigator: N,
    expected_host: String,
    state: watch::Sender<PlaybackState>,
}

impl<S: FavoritesSource, N: Navigator> PlaybackOrchestrator<S, N> {
    pub fn new(
        fetcher: FavoritesFetcher<S>,
        history: PlaybackHistory,
        presenter: Arc<NotificationPresenter>,
        navigator: N,
        expected_host: impl Into<String>,
    ) -> Self {
        let (state, _) = watch::channel(PlaybackState::Idle);
        Self {
            fetcher,
            history: Mutex::new(history),
            presenter,
            navigator,
            expected_host: expected_host.into(),
            state,
        }
    }

    pub fn presenter(&self) -> &Arc<NotificationPresenter> {
        &self.presenter
    }

    fn history(&self) -> MutexGuard<'_, PlaybackHistory> {
        self.history.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: PlaybackState) {
        self.state.send_replace(state);
    }

    pub fn clear_cache_and_history(&self) {
        self.fetcher.clear_cache();
        self.history().clear();
    }

    /// Fetch favorites, pick one not played recently, and navigate to it.
    /// `force_refresh` first drops the cache and the playback history.
    pub async fn play_random(&self, force_refresh: bool) -> PlayOutcome {
        if force_refresh {
            self.clear_cache_and_history();
            info!("Forced refresh: favorites cache and history cleared");
        }

        self.set_state(PlaybackState::Loading);
        let loading = self.presenter.loading(LOADING_MESSAGE);

        match self.pick(force_refresh).await {
            Ok(Pick::Song(url)) => {
                self.set_state(PlaybackState::Navigating);
                debug!("Navigating to random song: {}", url);
                self.navigator.navigate(&url);
                PlayOutcome::Navigating { url, loading }
            }
            Ok(Pick::Empty) => {
                loading.dismiss();
                self.presenter.error(EMPTY_MESSAGE);
                debug!("No favorite songs found");
                self.finish(PlaybackState::Empty);
                PlayOutcome::Empty
            }
            Err(e) => {
                loading.dismiss();
                self.presenter.error(e.user_message());
                debug!("Play attempt failed: {}", e);
                self.finish(PlaybackState::Failed);
                PlayOutcome::Failed(e)
            }
        }
    }

    fn finish(&self, terminal: PlaybackState) {
        self.set_state(terminal);
        self.set_state(PlaybackState::Idle);
    }

    async fn pick(&self, force_refresh: bool) -> Result<Pick, PlayError> {
        let favorites = self.fetcher.fetch_favorites(force_refresh).await?;
        debug!("Found {} favorite songs", favorites.len());

        let chosen = {
            let history = self.history();
            select_random(&favorites, &history, &mut rand::thread_rng()).cloned()
        };
        let Some(chosen) = chosen else {
            return Ok(Pick::Empty);
        };

        let url = Url::parse(&chosen.href).map_err(|_| PlayError::InvalidUrl(chosen.href.clone()))?;
        if url.host_str() != Some(self.expected_host.as_str()) {
            debug!("Invalid hostname: {:?}", url.host_str());
            return Err(PlayError::InvalidUrl(chosen.href));
        }

        let mut history = self.history();
        history.push(chosen.href);
        debug!("Added to history ({}/{})", history.len(), history.capacity());
        Ok(Pick::Song(url))
    }
}
