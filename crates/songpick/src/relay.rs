//! BroadcastRelay: fans settings changes and clear commands out to every
//! open page.
//!
//! Pages register and get an mpsc receiver.  Delivery is best effort: a page
//! whose receiver is gone is forgotten, a page whose queue is full misses
//! that message and catches up on the next one.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use songpick_proto::protocol::SettingsChanged;
use songpick_proto::settings::SettingsStore;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::page::PageMessage;

const PAGE_QUEUE: usize = 16;

/// How long `clear_all` waits for each page to acknowledge.
pub const CLEAR_ACK_TIMEOUT: Duration = Duration::from_secs(2);

struct PageHandle {
    id: usize,
    tx: mpsc::Sender<PageMessage>,
}

#[derive(Default)]
pub struct BroadcastRelay {
    pages: Mutex<Vec<PageHandle>>,
    next_id: Mutex<usize>,
}

impl BroadcastRelay {
    pub fn new() -> Self {
        Self::default()
    }

    fn pages(&self) -> MutexGuard<'_, Vec<PageHandle>> {
        self.pages.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn register(&self) -> (usize, mpsc::Receiver<PageMessage>) {
        let id = {
            let mut next = self.next_id.lock().unwrap_or_else(|e| e.into_inner());
            *next += 1;
            *next
        };
        let (tx, rx) = mpsc::channel(PAGE_QUEUE);
        self.pages().push(PageHandle { id, tx });
        info!("Page {} registered, {} open", id, self.page_count());
        (id, rx)
    }

    pub fn page_count(&self) -> usize {
        let mut pages = self.pages();
        pages.retain(|p| !p.tx.is_closed());
        pages.len()
    }

    /// Send `changed` to every open page.
    pub fn forward_settings(&self, changed: &SettingsChanged) {
        let mut pages = self.pages();
        pages.retain(|page| {
            match page
                .tx
                .try_send(PageMessage::SettingsChanged(changed.clone()))
            {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!("Page {} is not keeping up; settings update dropped", page.id);
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!("Page {} closed", page.id);
                    false
                }
            }
        });
    }

    /// Ask every page to drop its cache and history.  Returns how many
    /// acknowledged within `CLEAR_ACK_TIMEOUT`.
    pub async fn clear_all(&self) -> usize {
        let mut waiting = Vec::new();
        {
            let mut pages = self.pages();
            pages.retain(|page| {
                let (ack, done) = oneshot::channel();
                match page.tx.try_send(PageMessage::ClearCacheAndHistory { ack }) {
                    Ok(()) => {
                        waiting.push((page.id, done));
                        true
                    }
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!("Page {} is not keeping up; clear command dropped", page.id);
                        true
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => false,
                }
            });
        }

        let mut acknowledged = 0;
        for (id, done) in waiting {
            match tokio::time::timeout(CLEAR_ACK_TIMEOUT, done).await {
                Ok(Ok(())) => acknowledged += 1,
                Ok(Err(_)) => debug!("Page {} closed before acknowledging clear", id),
                Err(_) => warn!("Page {} did not acknowledge clear in time", id),
            }
        }
        info!("Clear command acknowledged by {} page(s)", acknowledged);
        acknowledged
    }

    /// Forward every store change to the pages until the store goes away.
    pub fn spawn_settings_forwarder(
        self: Arc<Self>,
        store: Arc<SettingsStore>,
    ) -> tokio::task::JoinHandle<()> {
        let mut changes = store.subscribe();
        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(changed) => self.forward_settings(&changed),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Settings forwarder missed {} changes; resending all", n);
                        let settings = store.get().await;
                        self.forward_settings(&SettingsChanged {
                            shortcut_key: Some(settings.shortcut_key),
                            debug: Some(settings.debug),
                        });
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use songpick_proto::settings::Settings;

    fn key(k: &str) -> SettingsChanged {
        SettingsChanged {
            shortcut_key: Some(k.to_string()),
            debug: None,
        }
    }

    #[tokio::test]
    async fn settings_reach_every_page() {
        let relay = BroadcastRelay::new();
        let (_, mut a) = relay.register();
        let (_, mut b) = relay.register();

        relay.forward_settings(&key("r"));

        for rx in [&mut a, &mut b] {
            match rx.recv().await {
                Some(PageMessage::SettingsChanged(changed)) => assert_eq!(changed, key("r")),
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn closed_pages_are_pruned() {
        let relay = BroadcastRelay::new();
        let (_, a) = relay.register();
        let (_, _b) = relay.register();
        drop(a);

        relay.forward_settings(&key("r"));
        assert_eq!(relay.page_count(), 1);
    }

    #[tokio::test]
    async fn full_queue_drops_message_but_keeps_page() {
        let relay = BroadcastRelay::new();
        let (_, mut rx) = relay.register();
        for _ in 0..PAGE_QUEUE + 3 {
            relay.forward_settings(&key("r"));
        }
        assert_eq!(relay.page_count(), 1);

        let mut received = 0;
        while rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, PAGE_QUEUE);
    }

    #[tokio::test(start_paused = true)]
    async fn clear_counts_acknowledgements() {
        let relay = BroadcastRelay::new();
        let (_, mut responsive) = relay.register();
        let (_, _silent) = relay.register();

        tokio::spawn(async move {
            while let Some(msg) = responsive.recv().await {
                if let PageMessage::ClearCacheAndHistory { ack } = msg {
                    let _ = ack.send(());
                }
            }
        });

        assert_eq!(relay.clear_all().await, 1);
    }

    #[tokio::test]
    async fn clear_with_no_pages_is_zero() {
        assert_eq!(BroadcastRelay::new().clear_all().await, 0);
    }

    #[tokio::test]
    async fn forwarder_relays_store_updates() {
        let store = Arc::new(SettingsStore::in_memory(Settings::default()));
        let relay = Arc::new(BroadcastRelay::new());
        let (_, mut rx) = relay.register();
        let _task = relay.clone().spawn_settings_forwarder(store.clone());

        store
            .update(SettingsChanged {
                shortcut_key: None,
                debug: Some(true),
            })
            .await
            .unwrap();

        match rx.recv().await {
            Some(PageMessage::SettingsChanged(changed)) => {
                assert_eq!(changed.debug, Some(true));
                assert_eq!(changed.shortcut_key, None);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
