//! Control socket: lets `songpick settings …` and `songpick clear` reach a
//! running session.

use std::sync::Arc;

use anyhow::Context;
use songpick_proto::protocol::{ControlReply, ControlRequest, Message, SettingsChanged};
use songpick_proto::settings::{validate_shortcut_key, SettingsStore};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::relay::BroadcastRelay;

/// Apply one control request.  Without a relay (no session running) clear
/// requests reach no page.
pub async fn handle_request(
    store: &SettingsStore,
    relay: Option<&BroadcastRelay>,
    request: ControlRequest,
) -> ControlReply {
    match request {
        ControlRequest::GetSettings => settings_reply(store).await,
        ControlRequest::SetShortcutKey { key } => {
            let key = match validate_shortcut_key(&key) {
                Ok(key) => key,
                Err(e) => return ControlReply::Error { message: e.to_string() },
            };
            update(store, SettingsChanged { shortcut_key: Some(key), debug: None }).await
        }
        ControlRequest::SetDebug { enabled } => {
            update(store, SettingsChanged { shortcut_key: None, debug: Some(enabled) }).await
        }
        ControlRequest::ClearCacheAndHistory => {
            let pages = match relay {
                Some(relay) => relay.clear_all().await,
                None => 0,
            };
            ControlReply::Cleared { pages }
        }
    }
}

async fn update(store: &SettingsStore, patch: SettingsChanged) -> ControlReply {
    match store.update(patch).await {
        Ok(_) => settings_reply(store).await,
        Err(e) => ControlReply::Error { message: e.to_string() },
    }
}

async fn settings_reply(store: &SettingsStore) -> ControlReply {
    let settings = store.get().await;
    ControlReply::Settings {
        shortcut_key: settings.shortcut_key,
        debug: settings.debug,
    }
}

/// Bind the control socket.  Split from `serve` so callers learn about a
/// busy port before spawning anything.
pub async fn bind(addr: &str) -> anyhow::Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind control socket {}", addr))
}

pub fn serve(
    listener: TcpListener,
    store: Arc<SettingsStore>,
    relay: Arc<BroadcastRelay>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if let Ok(addr) = listener.local_addr() {
            info!("Control socket listening at {}", addr);
        }

        let mut client_id = 0usize;
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    client_id += 1;
                    let id = client_id;
                    debug!("Control client {} connected from {}", id, peer);

                    let store = store.clone();
                    let relay = relay.clone();
                    tokio::spawn(async move {
                        handle_client(stream, id, &store, &relay).await;
                        debug!("Control client {} disconnected", id);
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    })
}

async fn handle_client(
    stream: TcpStream,
    client_id: usize,
    store: &SettingsStore,
    relay: &BroadcastRelay,
) {
    let (mut read_half, mut write_half) = stream.into_split();
    let mut tmp = [0u8; 4096];
    let mut read_buf: Vec<u8> = Vec::new();

    loop {
        match read_half.read(&mut tmp).await {
            Ok(0) => break,
            Ok(n) => {
                read_buf.extend_from_slice(&tmp[..n]);

                loop {
                    if read_buf.len() < 4 {
                        break;
                    }
                    let reply = match Message::decode(&read_buf) {
                        Ok((Message::Request(request), consumed)) => {
                            read_buf.drain(..consumed);
                            info!("Control client {} sent: {:?}", client_id, request);
                            handle_request(store, Some(relay), request).await
                        }
                        Ok((Message::Reply(_), consumed)) => {
                            read_buf.drain(..consumed);
                            continue;
                        }
                        // Incomplete frame: wait for more bytes.
                        Err(_) if !frame_is_bad(&read_buf) => break,
                        Err(e) => {
                            warn!("Control client {} sent a bad frame: {}", client_id, e);
                            return;
                        }
                    };

                    match Message::Reply(reply).encode() {
                        Ok(encoded) => {
                            if write_half.write_all(&encoded).await.is_err() {
                                return;
                            }
                        }
                        Err(e) => error!("Failed to encode reply: {}", e),
                    }
                }
            }
            Err(e) => {
                error!("Read error from control client {}: {}", client_id, e);
                break;
            }
        }
    }
}

/// True when `buf` holds a complete frame that still failed to decode, or a
/// header announcing an oversized one.
fn frame_is_bad(buf: &[u8]) -> bool {
    let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    len > songpick_proto::protocol::MAX_FRAME_LEN || buf.len() >= 4 + len
}

/// Send one request to the session at `addr` and wait for its reply.
pub async fn request(addr: &str, request: ControlRequest) -> anyhow::Result<ControlReply> {
    let mut stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("No session listening at {}", addr))?;
    stream.write_all(&Message::Request(request).encode()?).await?;

    match Message::read_from(&mut stream).await? {
        Message::Reply(reply) => Ok(reply),
        Message::Request(other) => anyhow::bail!("Unexpected request from session: {:?}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use songpick_proto::settings::Settings;

    fn store() -> SettingsStore {
        SettingsStore::in_memory(Settings::default())
    }

    #[tokio::test]
    async fn invalid_key_is_rejected_and_store_untouched() {
        let store = store();
        for key in ["", "Shift", "Escape", "this-key-name-is-way-too-long"] {
            let reply = handle_request(
                &store,
                None,
                ControlRequest::SetShortcutKey { key: key.to_string() },
            )
            .await;
            assert!(matches!(reply, ControlReply::Error { .. }), "{key:?}: {reply:?}");
        }
        assert_eq!(store.get().await, Settings::default());
    }

    #[tokio::test]
    async fn set_requests_reply_with_new_settings() {
        let store = store();
        let reply = handle_request(
            &store,
            None,
            ControlRequest::SetShortcutKey { key: "r".to_string() },
        )
        .await;
        assert_eq!(
            reply,
            ControlReply::Settings { shortcut_key: "r".to_string(), debug: false }
        );

        let reply = handle_request(&store, None, ControlRequest::SetDebug { enabled: true }).await;
        assert_eq!(
            reply,
            ControlReply::Settings { shortcut_key: "r".to_string(), debug: true }
        );
    }

    #[tokio::test]
    async fn upper_case_letter_is_stored_lower_case() {
        let store = store();
        let reply = handle_request(
            &store,
            None,
            ControlRequest::SetShortcutKey { key: "R".to_string() },
        )
        .await;
        assert_eq!(
            reply,
            ControlReply::Settings { shortcut_key: "r".to_string(), debug: false }
        );
        assert_eq!(store.get().await.shortcut_key, "r");
    }

    #[tokio::test]
    async fn clear_without_session_reaches_nobody() {
        let reply = handle_request(&store(), None, ControlRequest::ClearCacheAndHistory).await;
        assert_eq!(reply, ControlReply::Cleared { pages: 0 });
    }

    #[test]
    fn partial_frames_are_not_bad() {
        let frame = Message::Request(ControlRequest::GetSettings).encode().unwrap();
        assert!(!frame_is_bad(&frame[..frame.len() - 1]));
        let mut garbage = 3u32.to_be_bytes().to_vec();
        garbage.extend_from_slice(b"{{{");
        assert!(frame_is_bad(&garbage));
        assert!(frame_is_bad(&u32::MAX.to_be_bytes()));
    }

    #[tokio::test]
    async fn loopback_round_trip() {
        let store = Arc::new(store());
        let relay = Arc::new(BroadcastRelay::new());
        let (_, mut page) = relay.register();
        tokio::spawn(async move {
            while let Some(msg) = page.recv().await {
                if let crate::page::PageMessage::ClearCacheAndHistory { ack } = msg {
                    let _ = ack.send(());
                }
            }
        });

        let listener = bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let server = serve(listener, store.clone(), relay);

        let reply = request(&addr, ControlRequest::SetDebug { enabled: true })
            .await
            .unwrap();
        assert_eq!(
            reply,
            ControlReply::Settings { shortcut_key: "=".to_string(), debug: true }
        );
        assert!(store.get().await.debug);

        let reply = request(&addr, ControlRequest::ClearCacheAndHistory).await.unwrap();
        assert_eq!(reply, ControlReply::Cleared { pages: 1 });

        server.abort();
    }
}
