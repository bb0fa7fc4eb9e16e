use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Frames larger than this are refused before allocating a buffer.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Requests sent from a control surface (CLI) to a running session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd")]
pub enum ControlRequest {
    GetSettings,
    SetShortcutKey { key: String },
    SetDebug { enabled: bool },
    /// Drop every page's favorites cache and playback history.
    ClearCacheAndHistory,
}

/// Replies from the session to the control surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reply")]
pub enum ControlReply {
    Settings { shortcut_key: String, debug: bool },
    /// Number of page contexts that acknowledged the clear command.
    Cleared { pages: usize },
    Error { message: String },
}

/// Settings fields that changed in one store write.  `None` means unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsChanged {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shortcut_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<bool>,
}

impl SettingsChanged {
    pub fn is_empty(&self) -> bool {
        self.shortcut_key.is_none() && self.debug.is_none()
    }
}

/// Wrapper for socket communication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    Request(ControlRequest),
    Reply(ControlReply),
}

impl Message {
    pub fn encode(&self) -> anyhow::Result<Vec<u8>> {
        let json = serde_json::to_vec(self)?;
        if json.len() > MAX_FRAME_LEN {
            anyhow::bail!("Frame of {} bytes exceeds limit", json.len());
        }
        let len = json.len() as u32;
        let mut result = Vec::with_capacity(4 + json.len());
        result.extend_from_slice(&len.to_be_bytes());
        result.extend_from_slice(&json);
        Ok(result)
    }

    pub fn decode(data: &[u8]) -> anyhow::Result<(Self, usize)> {
        if data.len() < 4 {
            anyhow::bail!("Insufficient data for length header");
        }
        let len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if len > MAX_FRAME_LEN {
            anyhow::bail!("Frame of {} bytes exceeds limit", len);
        }
        if data.len() < 4 + len {
            anyhow::bail!("Insufficient data for message");
        }
        let msg: Self = serde_json::from_slice(&data[4..4 + len])?;
        Ok((msg, 4 + len))
    }

    /// Read exactly one frame from `reader`.
    pub async fn read_from<R>(reader: &mut R) -> anyhow::Result<Self>
    where
        R: AsyncRead + Unpin,
    {
        let mut header = [0u8; 4];
        reader.read_exact(&mut header).await?;
        let len = u32::from_be_bytes(header) as usize;
        if len > MAX_FRAME_LEN {
            anyhow::bail!("Frame of {} bytes exceeds limit", len);
        }
        let mut body = vec![0u8; len];
        reader.read_exact(&mut body).await?;
        Ok(serde_json::from_slice(&body)?)
    }
}
