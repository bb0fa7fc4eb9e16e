//! Transient user-facing notifications: loading, success, error, info.
//!
//! `NotificationPresenter::present` shows a message through a
//! `NotificationSink` and returns a `NotificationHandle`.  A positive duration
//! schedules automatic dismissal on the tokio timer; a zero duration keeps the
//! notification up until `dismiss()` is called (used for the loading state of
//! an in-flight request).  Dismissal is one-way and idempotent.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use crossterm::style::{Color, Stylize};
use crossterm::{cursor, queue, style, terminal};
use tokio::task::AbortHandle;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Info,
    Success,
    Error,
    Loading,
}

impl NotificationKind {
    fn color(self) -> Color {
        match self {
            NotificationKind::Info => Color::Blue,
            NotificationKind::Success => Color::Green,
            NotificationKind::Error => Color::Red,
            NotificationKind::Loading => Color::DarkYellow,
        }
    }

    fn icon(self) -> &'static str {
        match self {
            NotificationKind::Info => "·",
            NotificationKind::Success => "✓",
            NotificationKind::Error => "✗",
            NotificationKind::Loading => "…",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: u64,
    pub message: String,
    pub kind: NotificationKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationState {
    Active,
    Dismissed,
}

/// Where notifications are drawn.
pub trait NotificationSink: Send + Sync + 'static {
    /// One-time setup of shared styling.  Called at most once per presenter.
    fn install_styles(&self) {}
    fn show(&self, notification: &Notification);
    fn hide(&self, id: u64);
}

struct Shared {
    id: u64,
    dismissed: AtomicBool,
    sink: Arc<dyn NotificationSink>,
}

impl Shared {
    fn dismiss(&self) {
        if !self.dismissed.swap(true, Ordering::SeqCst) {
            self.sink.hide(self.id);
        }
    }
}

/// One displayed notification.  Dropping the handle leaves the notification
/// up; only `dismiss()` or its timer takes it down.
pub struct NotificationHandle {
    shared: Arc<Shared>,
    timer: Mutex<Option<AbortHandle>>,
}

impl NotificationHandle {
    #[cfg(test)]
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn state(&self) -> NotificationState {
        if self.shared.dismissed.load(Ordering::SeqCst) {
            NotificationState::Dismissed
        } else {
            NotificationState::Active
        }
    }

    #[cfg(test)]
    pub fn is_dismissed(&self) -> bool {
        self.state() == NotificationState::Dismissed
    }

    /// Cancel any pending auto-dismiss and take the notification down.
    /// Safe to call any number of times.
    pub fn dismiss(&self) {
        let timer = self.timer.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(timer) = timer {
            timer.abort();
        }
        self.shared.dismiss();
    }
}

impl std::fmt::Debug for NotificationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationHandle")
            .field("id", &self.shared.id)
            .field("state", &self.state())
            .finish()
    }
}

pub struct NotificationPresenter {
    sink: Arc<dyn NotificationSink>,
    styles: Once,
    next_id: AtomicU64,
    default_duration_ms: u64,
}

impl NotificationPresenter {
    pub fn new(sink: Arc<dyn NotificationSink>, default_duration_ms: u64) -> Self {
        Self {
            sink,
            styles: Once::new(),
            next_id: AtomicU64::new(1),
            default_duration_ms,
        }
    }

    /// Show `message`.  `duration_ms == 0` disables automatic dismissal.
    /// Must be called from within a tokio runtime when `duration_ms > 0`.
    pub fn present(
        &self,
        message: impl Into<String>,
        kind: NotificationKind,
        duration_ms: u64,
    ) -> NotificationHandle {
        self.styles.call_once(|| self.sink.install_styles());

        let notification = Notification {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            message: message.into(),
            kind,
        };
        self.sink.show(&notification);

        let shared = Arc::new(Shared {
            id: notification.id,
            dismissed: AtomicBool::new(false),
            sink: Arc::clone(&self.sink),
        });

        let timer = (duration_ms > 0).then(|| {
            let shared = Arc::clone(&shared);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(duration_ms)).await;
                shared.dismiss();
            })
            .abort_handle()
        });

        NotificationHandle {
            shared,
            timer: Mutex::new(timer),
        }
    }

    pub fn info(&self, message: impl Into<String>) -> NotificationHandle {
        self.present(message, NotificationKind::Info, self.default_duration_ms)
    }

    pub fn success(&self, message: impl Into<String>) -> NotificationHandle {
        self.present(message, NotificationKind::Success, self.default_duration_ms)
    }

    pub fn error(&self, message: impl Into<String>) -> NotificationHandle {
        self.present(message, NotificationKind::Error, self.default_duration_ms)
    }

    /// A loading notification stays up until dismissed.
    pub fn loading(&self, message: impl Into<String>) -> NotificationHandle {
        self.present(message, NotificationKind::Loading, 0)
    }
}

/// Draws active notifications as a block of lines below the cursor,
/// newest last, redrawing the whole block on every change.
#[derive(Default)]
pub struct TerminalSink {
    active: Mutex<Vec<Notification>>,
}

impl TerminalSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn redraw(&self, active: &[Notification]) {
        if let Err(e) = Self::draw(active) {
            warn!("Failed to draw notifications: {}", e);
        }
    }

    fn draw(active: &[Notification]) -> io::Result<()> {
        let mut out = io::stdout();
        queue!(
            out,
            cursor::SavePosition,
            cursor::MoveToColumn(0),
            terminal::Clear(terminal::ClearType::FromCursorDown)
        )?;
        for n in active {
            let mut text = format!(" {} {} ", n.kind.icon(), n.message);
            if n.kind == NotificationKind::Loading {
                text.push_str("⏳ ");
            }
            queue!(
                out,
                style::PrintStyledContent(text.with(n.kind.color()).bold()),
                style::Print("\r\n")
            )?;
        }
        queue!(out, cursor::RestorePosition)?;
        out.flush()
    }
}

impl NotificationSink for TerminalSink {
    fn install_styles(&self) {
        let mut out = io::stdout();
        if let Err(e) = queue!(out, cursor::Hide).and_then(|_| out.flush()) {
            warn!("Failed to prepare terminal for notifications: {}", e);
        }
    }

    fn show(&self, notification: &Notification) {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        active.push(notification.clone());
        self.redraw(&active);
    }

    fn hide(&self, id: u64) {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        active.retain(|n| n.id != id);
        self.redraw(&active);
    }
}

/// Prints each notification once, for one-shot commands.  Hiding is a no-op.
pub struct StderrSink;

impl NotificationSink for StderrSink {
    fn show(&self, notification: &Notification) {
        eprintln!(
            "{} {}",
            notification.kind.icon().with(notification.kind.color()),
            notification.message
        );
    }

    fn hide(&self, _id: u64) {}
}
