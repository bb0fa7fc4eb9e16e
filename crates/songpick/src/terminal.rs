//! Interactive session: the terminal plays the part of an open favorites
//! page.  Enter is the play button (Shift+Enter refreshes first), the
//! configured shortcut works as on the site, Esc or Ctrl-C leaves.

use std::io::{self, Write};
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::style::Stylize;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use crossterm::{cursor, execute, queue, style, terminal};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::fetcher::FavoritesSource;
use crate::navigator::Navigator;
use crate::orchestrator::PlayOutcome;
use crate::page::{ButtonSlot, PageContext, PageMessage};
use crate::trigger::{FocusContext, KeyPress};

/// Restores the terminal however the session ends.
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> anyhow::Result<Self> {
        enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), cursor::Show);
    }
}

/// The title line above the notification area.
pub struct TerminalButton;

impl TerminalButton {
    /// Reserve the line the button is drawn on.
    pub fn place() -> io::Result<Self> {
        let mut out = io::stdout();
        writeln!(out)?;
        out.flush()?;
        Ok(Self)
    }
}

impl ButtonSlot for TerminalButton {
    fn set_title(&self, title: &str) {
        let mut out = io::stdout();
        let drawn = queue!(
            out,
            cursor::SavePosition,
            cursor::MoveToPreviousLine(1),
            terminal::Clear(terminal::ClearType::CurrentLine),
            style::PrintStyledContent(format!("▶ {}  (Enter to play, Shift+Enter to refresh, Esc to quit)", title).bold()),
            cursor::RestorePosition
        )
        .and_then(|_| out.flush());
        if let Err(e) = drawn {
            warn!("Failed to draw button: {}", e);
        }
    }
}

enum Input {
    Quit,
    /// The button, with `true` for a forced refresh.
    Activate(bool),
    Key(KeyPress),
}

/// Browser-style name for a key, as used for shortcut keys.
pub fn key_name(code: KeyCode) -> Option<String> {
    let name = match code {
        KeyCode::Char(' ') => " ".to_string(),
        KeyCode::Char(c) => c.to_string(),
        KeyCode::F(n) => format!("F{}", n),
        KeyCode::Up => "ArrowUp".to_string(),
        KeyCode::Down => "ArrowDown".to_string(),
        KeyCode::Left => "ArrowLeft".to_string(),
        KeyCode::Right => "ArrowRight".to_string(),
        KeyCode::Home => "Home".to_string(),
        KeyCode::End => "End".to_string(),
        KeyCode::PageUp => "PageUp".to_string(),
        KeyCode::PageDown => "PageDown".to_string(),
        KeyCode::Insert => "Insert".to_string(),
        KeyCode::Delete => "Delete".to_string(),
        KeyCode::Backspace => "Backspace".to_string(),
        _ => return None,
    };
    Some(name)
}

/// The key Shift turned into `c` on a US layout.  Terminals deliver the
/// shifted character, often without the Shift flag.
fn unshifted_char(c: char) -> Option<char> {
    if c.is_ascii_uppercase() {
        return Some(c.to_ascii_lowercase());
    }
    let base = match c {
        '+' => '=',
        '_' => '-',
        '!' => '1',
        '@' => '2',
        '#' => '3',
        '$' => '4',
        '%' => '5',
        '^' => '6',
        '&' => '7',
        '*' => '8',
        '(' => '9',
        ')' => '0',
        '{' => '[',
        '}' => ']',
        '|' => '\\',
        ':' => ';',
        '"' => '\'',
        '<' => ',',
        '>' => '.',
        '?' => '/',
        '~' => '`',
        _ => return None,
    };
    Some(base)
}

fn classify_input(key: KeyEvent) -> Option<Input> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    match key.code {
        KeyCode::Esc => return Some(Input::Quit),
        KeyCode::Char('c') if key.modifiers == KeyModifiers::CONTROL => return Some(Input::Quit),
        KeyCode::Enter if key.modifiers.is_empty() => return Some(Input::Activate(false)),
        KeyCode::Enter if key.modifiers == KeyModifiers::SHIFT => return Some(Input::Activate(true)),
        _ => {}
    }
    let unshifted = match key.code {
        KeyCode::Char(c) => unshifted_char(c).map(String::from),
        _ => None,
    };
    let press = KeyPress {
        key: key_name(key.code)?,
        shift: key.modifiers.contains(KeyModifiers::SHIFT) || unshifted.is_some(),
        unshifted,
        ctrl: key.modifiers.contains(KeyModifiers::CONTROL),
        alt: key.modifiers.contains(KeyModifiers::ALT),
        meta: key.modifiers.intersects(KeyModifiers::SUPER | KeyModifiers::META),
    };
    Some(Input::Key(press))
}

fn spawn_key_reader() -> mpsc::Receiver<KeyEvent> {
    let (tx, rx) = mpsc::channel(64);
    tokio::task::spawn_blocking(move || {
        // Poll so the thread notices the session has ended.
        while !tx.is_closed() {
            match event::poll(Duration::from_millis(200)) {
                Ok(false) => continue,
                Ok(true) => {}
                Err(_) => break,
            }
            match event::read() {
                Ok(Event::Key(key)) => {
                    if tx.blocking_send(key).is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }
    });
    rx
}

/// Run until the user quits.  Relay messages are handled between plays.
pub async fn run<S, N>(
    page: &PageContext<S, N>,
    mut messages: mpsc::Receiver<PageMessage>,
) -> anyhow::Result<()>
where
    S: FavoritesSource,
    N: Navigator,
{
    let _guard = RawModeGuard::enable()?;
    let mut keys = spawn_key_reader();
    info!("Interactive session started");

    loop {
        tokio::select! {
            key = keys.recv() => {
                let Some(key) = key else { break };
                let outcome = match classify_input(key) {
                    Some(Input::Quit) => break,
                    Some(Input::Activate(refresh)) => Some(page.activate(refresh).await),
                    Some(Input::Key(press)) => page.handle_key(&press, FocusContext::Document).await,
                    None => None,
                };
                if let Some(PlayOutcome::Navigating { url, loading }) = outcome {
                    // The terminal stays open after the browser takes over.
                    loading.dismiss();
                    page.orchestrator().presenter().info(format!("Opened {}", url));
                    info!("Opened {}", url);
                }
            }
            msg = messages.recv() => {
                match msg {
                    Some(msg) => page.handle_message(msg),
                    None => {
                        debug!("Relay closed");
                        break;
                    }
                }
            }
        }
    }

    info!("Interactive session ended");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigger::{classify_key, Trigger};

    fn press(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, modifiers)
    }

    #[test]
    fn named_keys_follow_browser_names() {
        assert_eq!(key_name(KeyCode::Char('=')).as_deref(), Some("="));
        assert_eq!(key_name(KeyCode::F(9)).as_deref(), Some("F9"));
        assert_eq!(key_name(KeyCode::Up).as_deref(), Some("ArrowUp"));
        assert_eq!(key_name(KeyCode::Tab), None);
    }

    #[test]
    fn control_keys_end_or_activate() {
        assert!(matches!(
            classify_input(press(KeyCode::Esc, KeyModifiers::NONE)),
            Some(Input::Quit)
        ));
        assert!(matches!(
            classify_input(press(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            Some(Input::Quit)
        ));
        assert!(matches!(
            classify_input(press(KeyCode::Enter, KeyModifiers::NONE)),
            Some(Input::Activate(false))
        ));
        assert!(matches!(
            classify_input(press(KeyCode::Enter, KeyModifiers::SHIFT)),
            Some(Input::Activate(true))
        ));
    }

    #[test]
    fn modifiers_are_carried() {
        let Some(Input::Key(key)) = classify_input(press(KeyCode::Char('R'), KeyModifiers::SHIFT))
        else {
            panic!("expected a key press");
        };
        assert_eq!(key.key, "R");
        assert_eq!(key.unshifted.as_deref(), Some("r"));
        assert!(key.shift && !key.ctrl && !key.alt && !key.meta);

        let Some(Input::Key(key)) = classify_input(press(KeyCode::Char('r'), KeyModifiers::ALT))
        else {
            panic!("expected a key press");
        };
        assert!(key.alt);
    }

    #[test]
    fn shifted_symbols_refresh_their_base_shortcut() {
        // Most terminals send "+" with no Shift flag at all.
        for modifiers in [KeyModifiers::NONE, KeyModifiers::SHIFT] {
            let Some(Input::Key(key)) = classify_input(press(KeyCode::Char('+'), modifiers))
            else {
                panic!("expected a key press");
            };
            assert_eq!(key.unshifted.as_deref(), Some("="));
            assert!(key.shift);
            assert_eq!(
                classify_key(&key, FocusContext::Document, "="),
                Some(Trigger::ForceRefresh)
            );
            assert_eq!(classify_key(&key, FocusContext::Document, "+"), Some(Trigger::Play));
        }

        let Some(Input::Key(key)) = classify_input(press(KeyCode::Char('='), KeyModifiers::NONE))
        else {
            panic!("expected a key press");
        };
        assert_eq!(key.unshifted, None);
        assert_eq!(classify_key(&key, FocusContext::Document, "="), Some(Trigger::Play));
    }

    #[test]
    fn releases_are_ignored() {
        let mut release = press(KeyCode::Char('='), KeyModifiers::NONE);
        release.kind = KeyEventKind::Release;
        assert!(classify_input(release).is_none());
    }
}
