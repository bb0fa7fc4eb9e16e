//! Keyboard shortcut matching.

/// A key press as reported by the host, with browser-style key names
/// (`"r"`, `"="`, `"ArrowUp"`, `"F5"`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyPress {
    pub key: String,
    /// The key without Shift, when the host knows Shift changed it
    /// (`"+"` typed as Shift+`"="` has `unshifted: Some("=")`).
    pub unshifted: Option<String>,
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub meta: bool,
}

#[cfg(test)]
impl KeyPress {
    pub fn plain(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Default::default()
        }
    }

    pub fn shifted(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            shift: true,
            ..Default::default()
        }
    }

    pub fn shifted_from(key: impl Into<String>, unshifted: impl Into<String>) -> Self {
        Self {
            unshifted: Some(unshifted.into()),
            ..Self::shifted(key)
        }
    }
}

/// What currently has keyboard focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusContext {
    Document,
    TextInput,
    TextArea,
    ContentEditable,
}

impl FocusContext {
    pub fn is_text_editing(self) -> bool {
        !matches!(self, FocusContext::Document)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Play,
    /// Drop cache and history, then play.
    ForceRefresh,
}

/// Decide whether `press` fires the shortcut `shortcut`.
///
/// Plain key plays, Shift+key plays with a forced refresh, any Ctrl, Alt or
/// Meta combination is left to the host.  Nothing fires while the user is
/// typing into a text field.
pub fn classify_key(press: &KeyPress, focus: FocusContext, shortcut: &str) -> Option<Trigger> {
    if focus.is_text_editing() || press.ctrl || press.alt || press.meta {
        return None;
    }

    if press.unshifted.as_deref() == Some(shortcut) {
        return Some(Trigger::ForceRefresh);
    }
    if press.key == shortcut {
        // A shortcut that itself needs Shift ("+") is a plain press.
        let refresh = press.shift && press.unshifted.is_none();
        return Some(if refresh { Trigger::ForceRefresh } else { Trigger::Play });
    }
    // Hosts that report Shift+r only as "R".
    let letter_case_only = press.shift
        && press.unshifted.is_none()
        && press.key.chars().count() == 1
        && press.key.to_lowercase() == shortcut;
    letter_case_only.then_some(Trigger::ForceRefresh)
}
