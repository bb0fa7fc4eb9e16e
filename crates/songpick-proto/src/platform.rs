use std::path::PathBuf;

pub const CONTROL_TCP_PORT: u16 = 9797;

pub fn data_dir() -> PathBuf {
    // On macOS and Linux, use ~/.local/share/songpick/ (XDG standard)
    // instead of macOS Application Support for consistency
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".local")
            .join("share")
            .join("songpick")
    }
    #[cfg(windows)]
    {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("songpick")
    }
}

pub fn config_dir() -> PathBuf {
    // On Windows, check for portable config.toml in executable directory first
    #[cfg(windows)]
    {
        if let Ok(exe_path) = std::env::current_exe() {
            if let Some(exe_dir) = exe_path.parent() {
                let portable_config = exe_dir.join("config.toml");
                if portable_config.exists() {
                    return exe_dir.to_path_buf();
                }
            }
        }
    }

    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("songpick")
    }

    #[cfg(windows)]
    {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("songpick")
    }
}

/// Program plus leading arguments that hand a URL to the desktop's default
/// browser.  The URL is appended as the final argument.
#[cfg(target_os = "linux")]
pub fn browser_opener() -> (&'static str, &'static [&'static str]) {
    ("xdg-open", &[])
}

#[cfg(target_os = "macos")]
pub fn browser_opener() -> (&'static str, &'static [&'static str]) {
    ("open", &[])
}

#[cfg(windows)]
pub fn browser_opener() -> (&'static str, &'static [&'static str]) {
    // The empty string is the window title `start` expects before the target.
    ("cmd", &["/C", "start", ""])
}

#[cfg(not(any(target_os = "linux", target_os = "macos", windows)))]
pub fn browser_opener() -> (&'static str, &'static [&'static str]) {
    ("xdg-open", &[])
}
