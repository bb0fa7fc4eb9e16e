use reqwest::Url;
use tracing::{debug, error};

/// Something that can take the user to a song page.
pub trait Navigator: Send + Sync {
    /// Start navigation to `url`.  Completion is not awaited.
    fn navigate(&self, url: &Url);
}

/// Opens URLs in the desktop's default browser (or a configured command).
pub struct SystemBrowser {
    program: String,
    args: Vec<String>,
}

impl SystemBrowser {
    /// `command` overrides the platform opener; it is split on whitespace and
    /// the URL is appended as the last argument.
    pub fn new(command: Option<&str>) -> Self {
        match command.map(str::split_whitespace) {
            Some(mut parts) => match parts.next() {
                Some(program) => Self {
                    program: program.to_string(),
                    args: parts.map(str::to_string).collect(),
                },
                None => Self::platform_default(),
            },
            None => Self::platform_default(),
        }
    }

    fn platform_default() -> Self {
        let (program, args) = songpick_proto::platform::browser_opener();
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

impl Navigator for SystemBrowser {
    fn navigate(&self, url: &Url) {
        debug!("Opening {} with {}", url, self.program);
        let spawned = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .arg(url.as_str())
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn();

        match spawned {
            Ok(mut child) => {
                // Reap the opener so it does not linger as a zombie.
                tokio::spawn(async move {
                    let _ = child.wait().await;
                });
            }
            Err(e) => error!("Failed to launch browser {:?}: {}", self.program, e),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub(crate) struct RecordingNavigator {
        visited: Mutex<Vec<Url>>,
    }

    impl RecordingNavigator {
        pub(crate) fn visited(&self) -> Vec<Url> {
            self.visited.lock().unwrap().clone()
        }
    }

    impl Navigator for RecordingNavigator {
        fn navigate(&self, url: &Url) {
            self.visited.lock().unwrap().push(url.clone());
        }
    }

    #[test]
    fn custom_command_is_split() {
        let browser = SystemBrowser::new(Some("firefox --new-tab"));
        assert_eq!(browser.program, "firefox");
        assert_eq!(browser.args, vec!["--new-tab"]);
    }

    #[test]
    fn blank_command_uses_platform_opener() {
        let browser = SystemBrowser::new(Some("   "));
        let (program, _) = songpick_proto::platform::browser_opener();
        assert_eq!(browser.program, program);
    }
}
