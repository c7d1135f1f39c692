/*!
 * Mount Configuration
 *
 * Settings fixed for the lifetime of one mount.
 */

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::vfs::Owner;

/// Configuration for one mount
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Base URL of the repository, e.g. `https://127.0.0.1:8090`
    pub repo_url: String,

    /// Sent with every request as the `Password` header
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,

    /// How long fetched listings are trusted (default: 20s)
    pub expire_interval: Duration,

    /// Where `searches.txt` and the content cache live; defaults to
    /// `<repository-root>/overhead/UVFS`
    pub state_dir: Option<PathBuf>,

    /// Keep fetched originals on disk under `<state_dir>/cache`
    pub cache_content: bool,

    /// Longest the repository may hold a modification-time poll (default: 119s)
    pub poll_max_delay: Duration,

    /// Pause between polls (default: 200ms)
    pub poll_pause: Duration,

    /// Force a refresh of the top level after this long regardless (default: 1h)
    pub refresh_after: Duration,

    /// Timeout for ordinary repository requests (default: 120s)
    pub http_timeout: Duration,

    /// Accept the self-signed certificates local repositories usually carry
    pub accept_invalid_certs: bool,

    pub uid: u32,
    pub gid: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            repo_url: "https://127.0.0.1:8090".to_string(),
            password: String::new(),
            expire_interval: Duration::from_secs(20),
            state_dir: None,
            cache_content: false,
            poll_max_delay: Duration::from_secs(119),
            poll_pause: Duration::from_millis(200),
            refresh_after: Duration::from_secs(3600),
            http_timeout: Duration::from_secs(120),
            accept_invalid_certs: false,
            uid: nix::unistd::getuid().as_raw(),
            gid: nix::unistd::getgid().as_raw(),
        }
    }
}

impl Config {
    #[must_use]
    pub fn new(repo_url: impl Into<String>) -> Self {
        Self {
            repo_url: repo_url.into(),
            ..Self::default()
        }
    }

    /// Defaults overridden by `UVFS_*` environment variables
    ///
    /// Unparseable numeric values are ignored.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("UVFS_REPO_URL") {
            config.repo_url = url;
        }
        if let Ok(password) = std::env::var("UVFS_PASSWORD") {
            config.password = password;
        }
        if let Ok(dir) = std::env::var("UVFS_STATE_DIR") {
            config.state_dir = Some(PathBuf::from(dir));
        }
        if let Some(secs) = std::env::var("UVFS_EXPIRE_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            config.expire_interval = Duration::from_secs(secs);
        }
        config.cache_content = env_flag("UVFS_CACHE_CONTENT");
        config.accept_invalid_certs = env_flag("UVFS_INSECURE_TLS");
        config
    }

    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    #[must_use]
    pub fn with_expire_interval(mut self, interval: Duration) -> Self {
        self.expire_interval = interval;
        self
    }

    #[must_use]
    pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn with_cache_content(mut self, enabled: bool) -> Self {
        self.cache_content = enabled;
        self
    }

    #[must_use]
    pub fn with_poll_pause(mut self, pause: Duration) -> Self {
        self.poll_pause = pause;
        self
    }

    #[must_use]
    pub fn with_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    #[inline]
    #[must_use]
    pub fn owner(&self) -> Owner {
        Owner {
            uid: self.uid,
            gid: self.gid,
        }
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}
