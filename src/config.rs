//! Runner address and timeout configuration.

use std::path::Path;
use std::time::Duration;

/// Default runner port.
pub const DEFAULT_RUNNER_PORT: u16 = 9876;

/// Default timeout for a single runner request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for element discovery, which walks the whole UI.
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(60);

const RESOLV_CONF: &str = "/etc/resolv.conf";

/// Where the runner lives and how long to wait for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Runner host name or IP.
    pub host: String,
    /// Runner port.
    pub port: u16,
    /// Timeout applied to every request unless the tool overrides it.
    pub timeout: Duration,
    /// Timeout for discovery requests.
    pub discovery_timeout: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: DEFAULT_RUNNER_PORT,
            timeout: DEFAULT_TIMEOUT,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
        }
    }
}

impl RunnerConfig {
    /// Build a config, detecting the host when none is given.
    pub fn new(host: Option<String>, port: u16) -> Self {
        let host = host
            .filter(|h| !h.trim().is_empty())
            .unwrap_or_else(detect_host);
        Self {
            host,
            port,
            ..Self::default()
        }
    }

    /// Override the default request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the discovery timeout.
    pub fn with_discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    /// Base URL of the runner, without a trailing slash.
    pub fn base_url(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            // bare IPv6 literal
            format!("http://[{}]:{}", self.host, self.port)
        } else {
            format!("http://{}:{}", self.host, self.port)
        }
    }
}

/// Runner host when none is configured.
///
/// Under WSL2 the Windows host (where the runner usually runs) is the
/// resolver listed in `/etc/resolv.conf`. Everywhere else that file either
/// does not exist or points at a local resolver, so `localhost` is the
/// fallback.
pub fn detect_host() -> String {
    detect_host_from(Path::new(RESOLV_CONF))
}

fn detect_host_from(path: &Path) -> String {
    let host = std::fs::read_to_string(path)
        .ok()
        .and_then(|contents| first_nameserver(&contents));
    match host {
        Some(host) => {
            tracing::debug!(host = %host, "Runner host taken from resolv.conf");
            host
        }
        None => "localhost".into(),
    }
}

/// First `nameserver` address in resolv.conf contents.
pub fn first_nameserver(contents: &str) -> Option<String> {
    contents
        .lines()
        .filter(|line| line.starts_with("nameserver"))
        .find_map(|line| line.split_whitespace().nth(1))
        .map(str::to_owned)
}
