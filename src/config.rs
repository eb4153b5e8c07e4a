/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub reveal: RevealConfig,
}

/// Timing for the one-by-one answer reveal. There is no per-answer
/// timeout: the sequence only moves when the host steps it, and stalls
/// until the host returns.
#[derive(Debug, Clone)]
pub struct RevealConfig {
    /// Delay between entering the reveal sequence and showing the first
    /// answer, so all clients can sync to the broadcast start time.
    pub start_delay_ms: u64,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let port = std::env::var("STRAIGHTFACE_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3001);

        Self {
            port,
            reveal: RevealConfig::from_env(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3001,
            reveal: RevealConfig::default(),
        }
    }
}

impl RevealConfig {
    pub fn from_env() -> Self {
        let start_delay_ms = std::env::var("STRAIGHTFACE_REVEAL_DELAY_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3000);

        Self { start_delay_ms }
    }
}

impl Default for RevealConfig {
    fn default() -> Self {
        Self {
            start_delay_ms: 3000,
        }
    }
}
