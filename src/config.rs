use clap::Parser;
use std::time::Duration;

// CLI argument structure
#[derive(Parser, Debug, Clone)]
#[command(name = "edge-gatekeeper")]
#[command(about = "Request gatekeeper: rate limits, bot filter, security headers")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, env = "GATE_PORT", default_value_t = 8080)]
    pub port: u16,

    // Page-level API gate: max requests per window, per client IP
    #[arg(long, env = "GATE_API_RATE_LIMIT", default_value_t = 100)]
    pub api_rate_limit: u32,

    // Page-level API gate window in seconds
    #[arg(long, env = "GATE_API_RATE_WINDOW", default_value_t = 3600)]
    pub api_rate_window: u64,

    // Contact form submissions per window
    #[arg(long, env = "GATE_CONTACT_RATE_LIMIT", default_value_t = 5)]
    pub contact_rate_limit: u32,

    #[arg(long, env = "GATE_CONTACT_RATE_WINDOW", default_value_t = 900)]
    pub contact_rate_window: u64,

    // Property inquiry submissions per window
    #[arg(long, env = "GATE_INQUIRY_RATE_LIMIT", default_value_t = 5)]
    pub inquiry_rate_limit: u32,

    #[arg(long, env = "GATE_INQUIRY_RATE_WINDOW", default_value_t = 900)]
    pub inquiry_rate_window: u64,

    // Periodic sweep of expired rate-limit records, seconds (0 = off)
    #[arg(long, env = "GATE_CLEANUP_INTERVAL", default_value_t = 300)]
    pub cleanup_interval: u64,

    // Where browsers should POST CSP violation reports
    #[arg(long, env = "GATE_CSP_REPORT_URI", default_value = "/api/csp-report")]
    pub csp_report_uri: String,

    // tracing EnvFilter directive
    #[arg(long, env = "RUST_LOG", default_value = "edge_gatekeeper=info")]
    pub log_filter: String,
}

/// Limit and window for one protected route family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitSpec {
    pub limit: u32,
    pub window: Duration,
}

impl LimitSpec {
    pub fn new(limit: u32, window_secs: u64) -> anyhow::Result<Self> {
        anyhow::ensure!(limit > 0, "rate limit must be positive");
        anyhow::ensure!(window_secs > 0, "rate window must be positive");
        Ok(Self {
            limit,
            window: Duration::from_secs(window_secs),
        })
    }
}

impl Args {
    pub fn api_limit(&self) -> anyhow::Result<LimitSpec> {
        LimitSpec::new(self.api_rate_limit, self.api_rate_window)
    }

    pub fn contact_limit(&self) -> anyhow::Result<LimitSpec> {
        LimitSpec::new(self.contact_rate_limit, self.contact_rate_window)
    }

    pub fn inquiry_limit(&self) -> anyhow::Result<LimitSpec> {
        LimitSpec::new(self.inquiry_rate_limit, self.inquiry_rate_window)
    }

    pub fn cleanup_interval(&self) -> Option<Duration> {
        (self.cleanup_interval > 0).then(|| Duration::from_secs(self.cleanup_interval))
    }
}
