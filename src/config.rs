use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Engine configuration, read from the environment once at startup and
/// handed down explicitly. Nothing in the engine reaches for a global.
#[derive(Debug, Clone)]
pub struct Config {
    pub provider_base_url: String,
    pub provider_token: String,
    pub provider_timeout: Duration,
    /// Endpoint a socks5 probe must complete one round trip to.
    pub check_url: String,
    pub probe_timeout: Duration,
    pub probe_concurrency: usize,
    pub pptp_port: u16,
    pub sync_interval: Duration,
    pub refund_sweep_interval: Duration,
    /// How long after purchase a dead proxy still earns its money back.
    pub refund_window_minutes: i64,
    pub sync_page_size: i64,
    /// Upper bound on pages walked per sync, in case the upstream total
    /// lies.
    pub sync_page_cap: u32,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            provider_base_url: env::var("HAWKER_PROVIDER_URL")
                .unwrap_or("https://api.proxy-market.example".into()),
            provider_token: env::var("HAWKER_PROVIDER_TOKEN").unwrap_or_default(),
            provider_timeout: Duration::from_secs(var_or("HAWKER_PROVIDER_TIMEOUT_SECS", 15)),
            check_url: env::var("HAWKER_CHECK_URL").unwrap_or("http://httpbin.org/ip".into()),
            probe_timeout: Duration::from_secs(var_or("HAWKER_PROBE_TIMEOUT_SECS", 10)),
            probe_concurrency: var_or("HAWKER_PROBE_CONCURRENCY", 50),
            pptp_port: var_or("HAWKER_PPTP_PORT", 1723),
            sync_interval: Duration::from_secs(var_or("HAWKER_SYNC_INTERVAL_SECS", 300)),
            refund_sweep_interval: Duration::from_secs(var_or(
                "HAWKER_REFUND_SWEEP_INTERVAL_SECS",
                60,
            )),
            refund_window_minutes: var_or("HAWKER_REFUND_WINDOW_MINUTES", 60),
            sync_page_size: var_or("HAWKER_SYNC_PAGE_SIZE", 100),
            sync_page_cap: var_or("HAWKER_SYNC_PAGE_CAP", 50),
        }
    }
}

fn var_or<T: FromStr>(key: &'static str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|_| panic!("Invalid value for {}", key)),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Config::from_env();
        assert_eq!(cfg.probe_concurrency, 50);
        assert_eq!(cfg.pptp_port, 1723);
        assert_eq!(cfg.sync_interval, Duration::from_secs(300));
        assert_eq!(cfg.refund_sweep_interval, Duration::from_secs(60));
        assert_eq!(cfg.refund_window_minutes, 60);
        assert_eq!(cfg.sync_page_cap, 50);
    }
}
