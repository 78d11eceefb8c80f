//! Metrics emitted through the `metrics` facade
//!
//! Nothing is recorded unless the application installs a recorder.

/// Label values
pub mod labels {
    /// Cleartext password authentication
    pub const MECHANISM_CLEARTEXT: &str = "cleartext";
    /// MD5 authentication, always refused
    pub const MECHANISM_MD5: &str = "md5";
    /// SCRAM-SHA-256 authentication
    pub const MECHANISM_SCRAM: &str = "scram-sha-256";
    /// Trust / no password exchange
    pub const MECHANISM_NONE: &str = "none";
}

/// Counters
pub mod counters {
    use metrics::counter;

    /// A new server connection completed startup
    pub fn connection_opened() {
        counter!("pgready_connections_opened_total").increment(1);
    }

    /// Establishing a server connection failed
    pub fn connection_failed(reason: &'static str) {
        counter!("pgready_connections_failed_total", "reason" => reason).increment(1);
    }

    /// A pooled connection was dropped instead of being returned idle
    pub fn connection_discarded() {
        counter!("pgready_connections_discarded_total").increment(1);
    }

    /// Authentication was attempted with the given mechanism
    pub fn auth_attempted(mechanism: &'static str) {
        counter!("pgready_auth_attempted_total", "mechanism" => mechanism).increment(1);
    }

    /// Authentication succeeded
    pub fn auth_successful(mechanism: &'static str) {
        counter!("pgready_auth_successful_total", "mechanism" => mechanism).increment(1);
    }

    /// Authentication failed
    pub fn auth_failed(mechanism: &'static str) {
        counter!("pgready_auth_failed_total", "mechanism" => mechanism).increment(1);
    }

    /// A startup validation finished
    pub fn validation_completed(outcome: &'static str) {
        counter!("pgready_validations_total", "outcome" => outcome).increment(1);
    }

    /// `open_pool` finished
    pub fn pool_opened(outcome: &'static str, lazy: bool) {
        let mode = if lazy { "lazy" } else { "eager" };
        counter!("pgready_pools_opened_total", "outcome" => outcome, "mode" => mode).increment(1);
    }
}

/// Histograms
pub mod histograms {
    use metrics::histogram;

    /// Time spent waiting for a pool slot, in milliseconds
    pub fn acquire_wait(millis: u64) {
        histogram!("pgready_acquire_wait_ms").record(millis as f64);
    }

    /// Time spent in startup (transport + auth), in milliseconds
    pub fn startup_duration(millis: u64) {
        histogram!("pgready_startup_duration_ms").record(millis as f64);
    }
}
