use once_cell::sync::Lazy;

/// Address the HTTP server should bind to. Defaults to `0.0.0.0`.
pub static BIND_ADDRESS: Lazy<String> =
    Lazy::new(|| std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0".to_string()));

/// Port the HTTP server should listen on. Defaults to `3000`.
pub static BIND_PORT: Lazy<u16> = Lazy::new(|| {
    std::env::var("BIND_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(3000)
});

/// When set to a truthy value, allows the application to continue running even if database
/// migrations fail. Defaults to `false`.
pub static ALLOW_MIGRATION_FAILURE: Lazy<bool> = Lazy::new(|| {
    std::env::var("ALLOW_MIGRATION_FAILURE")
        .ok()
        .map(|value| {
            let normalized = value.trim().to_ascii_lowercase();
            matches!(normalized.as_str(), "1" | "true" | "yes")
        })
        .unwrap_or(false)
});

/// Base URL used to contact the external tax-calculation processor.
pub static PROCESSOR_ENDPOINT: Lazy<String> = Lazy::new(|| {
    std::env::var("PROCESSOR_ENDPOINT")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| "http://127.0.0.1:8700".to_string())
});

/// Optional bearer token presented to the processor.
pub static PROCESSOR_TOKEN: Lazy<Option<String>> =
    Lazy::new(|| read_optional_env("PROCESSOR_TOKEN"));

/// Request timeout for processor calls, in seconds. A timed-out calculation is
/// treated as a failed processor call, never as success.
pub static PROCESSOR_TIMEOUT_SECS: Lazy<u64> = Lazy::new(|| {
    std::env::var("PROCESSOR_TIMEOUT_SECS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(120)
});

/// Optional Slack incoming-webhook URL for operator notifications.
pub static SLACK_WEBHOOK_URL: Lazy<Option<String>> =
    Lazy::new(|| read_optional_env("SLACK_WEBHOOK_URL"));

/// Optional email-gateway webhook URL for operator notifications.
pub static EMAIL_WEBHOOK_URL: Lazy<Option<String>> =
    Lazy::new(|| read_optional_env("EMAIL_WEBHOOK_URL"));

/// Depth of the notification queue before events are dropped with a warning.
pub static NOTIFY_QUEUE_DEPTH: Lazy<usize> = Lazy::new(|| {
    std::env::var("NOTIFY_QUEUE_DEPTH")
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(64)
});

fn read_optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
