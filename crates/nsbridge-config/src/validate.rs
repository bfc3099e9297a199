use crate::config::Config;
use crate::error::ConfigError;

/// Longest attach grace period accepted, in milliseconds.
const MAX_ATTACH_GRACE_MS: u64 = 60_000;

/// Validate a [`Config`], returning every violation found.
pub fn validate(config: &Config) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut reject = |field: &str, message: String| {
        errors.push(ConfigError::Validation {
            field: field.to_string(),
            message,
        });
    };

    if config.cli.tool.trim().is_empty() {
        reject("cli.tool", "must not be empty".to_string());
    }

    if config.ios.debug_port == 0 {
        reject("ios.debug_port", "must be non-zero".to_string());
    }

    if config.ios.attach_grace_ms > MAX_ATTACH_GRACE_MS {
        reject(
            "ios.attach_grace_ms",
            format!(
                "must be at most {MAX_ATTACH_GRACE_MS}, got {}",
                config.ios.attach_grace_ms
            ),
        );
    }

    for (field, phrase) in [
        ("ios.proxy_ready_phrase", &config.ios.proxy_ready_phrase),
        ("ios.cli_ready_phrase", &config.ios.cli_ready_phrase),
        ("ios.backend_ready_phrase", &config.ios.backend_ready_phrase),
        (
            "android.debugger_started_phrase",
            &config.android.debugger_started_phrase,
        ),
    ] {
        // An empty phrase is contained in every line and would fire on noise.
        if phrase.is_empty() {
            reject(field, "must not be empty".to_string());
        }
    }

    if config.android.port_discovery_timeout_ms == Some(0) {
        reject(
            "android.port_discovery_timeout_ms",
            "must be positive when set".to_string(),
        );
    }

    if config.adapter.remote_root.is_empty() {
        reject("adapter.remote_root", "must not be empty".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
