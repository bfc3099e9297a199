use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::ConfigError;
use crate::merge::merge_configs;
use crate::validate::validate;

/// Written into a freshly created global config file.
const DEFAULT_CONFIG_CONTENT: &str = r#"# nsbridge configuration
# Uncomment and edit settings below to override defaults.

# [cli]
# tool = "tns"

# [cli.env]
# ANDROID_HOME = "/opt/android-sdk"

# [ios]
# debug_port = 18181
# attach_grace_ms = 1500

# [android]
# port_discovery_timeout_ms = 30000
# launch_settle_ms = 500

# [adapter]
# target_lines_start_at1 = false
# remote_root = "file:///app/"

# [log]
# level = "info"
"#;

/// Name of the per-project override directory.
const PROJECT_DIR_NAME: &str = ".nsbridge";

/// Load and merge configuration.
///
/// 1. Reads `config_dir/config.toml`, creating it with commented-out
///    defaults when missing.
/// 2. Looks for `.nsbridge/config.toml` walking upward from `project_dir`.
/// 3. Merges `Config::default() <- global <- project` and validates.
///
/// # Errors
///
/// Returns [`ConfigError`] on I/O, parse, or validation failure.
pub fn load_config(config_dir: &Path, project_dir: Option<&Path>) -> Result<Config, ConfigError> {
    let global_path = config_dir.join("config.toml");

    if !config_dir.exists() {
        std::fs::create_dir_all(config_dir)?;
    }

    if !global_path.exists() {
        std::fs::write(&global_path, DEFAULT_CONFIG_CONTENT).map_err(|e| {
            ConfigError::CreateDefault {
                path: global_path.clone(),
                reason: e.to_string(),
            }
        })?;
        tracing::info!("created default config at {}", global_path.display());
    }

    let mut config = Config::default();

    let global_content = std::fs::read_to_string(&global_path)?;
    if has_non_comment_content(&global_content) {
        config = merge_configs(&config, &global_content)?;
    }

    if let Some(project_path) = project_dir.and_then(find_project_config) {
        tracing::debug!("merging project config {}", project_path.display());
        let project_content = std::fs::read_to_string(&project_path)?;
        config = merge_configs(&config, &project_content)?;
    }

    first_violation(&config)?;
    Ok(config)
}

/// Parse a TOML string directly into a validated [`Config`].
///
/// # Errors
///
/// Returns [`ConfigError`] on parse or validation failure.
pub fn load_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;
    first_violation(&config)?;
    Ok(config)
}

fn first_violation(config: &Config) -> Result<(), ConfigError> {
    validate(config).map_err(|errors| {
        errors
            .into_iter()
            .next()
            .unwrap_or_else(|| ConfigError::Validation {
                field: "unknown".to_string(),
                message: "validation failed".to_string(),
            })
    })
}

/// Walk from `start` upward looking for `.nsbridge/config.toml`.
fn find_project_config(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(PROJECT_DIR_NAME).join("config.toml"))
        .find(|candidate| candidate.exists())
}

fn has_non_comment_content(content: &str) -> bool {
    content.lines().any(|l| {
        let trimmed = l.trim();
        !trimmed.is_empty() && !trimmed.starts_with('#')
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn creates_default_when_missing() {
        let tmp = TempDir::new().unwrap();
        let cfg_dir = tmp.path().join("config");

        let config = load_config(&cfg_dir, None).unwrap();
        assert_eq!(config, Config::default());
        assert!(cfg_dir.join("config.toml").exists());
    }

    #[test]
    fn reads_existing_global() {
        let tmp = TempDir::new().unwrap();
        let cfg_dir = tmp.path().join("config");
        std::fs::create_dir_all(&cfg_dir).unwrap();
        std::fs::write(cfg_dir.join("config.toml"), "[cli]\ntool = \"ns\"\n").unwrap();

        let config = load_config(&cfg_dir, None).unwrap();
        assert_eq!(config.cli.tool, "ns");
        assert_eq!(config.ios.debug_port, 18181);
    }

    #[test]
    fn project_overrides_global() {
        let tmp = TempDir::new().unwrap();
        let cfg_dir = tmp.path().join("config");
        std::fs::create_dir_all(&cfg_dir).unwrap();
        std::fs::write(cfg_dir.join("config.toml"), "[ios]\nattach_grace_ms = 2000\n").unwrap();

        let app_root = tmp.path().join("app");
        let override_dir = app_root.join(PROJECT_DIR_NAME);
        std::fs::create_dir_all(&override_dir).unwrap();
        std::fs::write(override_dir.join("config.toml"), "[ios]\nattach_grace_ms = 250\n").unwrap();

        let config = load_config(&cfg_dir, Some(&app_root)).unwrap();
        assert_eq!(config.ios.attach_grace_ms, 250);
    }

    #[test]
    fn invalid_global_is_reported() {
        let tmp = TempDir::new().unwrap();
        let cfg_dir = tmp.path().join("config");
        std::fs::create_dir_all(&cfg_dir).unwrap();
        std::fs::write(cfg_dir.join("config.toml"), "[ios]\ndebug_port = 0\n").unwrap();

        let err = load_config(&cfg_dir, None).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
    }

    #[test]
    fn load_from_str_parses_valid_toml() {
        let config = load_from_str("[adapter]\nremote_root = \"file:///data/app/\"\n").unwrap();
        assert_eq!(config.adapter.remote_root, "file:///data/app/");
    }

    #[test]
    fn load_from_str_rejects_invalid_toml() {
        assert!(matches!(load_from_str("{{bad}}"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn find_project_config_walks_up() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("repo");
        let override_dir = root.join(PROJECT_DIR_NAME);
        std::fs::create_dir_all(&override_dir).unwrap();
        std::fs::write(override_dir.join("config.toml"), "[cli]\ntool = \"ns\"\n").unwrap();

        let deep = root.join("app").join("views");
        std::fs::create_dir_all(&deep).unwrap();

        let found = find_project_config(&deep).expect("found");
        assert!(found.ends_with(".nsbridge/config.toml"));
    }

    #[test]
    fn default_template_is_comment_only() {
        assert!(!has_non_comment_content(DEFAULT_CONFIG_CONTENT));
        assert!(has_non_comment_content("# comment\ntool = \"tns\"\n"));
    }
}
