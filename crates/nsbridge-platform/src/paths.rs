use std::path::PathBuf;

use crate::error::PlatformError;

/// Standard directory paths used by the adapter.
pub trait PlatformPaths: Send + Sync {
    /// Returns the configuration directory (`~/.config/nsbridge`).
    fn config_dir(&self) -> PathBuf;
    /// Returns the data directory (`~/.local/share/nsbridge`).
    fn data_dir(&self) -> PathBuf;
    /// Returns the log directory (`<data_dir>/logs`).
    fn log_dir(&self) -> PathBuf;
    /// Returns the user's home directory.
    fn home_dir(&self) -> PathBuf;
}

/// Default implementation of [`PlatformPaths`] backed by the `dirs` crate.
pub struct DefaultPaths {
    home: PathBuf,
}

impl DefaultPaths {
    /// Resolves the home directory.
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::Path` if the home directory cannot be
    /// determined.
    pub fn new() -> Result<Self, PlatformError> {
        let home = dirs::home_dir()
            .or_else(|| std::env::var("HOME").ok().map(PathBuf::from))
            .ok_or_else(|| PlatformError::Path("could not determine home directory".into()))?;
        Ok(Self { home })
    }

    /// Roots every directory under `home` instead of the user's home.
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }
}

impl PlatformPaths for DefaultPaths {
    fn config_dir(&self) -> PathBuf {
        self.home.join(".config").join("nsbridge")
    }

    fn data_dir(&self) -> PathBuf {
        self.home.join(".local").join("share").join("nsbridge")
    }

    fn log_dir(&self) -> PathBuf {
        self.data_dir().join("logs")
    }

    fn home_dir(&self) -> PathBuf {
        self.home.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_dir_ends_with_config_nsbridge() {
        let paths = DefaultPaths::with_home("/home/dev");
        assert_eq!(
            paths.config_dir(),
            PathBuf::from("/home/dev/.config/nsbridge")
        );
    }

    #[test]
    fn log_dir_is_under_data_dir() {
        let paths = DefaultPaths::with_home("/home/dev");
        assert!(paths.log_dir().starts_with(paths.data_dir()));
        assert!(paths.log_dir().ends_with("logs"));
    }

    #[test]
    fn resolved_home_is_non_empty() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let paths = DefaultPaths::with_home(tmp.path());
        assert!(!paths.home_dir().as_os_str().is_empty());
        assert!(paths.data_dir().starts_with(tmp.path()));
    }

    #[test]
    fn default_paths_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<DefaultPaths>();
    }
}
