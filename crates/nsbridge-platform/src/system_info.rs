use std::fmt;

/// Host operating system kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsKind {
    Linux,
    MacOs,
    Windows,
    Unknown,
}

impl fmt::Display for OsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OsKind::Linux => "linux",
            OsKind::MacOs => "darwin",
            OsKind::Windows => "win32",
            OsKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Host information consulted before spawning platform tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemInfo {
    os: OsKind,
}

impl SystemInfo {
    /// Detects the host OS at compile time.
    pub fn detect() -> Self {
        let os = if cfg!(target_os = "macos") {
            OsKind::MacOs
        } else if cfg!(target_os = "linux") {
            OsKind::Linux
        } else if cfg!(target_os = "windows") {
            OsKind::Windows
        } else {
            OsKind::Unknown
        };
        Self { os }
    }

    /// Pretends to run on `os`. Used to exercise host preconditions.
    pub fn with_os(os: OsKind) -> Self {
        Self { os }
    }

    /// Returns the detected OS kind.
    pub fn os(&self) -> OsKind {
        self.os
    }

    pub fn is_macos(&self) -> bool {
        self.os == OsKind::MacOs
    }
}
