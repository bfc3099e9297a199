//! Registry of target platforms.
//!
//! A platform is one `PlatformInfo` row: its names, its host requirement,
//! how its readiness profile is built and which connection it uses.
//! Supporting another platform means adding a row and listing it in
//! [`PlatformKind::ALL`].

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::connection::{AndroidConnection, DebugConnection, WebKitConnection};
use crate::error::LaunchError;
use crate::project::{android_profile, ios_profile, PlatformProfile, ProjectSettings};

/// Static description of one target platform.
struct PlatformInfo {
    /// Name used on the CLI command line and in `launch` arguments.
    name: &'static str,
    /// Name shown to users.
    display_name: &'static str,
    /// The platform's tooling only runs on macOS.
    requires_macos: bool,
    profile: fn(PlatformKind, &ProjectSettings) -> PlatformProfile,
    connect: fn() -> Box<dyn DebugConnection>,
}

const IOS_INFO: PlatformInfo = PlatformInfo {
    name: "ios",
    display_name: "iOS",
    requires_macos: true,
    profile: ios_profile,
    connect: webkit_connection,
};

const ANDROID_INFO: PlatformInfo = PlatformInfo {
    name: "android",
    display_name: "Android",
    requires_macos: false,
    profile: android_profile,
    connect: android_connection,
};

fn webkit_connection() -> Box<dyn DebugConnection> {
    Box::new(WebKitConnection::new())
}

fn android_connection() -> Box<dyn DebugConnection> {
    Box::new(AndroidConnection::new())
}

/// Target platform of a debug session; a handle to its registry row.
#[derive(Clone, Copy)]
pub struct PlatformKind(&'static PlatformInfo);

impl PlatformKind {
    pub const IOS: Self = Self(&IOS_INFO);
    pub const ANDROID: Self = Self(&ANDROID_INFO);

    /// Every platform a session can target.
    pub const ALL: &'static [PlatformKind] = &[Self::IOS, Self::ANDROID];

    /// Name used on the CLI command line.
    pub fn name(self) -> &'static str {
        self.0.name
    }

    pub fn display_name(self) -> &'static str {
        self.0.display_name
    }

    pub fn requires_macos(self) -> bool {
        self.0.requires_macos
    }

    pub(crate) fn profile(self, settings: &ProjectSettings) -> PlatformProfile {
        (self.0.profile)(self, settings)
    }

    pub(crate) fn connect(self) -> Box<dyn DebugConnection> {
        (self.0.connect)()
    }
}

// Rows are consts, so two handles to one platform need not share an
// address; identity is the name.
impl PartialEq for PlatformKind {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
    }
}

impl Eq for PlatformKind {}

impl Hash for PlatformKind {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name().hash(state);
    }
}

impl fmt::Debug for PlatformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PlatformKind").field(&self.name()).finish()
    }
}

impl fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PlatformKind {
    type Err = LaunchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PlatformKind::ALL
            .iter()
            .copied()
            .find(|platform| platform.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| LaunchError::UnknownPlatform(s.to_string()))
    }
}
