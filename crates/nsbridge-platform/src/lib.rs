//! Host platform services for nsbridge: standard directories and the
//! detected host operating system.

pub mod error;
pub mod paths;
pub mod system_info;

pub use error::PlatformError;
pub use paths::{DefaultPaths, PlatformPaths};
pub use system_info::{OsKind, SystemInfo};
