use std::fmt::Write;

/// The current version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Generator name stamped into emitted function wrappers.
pub const GENERATOR_NAME: &str = "fnpack";

/// Returns a formatted version string including build metadata if available.
#[must_use]
pub fn version_string() -> String {
    let mut s = format!("{GENERATOR_NAME} {VERSION}");

    if let Some(hash) = option_env!("FNPACK_BUILD_GIT_HASH") {
        let _ = write!(s, " ({hash})");
    }

    s
}

/// Generator identity as written into platform metadata (`name@version`).
#[must_use]
pub fn generator() -> String {
    format!("{GENERATOR_NAME}@{VERSION}")
}
