//! Version and build information embedded by `build.rs`.

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Git commit hash (short form)
pub const GIT_HASH: &str = env!("MODLINK_GIT_HASH");

/// Git branch at build time
pub const GIT_BRANCH: &str = env!("MODLINK_GIT_BRANCH");

/// Build timestamp (UTC)
pub const BUILD_TIMESTAMP: &str = env!("MODLINK_BUILD_TIMESTAMP");

/// Target triple
pub const TARGET: &str = env!("MODLINK_TARGET");

/// Build profile (debug/release)
pub const PROFILE: &str = env!("MODLINK_PROFILE");

/// Rust compiler version
pub const RUSTC_VERSION: &str = env!("MODLINK_RUSTC_VERSION");

/// One-line version string for logs and `--version`.
pub fn version_string() -> String {
    format!("modlink {} ({} {})", VERSION, GIT_HASH, PROFILE)
}

/// Print full version and build information.
pub fn print_version() {
    println!("modlink {}", VERSION);
    println!("  commit:   {} ({})", GIT_HASH, GIT_BRANCH);
    println!("  built:    {}", BUILD_TIMESTAMP);
    println!("  target:   {}", TARGET);
    println!("  profile:  {}", PROFILE);
    println!("  rustc:    {}", RUSTC_VERSION);
}
