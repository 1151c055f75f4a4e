//! Build identification shown in the host's version string

use core::fmt;

pub const BUILD_NAME: &str = env!("CARGO_PKG_NAME");
pub const BUILD_VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(debug_assertions)]
pub const BUILD_PROFILE: &str = "debug";
#[cfg(not(debug_assertions))]
pub const BUILD_PROFILE: &str = "release";

/// Room the host leaves after its own version text
pub const SUFFIX_CAPACITY: usize = 16;

/// Longest version fragment that fits after `-em-`
const VERSION_CHARS: usize = 9;

pub type Suffix = heapless::String<SUFFIX_CAPACITY>;

/// `-em-<version>`, with the version cut to fit
pub fn build_suffix(version: &str) -> Suffix {
    let mut suffix = Suffix::new();
    let _ = suffix.push_str("-em-");
    for c in version.chars().take(VERSION_CHARS) {
        if suffix.push(c).is_err() {
            break;
        }
    }
    suffix
}

/// Suffix shown when Ember vetoed itself at boot
pub fn disabled_suffix() -> Suffix {
    let mut suffix = Suffix::new();
    let _ = suffix.push_str("-em-off");
    suffix
}

/// The banner printed once per boot
pub struct Banner;

impl fmt::Display for Banner {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {} ({})", BUILD_NAME, BUILD_VERSION, BUILD_PROFILE)
    }
}
