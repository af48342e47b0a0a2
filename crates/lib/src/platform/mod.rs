pub mod arch;
pub mod os;
pub mod paths;

use arch::Arch;
use os::Os;
use std::fmt;

/// Platform identifier combining architecture and OS (e.g., "x86_64-linux").
///
/// This is the "system" string that indexes per-platform flake outputs such as
/// `packages.<system>.<name>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Platform {
  pub arch: Arch,
  pub os: Os,
}

impl Platform {
  /// Create a new platform identifier
  pub fn new(arch: Arch, os: Os) -> Self {
    Self { arch, os }
  }

  /// Detect the current platform at runtime
  ///
  /// Returns `None` if the OS or architecture is not supported
  pub fn current() -> Option<Self> {
    Some(Self {
      arch: Arch::current()?,
      os: Os::current()?,
    })
  }

  /// Returns the system string (e.g., "aarch64-darwin")
  pub fn system(&self) -> String {
    format!("{}-{}", self.arch, self.os)
  }
}

impl fmt::Display for Platform {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.system())
  }
}

/// Returns the system string for the current host.
///
/// Falls back to `<arch>-<os>` straight from the compiler constants when the
/// host is not one of the recognised platforms, so evaluation always has a
/// system to compare `checks.<system>` against.
pub fn current_system() -> String {
  Platform::current()
    .map(|p| p.system())
    .unwrap_or_else(|| format!("{}-{}", std::env::consts::ARCH, std::env::consts::OS))
}

/// Whether a string is plausibly a system name.
///
/// Systems are always `<arch>-<os>`, so anything without a dash is rejected.
pub fn is_valid_system(system: &str) -> bool {
  system.contains('-')
}
