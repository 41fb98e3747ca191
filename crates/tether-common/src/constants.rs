//! System-wide constants and default paths.

use std::path::PathBuf;
use std::sync::OnceLock;

/// State root used when running as root or when no runtime dir is set.
pub const SYSTEM_STATE_ROOT: &str = "/run/tether";

/// Default bundle directory when the configuration leaves it empty.
pub const DEFAULT_BUNDLE: &str = ".";

/// Device opened read-only as stdin when the caller supplies none.
pub const NULL_DEVICE: &str = "/dev/null";

/// Name of the container definition inside a bundle.
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Name of the per-container state document inside the state root.
pub const STATE_FILE_NAME: &str = "state.json";

/// OCI runtime specification version reported in state documents.
pub const OCI_VERSION: &str = "1.0.2";

/// Application name used in CLI output and state directories.
pub const APP_NAME: &str = "tether";

/// Binary name for the CLI.
pub const BIN_NAME: &str = "tether";

/// Exit status of a forked launch child whose engine call failed.
pub const ENGINE_FAILURE_EXIT: i32 = 1;

/// Offset added to a terminating signal number to form an exit code.
pub const SIGNAL_EXIT_BASE: i32 = 128;

/// Exit code reported when a wait status is neither an exit nor a signal.
pub const UNKNOWN_EXIT: i32 = -1;

/// Returns the state root, preferring `$XDG_RUNTIME_DIR/tether` for
/// non-root users and falling back to `/run/tether`.
fn resolve_state_root() -> PathBuf {
    // SAFETY: geteuid has no preconditions and cannot fail.
    #[allow(unsafe_code)]
    let euid = unsafe { libc::geteuid() };
    if euid != 0 {
        if let Some(dir) = std::env::var_os("XDG_RUNTIME_DIR").filter(|d| !d.is_empty()) {
            return PathBuf::from(dir).join(APP_NAME);
        }
    }
    PathBuf::from(SYSTEM_STATE_ROOT)
}

static STATE_ROOT: OnceLock<PathBuf> = OnceLock::new();

/// Returns the resolved default state root for this session.
pub fn default_state_root() -> &'static PathBuf {
    STATE_ROOT.get_or_init(resolve_state_root)
}
