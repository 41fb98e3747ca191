//! Launch context: the configuration an engine call runs under.

use std::os::fd::RawFd;
use std::path::{Path, PathBuf};

use tether_common::config::RuntimeConfig;
use tether_common::types::{ContainerId, Verbosity};

/// Per-operation environment handed to the engine.
///
/// Every field is an owned copy, so contexts never alias each other. A
/// context is read-only while a launch is in progress; concurrent launches
/// each derive their own copy with [`LaunchContext::for_container`].
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchContext {
    id: Option<ContainerId>,
    bundle: PathBuf,
    state_root: PathBuf,
    console_socket: Option<PathBuf>,
    pid_file: Option<PathBuf>,
    notify_socket: Option<PathBuf>,
    handler: Option<String>,
    systemd_cgroup: bool,
    detach: bool,
    no_new_keyring: bool,
    force_no_cgroup: bool,
    no_pivot: bool,
    verbosity: Verbosity,
    exec_wait_fd: Option<RawFd>,
}

impl LaunchContext {
    /// Builds a context from a runtime configuration.
    ///
    /// An unset state root resolves to the session default.
    #[must_use]
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self {
            id: config.id.as_deref().map(ContainerId::new),
            bundle: config.bundle.clone(),
            state_root: config.effective_state_root(),
            console_socket: config.console_socket.clone(),
            pid_file: config.pid_file.clone(),
            notify_socket: config.notify_socket.clone(),
            handler: config.handler.clone(),
            systemd_cgroup: config.systemd_cgroup,
            detach: config.detach,
            no_new_keyring: config.no_new_keyring,
            force_no_cgroup: config.force_no_cgroup,
            no_pivot: config.no_pivot,
            verbosity: config.verbosity,
            exec_wait_fd: None,
        }
    }

    /// Returns an independent copy bound to `id`.
    #[must_use]
    pub fn for_container(&self, id: &ContainerId) -> Self {
        Self {
            id: Some(id.clone()),
            ..self.clone()
        }
    }

    /// Returns a copy that signals exec completion on `fd`.
    ///
    /// The descriptor stays open inside a launched child. Engines write a
    /// single byte to it once the container process has started.
    #[must_use]
    pub fn with_exec_wait_fd(mut self, fd: RawFd) -> Self {
        self.exec_wait_fd = Some(fd);
        self
    }

    /// Returns a copy with a different log threshold.
    #[must_use]
    pub const fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Container id bound to this context.
    #[must_use]
    pub const fn id(&self) -> Option<&ContainerId> {
        self.id.as_ref()
    }

    /// Bundle directory.
    #[must_use]
    pub fn bundle(&self) -> &Path {
        &self.bundle
    }

    /// Directory holding per-container state.
    #[must_use]
    pub fn state_root(&self) -> &Path {
        &self.state_root
    }

    /// Console socket path, if any.
    #[must_use]
    pub fn console_socket(&self) -> Option<&Path> {
        self.console_socket.as_deref()
    }

    /// File receiving the init PID, if any.
    #[must_use]
    pub fn pid_file(&self) -> Option<&Path> {
        self.pid_file.as_deref()
    }

    /// Notification socket path, if any.
    #[must_use]
    pub fn notify_socket(&self) -> Option<&Path> {
        self.notify_socket.as_deref()
    }

    /// Alternate execution handler name, if any.
    #[must_use]
    pub fn handler(&self) -> Option<&str> {
        self.handler.as_deref()
    }

    /// Whether cgroups are delegated to systemd.
    #[must_use]
    pub const fn systemd_cgroup(&self) -> bool {
        self.systemd_cgroup
    }

    /// Whether the engine returns without waiting for the container.
    #[must_use]
    pub const fn detach(&self) -> bool {
        self.detach
    }

    /// Whether to skip creating a session keyring.
    #[must_use]
    pub const fn no_new_keyring(&self) -> bool {
        self.no_new_keyring
    }

    /// Whether cgroup setup is skipped.
    #[must_use]
    pub const fn force_no_cgroup(&self) -> bool {
        self.force_no_cgroup
    }

    /// Whether `chroot` replaces `pivot_root`.
    #[must_use]
    pub const fn no_pivot(&self) -> bool {
        self.no_pivot
    }

    /// Threshold for engine log records.
    #[must_use]
    pub const fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    /// Exec-wait descriptor; `None` means "no pipe".
    #[must_use]
    pub const fn exec_wait_fd(&self) -> Option<RawFd> {
        self.exec_wait_fd
    }
}

impl Default for LaunchContext {
    fn default() -> Self {
        Self::from_config(&RuntimeConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_have_no_pipe_and_current_bundle() {
        let ctx = LaunchContext::default();
        assert!(ctx.exec_wait_fd().is_none());
        assert!(ctx.id().is_none());
        assert_eq!(ctx.bundle(), Path::new("."));
        assert!(!ctx.state_root().as_os_str().is_empty());
    }

    #[test]
    fn config_fields_are_copied() {
        let config = RuntimeConfig {
            id: Some("web".into()),
            state_root: Some(PathBuf::from("/tmp/state")),
            pid_file: Some(PathBuf::from("/tmp/web.pid")),
            handler: Some("krun".into()),
            no_pivot: true,
            verbosity: Verbosity::Debug,
            ..RuntimeConfig::default()
        };
        let ctx = LaunchContext::from_config(&config);
        assert_eq!(ctx.id().map(ContainerId::as_str), Some("web"));
        assert_eq!(ctx.state_root(), Path::new("/tmp/state"));
        assert_eq!(ctx.pid_file(), Some(Path::new("/tmp/web.pid")));
        assert_eq!(ctx.handler(), Some("krun"));
        assert!(ctx.no_pivot());
        assert!(!ctx.detach());
        assert_eq!(ctx.verbosity(), Verbosity::Debug);
    }

    #[test]
    fn for_container_leaves_original_untouched() {
        let base = LaunchContext::default();
        let bound = base.for_container(&ContainerId::new("a"));
        assert!(base.id().is_none());
        assert_eq!(bound.id().map(ContainerId::as_str), Some("a"));
        assert_eq!(bound.bundle(), base.bundle());
    }

    #[test]
    fn exec_wait_fd_is_opt_in() {
        let ctx = LaunchContext::default().with_exec_wait_fd(9);
        assert_eq!(ctx.exec_wait_fd(), Some(9));
    }
}
