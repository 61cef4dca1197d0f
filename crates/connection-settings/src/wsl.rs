//! Detecting whether we're running inside a WSL distribution.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::Path;

/// Environment variables WSL sets inside a distro. Only non-empty values count.
pub const WSL_DISTRO_ENVS: [&str; 2] = ["WSL_DISTRO_NAME", "WSL_INTEROP"];

/// Helper binary WSL injects into every distro.
pub const WSLPATH: &str = "/bin/wslpath";

/// The parts of an `lstat` result detection cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileKind {
    pub is_symlink: bool,
    pub mode: u32,
}

impl FileKind {
    const fn is_executable(&self) -> bool {
        self.mode & 0o111 != 0
    }
}

impl From<&fs::Metadata> for FileKind {
    fn from(metadata: &fs::Metadata) -> Self {
        #[cfg(unix)]
        let mode = std::os::unix::fs::PermissionsExt::mode(&metadata.permissions());
        #[cfg(not(unix))]
        let mode = 0;

        Self {
            is_symlink: metadata.file_type().is_symlink(),
            mode,
        }
    }
}

/// Checks the real filesystem and process environment.
pub fn is_wsl_distro() -> bool {
    is_wsl_distro_with(
        |path| fs::symlink_metadata(path).map(|metadata| FileKind::from(&metadata)),
        |name| std::env::var_os(name),
    )
}

/// [`is_wsl_distro`], with the `lstat` and environment lookups supplied by the caller.
pub fn is_wsl_distro_with<S, E>(lstat: S, lookup_env: E) -> bool
where
    S: FnOnce(&Path) -> io::Result<FileKind>,
    E: Fn(&str) -> Option<OsString>,
{
    match lstat(Path::new(WSLPATH)) {
        Ok(kind) if kind.is_symlink || kind.is_executable() => has_wsl_envs_with(lookup_env),
        Ok(kind) => {
            tracing::trace!(message = "wslpath is neither a symlink nor executable", ?kind);
            false
        }
        Err(error) => {
            tracing::trace!(message = "wslpath not found", %error);
            false
        }
    }
}

pub fn has_wsl_envs() -> bool {
    has_wsl_envs_with(|name| std::env::var_os(name))
}

pub fn has_wsl_envs_with<E>(lookup_env: E) -> bool
where
    E: Fn(&str) -> Option<OsString>,
{
    WSL_DISTRO_ENVS
        .iter()
        .any(|name| lookup_env(name).is_some_and(|value| !value.is_empty()))
}
