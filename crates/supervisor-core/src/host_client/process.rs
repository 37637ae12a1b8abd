//! Optional host-process launch.
//!
//! Invoked after repeated reconnect failures when the supervisor is
//! configured with a path to the host executable. All launches go through
//! argv-style `tokio::process::Command` — arguments are always passed as a
//! vector, never interpolated into a shell string, per the anti-injection
//! requirement on external command execution.

use std::path::{Path, PathBuf};

use tokio::process::Command;

use crate::error::HostRpcError;

/// Clears a host-side crash sentinel file, if configured.
///
/// Some hosts refuse to start normally (dropping into a restricted "safe
/// mode") after an unclean shutdown, gated on the presence of a marker
/// file left behind by the crash. Removing it before launch lets the host
/// start normally. Absence of the file is not an error.
pub fn clear_crash_sentinel(sentinel_path: &Path) {
    match std::fs::remove_file(sentinel_path) {
        Ok(()) => log::info!(
            "[HostProcess] cleared crash sentinel at {}",
            sentinel_path.display()
        ),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!(
            "[HostProcess] failed to clear crash sentinel {}: {}",
            sentinel_path.display(),
            e
        ),
    }
}

/// Spawns the host executable detached, with its install directory as the
/// working directory.
///
/// The launch is fire-and-forget: the supervisor does not wait on or track
/// the child process, matching the "no-wait, detached" timeout contract
/// for process launches.
pub fn spawn_detached(executable: &Path, args: &[String]) -> Result<(), HostRpcError> {
    let working_dir: PathBuf = executable
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let mut command = Command::new(executable);
    command.args(args).current_dir(&working_dir);
    command.kill_on_drop(false);

    match command.spawn() {
        Ok(mut child) => {
            // We deliberately never `.wait()` on this handle; forget it so
            // the child keeps running after the supervisor's handle drops.
            tokio::spawn(async move {
                let _ = child.wait().await;
            });
            Ok(())
        }
        Err(e) => Err(HostRpcError::LaunchFailed(e.to_string())),
    }
}

/// Checks whether a process whose image name matches `image_name` is
/// currently running, using the platform's own process-listing tool.
///
/// Like [`spawn_detached`], this goes through argv-style execution: the
/// image name is always passed as a discrete argument, never woven into a
/// shell string, so it cannot be used to inject extra commands.
pub async fn is_process_running(image_name: &str) -> bool {
    if image_name.is_empty() {
        return false;
    }

    #[cfg(target_os = "windows")]
    {
        let filter = format!("IMAGENAME eq {image_name}");
        match Command::new("tasklist").args(["/FI", &filter, "/NH"]).output().await {
            Ok(output) => String::from_utf8_lossy(&output.stdout)
                .to_lowercase()
                .contains(&image_name.to_lowercase()),
            Err(e) => {
                log::warn!("[HostProcess] tasklist probe failed: {}", e);
                false
            }
        }
    }

    #[cfg(not(target_os = "windows"))]
    {
        match Command::new("pgrep").args(["-x", image_name]).output().await {
            Ok(output) => output.status.success(),
            Err(e) => {
                log::warn!("[HostProcess] pgrep probe failed: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn clearing_a_missing_sentinel_is_not_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("crash.marker");
        clear_crash_sentinel(&path);
    }

    #[test]
    fn clearing_an_existing_sentinel_removes_it() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("crash.marker");
        std::fs::write(&path, b"crashed").unwrap();
        clear_crash_sentinel(&path);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn empty_image_name_is_never_running() {
        assert!(!is_process_running("").await);
    }

    #[tokio::test]
    async fn implausible_image_name_is_not_running() {
        assert!(!is_process_running("definitely-not-a-real-process-xyz123").await);
    }
}
