use std::{
    ffi::OsStr,
    io,
    path::Path,
    process::{Command, ExitStatus, Stdio},
    thread,
    time::Duration,
};

use log::{debug, info, warn};

use crate::progress::CancellationToken;

use super::{has_extension, InstallerFamily};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(thiserror::Error, Debug)]
pub enum RunError {
    #[error("Unable to start installer. {0}")]
    Spawn(#[source] io::Error),
    #[error("Unable to wait for installer. {0}")]
    Wait(#[source] io::Error),
    #[error("Installer was cancelled.")]
    Cancelled,
}

/// Runs Windows installers, optionally through a wrapper such as `wine`.
pub struct InstallerRunner {
    wrapper: Vec<String>,
}

impl InstallerRunner {
    #[must_use]
    pub fn new(wrapper: Vec<String>) -> Self {
        Self { wrapper }
    }

    /// Path in the form the installer understands. Through a wrapper the
    /// host filesystem is reachable as drive `Z:`.
    #[must_use]
    pub fn target_path(&self, path: &Path) -> String {
        let path = path.to_string_lossy();
        if self.wrapper.is_empty() || cfg!(windows) {
            path.into_owned()
        } else {
            format!("Z:{}", path.replace('/', "\\"))
        }
    }

    pub fn command(&self, program: impl AsRef<OsStr>, args: &[impl AsRef<OsStr>]) -> Command {
        let mut command = match self.wrapper.split_first() {
            Some((wrapper, rest)) => {
                let mut command = Command::new(wrapper);
                command.args(rest).arg(program);
                command
            }
            None => Command::new(program),
        };

        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        debug!("Running command: {:?}", command);

        command
    }

    /// Spawns the command and waits for it, killing it when `cancel` is triggered.
    pub fn run(&self, mut command: Command, cancel: &CancellationToken) -> Result<ExitStatus, RunError> {
        let mut child = command.spawn().map_err(RunError::Spawn)?;

        loop {
            if let Some(status) = child.try_wait().map_err(RunError::Wait)? {
                return Ok(status);
            }

            if cancel.is_cancelled() {
                warn!("Killing installer process {}", child.id());
                let _ = child.kill();
                let _ = child.wait();
                return Err(RunError::Cancelled);
            }

            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Runs an installer unattended so that it installs into `target`.
    pub fn install(
        &self,
        installer: &Path,
        target: &Path,
        cancel: &CancellationToken,
    ) -> Result<ExitStatus, RunError> {
        let family = InstallerFamily::detect(installer).map_err(RunError::Spawn)?;
        let args = family.silent_args(&self.target_path(target));

        info!(
            "Running {family:?} installer {} into {}",
            installer.display(),
            target.display()
        );

        let command = if has_extension(installer, "msi") {
            let mut msi = vec![
                "/i".to_owned(),
                self.target_path(installer),
            ];
            msi.extend(args);
            self.command("msiexec", &msi)
        } else {
            self.command(installer, &args)
        };

        self.run(command, cancel)
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use pretty_assertions::assert_eq;

    use super::InstallerRunner;

    #[test]
    fn wrapped_command() {
        let runner = InstallerRunner::new(vec!["wine".into(), "--debug".into()]);
        let command = runner.command("setup.exe", &["/S"]);

        assert_eq!(command.get_program(), "wine");
        assert_eq!(
            command.get_args().collect::<Vec<_>>(),
            ["--debug", "setup.exe", "/S"]
        );
    }

    #[test]
    #[cfg(unix)]
    fn target_paths() {
        let plain = InstallerRunner::new(vec![]);
        let wine = InstallerRunner::new(vec!["wine".into()]);

        assert_eq!(plain.target_path(Path::new("/games/x")), "/games/x");
        assert_eq!(wine.target_path(Path::new("/games/x")), "Z:\\games\\x");
    }

    #[test]
    #[cfg(unix)]
    fn exit_status() {
        let runner = InstallerRunner::new(vec![]);
        let token = crate::progress::CancellationToken::new();

        let status = runner
            .run(runner.command("sh", &["-c", "exit 3"]), &token)
            .unwrap();
        assert_eq!(status.code(), Some(3));
    }
}
