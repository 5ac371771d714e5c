use std::process::{ExitStatus, Stdio};
use log::debug;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("kubectl apply exited with code {0}")]
    Apply(ExitStatus),

    #[error(transparent)]
    IOError(#[from] std::io::Error),
}

/// Apply the Kubernetes manifests at `path` (a file or a directory) to the current kubectl context.
///
/// Namespaced objects depend on the namespace document, which is generated first,
/// so a single `kubectl apply` is enough.
pub fn apply(path: &str) -> Result<(), Error> {
    debug!("Applying Kubernetes manifests from {path}");
    std::process::Command::new("kubectl")
        .arg("apply")
        .arg("--filename")
        .arg(path)
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .map(|exit_status| {
            if exit_status.success() {
                Ok(())
            } else {
                Err(Error::Apply(exit_status))
            }
        })?
}
