use std::io::Write;
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use log::debug;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("docker build failed with exit code {0}")]
    Build(ExitStatus),

    #[error("docker push failed with exit code {0}")]
    Push(ExitStatus),

    #[error(transparent)]
    IOError(#[from] std::io::Error),
}

/// Build `dockerfile` with `context` as build context and tag the result `tag`.
pub fn build(dockerfile: &Path, context: &Path, tag: &str) -> Result<(), Error> {
    debug!("Building image {} from {}", tag, dockerfile.display());
    let mut command = Command::new("docker");
    command
        .arg("build")
        .arg("--file")
        .arg(dockerfile)
        .arg("--tag")
        .arg(tag)
        .arg(context);
    docker(command, Error::Build)
}

/// Build an image from Dockerfile contents that only exist in memory.
pub fn build_generated(dockerfile: &str, context: &Path, tag: &str) -> Result<(), Error> {
    let mut file = tempfile::NamedTempFile::new()?;
    file.write_all(dockerfile.as_bytes())?;
    build(file.path(), context, tag)
}

/// Push `image` to the registry named in its reference.
pub fn push(image: &str) -> Result<(), Error> {
    debug!("Pushing image {image}");
    let mut command = Command::new("docker");
    command.arg("push").arg(image);
    docker(command, Error::Push)
}

/// Docker output is streamed straight to the terminal, only the exit status is inspected.
fn docker(mut command: Command, failed: fn(ExitStatus) -> Error) -> Result<(), Error> {
    debug!("Running command {:?}", command);
    let status = command
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()?;
    if status.success() {
        Ok(())
    } else {
        Err(failed(status))
    }
}
