use std::process::Output;
use log::{debug, info};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("spin build failed: {0}")]
    Build(String),

    #[error("run spin: {0}")]
    IOError(#[from] std::io::Error),
}

/// Compile all components of the Spin application at `spin_manifest` to Wasm.
pub fn build(spin_manifest: &str) -> Result<(), Error> {
    let mut command = std::process::Command::new("spin");
    command.arg("build").arg("--from").arg(spin_manifest);
    debug!("Running command {:?}", command);

    let Output { status, stdout, stderr } = command.output()?;
    if !stdout.is_empty() {
        info!("{}", String::from_utf8_lossy(&stdout).trim_end());
    }
    if status.success() {
        Ok(())
    } else {
        Err(Error::Build(String::from_utf8_lossy(&stderr).trim_end().to_string()))
    }
}
