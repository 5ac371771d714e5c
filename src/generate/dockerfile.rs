//! Dockerfile packaging the Spin manifest and its prebuilt Wasm modules.
use std::path::Path;
use super::{clean, component_sources, relative, Error};
use crate::spin::Manifest;

/// A component source copied into the image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    /// Cleaned path of the source relative to the Spin manifest.
    /// This is where the module ends up inside the image.
    pub path: String,
    /// Path of the source relative to the Dockerfile's directory, i.e. the build context.
    pub relative: String,
}

#[derive(Debug, Clone, Default)]
pub struct Opts {
    /// Path to the Spin manifest relative to the Dockerfile's directory.
    pub spin_manifest: String,
    pub sources: Vec<Source>,
}

impl Opts {
    /// Collect Dockerfile inputs for `manifest`, read from `manifest_path`, for a Dockerfile
    /// written to `dockerfile_path`.
    pub fn new(manifest: &Manifest, manifest_path: &Path, dockerfile_path: &Path) -> Result<Self, Error> {
        let context = dockerfile_path.parent().unwrap_or(Path::new("."));
        let spin_manifest = relative(context, manifest_path)?;
        let manifest_dir = spin_manifest.parent().unwrap_or(Path::new(""));

        let sources = component_sources(manifest)?
            .into_iter()
            .map(|source| {
                let cleaned = clean(Path::new(source));
                Source {
                    relative: clean(&manifest_dir.join(&cleaned)).display().to_string(),
                    path: cleaned.display().to_string(),
                }
            })
            .collect();

        Ok(Self {
            spin_manifest: spin_manifest.display().to_string(),
            sources,
        })
    }
}

/// Render the Dockerfile. Identical inputs always render identical output.
pub fn generate(opts: &Opts) -> Result<String, Error> {
    if opts.spin_manifest.is_empty() {
        return Err(Error::EmptyManifestPath);
    }
    if opts.sources.is_empty() {
        return Err(Error::NoSources);
    }

    let mut dockerfile = String::from("FROM scratch\n");
    dockerfile.push_str(&copy(&opts.spin_manifest, "./spin.toml")?);
    for source in &opts.sources {
        dockerfile.push_str(&copy(&source.relative, &format!("./{}", source.path))?);
    }
    Ok(dockerfile)
}

/// JSON array form keeps paths containing whitespace intact.
fn copy(src: &str, dest: &str) -> Result<String, Error> {
    Ok(format!(
        "COPY [{}, {}]\n",
        serde_json::to_string(src)?,
        serde_json::to_string(dest)?
    ))
}
