//! Deployment artifacts generated from a Spin manifest.
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use crate::spin::{ComponentSource, Manifest};

pub mod dockerfile;
pub mod k8s;
pub mod manifests;

#[derive(Error, Debug)]
pub enum Error {
    #[error("component {component} has a URL source, which isn't supported yet")]
    UnsupportedSourceKind {
        component: String,
    },

    #[error("component {component} contains files, which isn't supported yet")]
    UnsupportedFiles {
        component: String,
    },

    #[error("component {component} does not declare a source")]
    MissingSource {
        component: String,
    },

    #[error("spin manifest has no name")]
    EmptyName,

    #[error("no spin manifest path provided")]
    EmptyManifestPath,

    #[error("no component sources provided")]
    NoSources,

    #[error("secret variables require a key vault, but {field} is not set")]
    MissingKeyVault {
        field: &'static str,
    },

    #[error("cannot express {path} relative to {base}")]
    Path {
        path: String,
        base: String,
    },

    #[error("marshal object: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("marshal secret provider parameters: {0}")]
    Json(#[from] serde_json::Error),
}

/// Returns the local source path of every component, in manifest order.
///
/// Components using features the generators can't handle yet are rejected here
/// rather than while decoding, since some commands only need the parsed manifest.
pub fn component_sources(manifest: &Manifest) -> Result<Vec<&str>, Error> {
    manifest
        .components
        .iter()
        .map(|component| {
            let path = match &component.source {
                Some(ComponentSource::Path(path)) => path.as_str(),
                Some(ComponentSource::Url { .. }) => {
                    return Err(Error::UnsupportedSourceKind {
                        component: component.id.clone(),
                    })
                }
                None => {
                    return Err(Error::MissingSource {
                        component: component.id.clone(),
                    })
                }
            };
            if !component.files.is_empty() {
                return Err(Error::UnsupportedFiles {
                    component: component.id.clone(),
                });
            }
            Ok(path)
        })
        .collect()
}

/// Lexically normalize a path: drop `.`, fold `..` into its parent where possible.
/// An empty result becomes `.`.
pub fn clean(path: &Path) -> PathBuf {
    let mut out: Vec<Component> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    if out.is_empty() {
        PathBuf::from(".")
    } else {
        out.iter().collect()
    }
}

/// Express `path` relative to the directory `base`. Both are cleaned first.
pub fn relative(base: &Path, path: &Path) -> Result<PathBuf, Error> {
    let base = clean(base);
    let target = clean(path);
    let error = || Error::Path {
        path: target.display().to_string(),
        base: base.display().to_string(),
    };

    if base.is_absolute() != target.is_absolute() {
        return Err(error());
    }

    let base_parts: Vec<Component> = base.components().filter(|c| *c != Component::CurDir).collect();
    let target_parts: Vec<Component> = target.components().filter(|c| *c != Component::CurDir).collect();
    let common = base_parts
        .iter()
        .zip(&target_parts)
        .take_while(|(a, b)| a == b)
        .count();

    let mut out = PathBuf::new();
    for part in &base_parts[common..] {
        if *part == Component::ParentDir {
            return Err(error());
        }
        out.push("..");
    }
    for part in &target_parts[common..] {
        out.push(part);
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    Ok(out)
}
