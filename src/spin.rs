//! Spin application manifest (`spin.toml`).
//!
//! The manifest format allows `source` and `files` to take several shapes, which
//! serde cannot express in the typed model directly. Decoding therefore happens in
//! two passes: the typed pass ignores those keys, and a second pass reads them as
//! raw [`toml::Value`]s and dispatches on their shape.
use std::collections::BTreeMap;
use serde::Deserialize;
use thiserror::Error;
use toml::Value;
use Error::*;

#[derive(Error, Debug)]
pub enum Error {
    #[error("read {path}: {err}")]
    ReadFile {
        err: std::io::Error,
        path: String,
    },

    #[error("decode spin manifest: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("component {component}: source table is missing string key `{key}`")]
    MalformedSource {
        component: usize,
        key: &'static str,
    },

    #[error("component {component}: unknown source type {found}")]
    UnknownSourceType {
        component: usize,
        found: &'static str,
    },

    #[error("component {component}: file mapping is missing string key `{key}`")]
    MalformedFileMap {
        component: usize,
        key: &'static str,
    },

    #[error("component {component}: files entry {entry} has unsupported type {found}")]
    MalformedFileEntry {
        component: usize,
        entry: usize,
        found: &'static str,
    },

    #[error("component {component}: unknown files type {found}")]
    UnknownFilesType {
        component: usize,
        found: &'static str,
    },
}

/// A decoded `spin.toml`.
///
/// See <https://developer.fermyon.com/spin/manifest-reference>.
#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
pub struct Manifest {
    #[serde(default)]
    pub spin_manifest_version: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub trigger: Trigger,
    #[serde(default)]
    pub variables: BTreeMap<String, Variable>,
    #[serde(default, rename = "component")]
    pub components: Vec<Component>,
}

/// Application level trigger.
#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
pub struct Trigger {
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub base: String,
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
pub struct Variable {
    #[serde(default)]
    pub default: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub secret: bool,
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
pub struct Component {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub description: String,

    /// Filled in by the shape dispatch pass. `None` when the component declares no source.
    #[serde(skip)]
    pub source: Option<ComponentSource>,

    /// Filled in by the shape dispatch pass.
    #[serde(skip)]
    pub files: ComponentFiles,

    #[serde(default)]
    pub exclude_files: Vec<String>,
    #[serde(default)]
    pub allowed_http_hosts: Vec<String>,
    #[serde(default)]
    pub key_value_stores: Vec<String>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    #[serde(default)]
    pub trigger: ComponentTrigger,
    #[serde(default)]
    pub build: Build,
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
pub struct ComponentTrigger {
    #[serde(default)]
    pub route: String,
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub executor: Option<Executor>,
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
pub struct Executor {
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub argv: String,
    #[serde(default)]
    pub entrypoint: String,
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
pub struct Build {
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub workdir: String,
}

/// Where a component's Wasm module comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentSource {
    /// Local path to a pre-built module, relative to the manifest.
    Path(String),
    /// Module fetched from a remote location.
    Url { url: String, digest: String },
}

/// A file mapping with an explicit destination inside the component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMapping {
    pub source: String,
    pub destination: String,
}

/// Auxiliary files bundled with a component.
///
/// A `files` list may mix bare paths and mappings, so both collections can be
/// populated at the same time. Entries keep their relative order within each collection.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ComponentFiles {
    pub paths: Vec<String>,
    pub mappings: Vec<FileMapping>,
}

impl ComponentFiles {
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty() && self.mappings.is_empty()
    }
}

impl Manifest {
    pub fn parse(toml_string: &str) -> Result<Self, Error> {
        let mut manifest = toml::from_str::<Self>(toml_string)?;
        let raw = toml::from_str::<raw::Manifest>(toml_string)?;

        for (index, (component, raw_component)) in manifest
            .components
            .iter_mut()
            .zip(raw.components)
            .enumerate()
        {
            component.source = raw_component
                .source
                .map(|value| decode_source(index, value))
                .transpose()?;
            component.files = match raw_component.files {
                Some(value) => decode_files(index, value)?,
                None => ComponentFiles::default(),
            };
        }

        Ok(manifest)
    }

    pub fn parse_file(path: &str) -> Result<Self, Error> {
        Self::parse(
            &std::fs::read_to_string(path).map_err(|err| ReadFile {
                err,
                path: path.to_string(),
            })?
        )
    }
}

fn decode_source(component: usize, value: Value) -> Result<ComponentSource, Error> {
    match value {
        Value::String(path) => Ok(ComponentSource::Path(path)),
        Value::Table(table) => {
            let field = |key: &'static str| {
                table
                    .get(key)
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or(MalformedSource { component, key })
            };
            Ok(ComponentSource::Url {
                url: field("url")?,
                digest: field("digest")?,
            })
        }
        other => Err(UnknownSourceType {
            component,
            found: other.type_str(),
        }),
    }
}

fn decode_files(component: usize, value: Value) -> Result<ComponentFiles, Error> {
    let mut files = ComponentFiles::default();
    match value {
        Value::String(path) => files.paths.push(path),
        Value::Table(table) => files.mappings.push(decode_file_mapping(component, &table)?),
        Value::Array(entries) => {
            for (entry, value) in entries.into_iter().enumerate() {
                match value {
                    Value::String(path) => files.paths.push(path),
                    Value::Table(table) => {
                        files.mappings.push(decode_file_mapping(component, &table)?)
                    }
                    other => {
                        return Err(MalformedFileEntry {
                            component,
                            entry,
                            found: other.type_str(),
                        })
                    }
                }
            }
        }
        other => {
            return Err(UnknownFilesType {
                component,
                found: other.type_str(),
            })
        }
    }
    Ok(files)
}

fn decode_file_mapping(component: usize, table: &toml::Table) -> Result<FileMapping, Error> {
    let field = |key: &'static str| {
        table
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(MalformedFileMap { component, key })
    };
    Ok(FileMapping {
        source: field("source")?,
        destination: field("destination")?,
    })
}

/// Untyped view of the keys the typed model skips.
mod raw {
    use serde::Deserialize;

    #[derive(Deserialize)]
    pub struct Component {
        pub source: Option<toml::Value>,
        pub files: Option<toml::Value>,
    }

    #[derive(Deserialize)]
    pub struct Manifest {
        #[serde(default, rename = "component")]
        pub components: Vec<Component>,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO: &str = r#"
spin_manifest_version = "1"
name = "hello"
version = "0.1.0"
authors = ["someone <someone@example.com>"]
trigger = { type = "http", base = "/" }

[variables]
foo = { default = "bar" }
password = { required = true, secret = true }

[[component]]
id = "hello"
source = { url = "https://example.com/hello.wasm", digest = "sha256:abc" }

[[component]]
id = "world"
source = "target/wasm32-wasi/release/world.wasm"
allowed_http_hosts = ["example.com"]
[component.trigger]
route = "/world/..."
[component.build]
command = "cargo build --target wasm32-wasi --release"
[component.config]
greeting = "{{ foo }}"
"#;

    #[test]
    fn parse_full_manifest() {
        let m = Manifest::parse(HELLO).unwrap();
        assert_eq!(m.name, "hello");
        assert_eq!(m.trigger.kind, "http");
        assert_eq!(m.trigger.base, "/");
        assert_eq!(m.variables.len(), 2);
        assert!(m.variables["password"].secret);
        assert!(m.variables["password"].required);
        assert_eq!(m.variables["foo"].default, "bar");

        assert_eq!(m.components.len(), 2);
        assert_eq!(m.components[0].id, "hello");
        assert_eq!(
            m.components[0].source,
            Some(ComponentSource::Url {
                url: "https://example.com/hello.wasm".into(),
                digest: "sha256:abc".into(),
            })
        );
        assert_eq!(m.components[1].id, "world");
        assert_eq!(
            m.components[1].source,
            Some(ComponentSource::Path("target/wasm32-wasi/release/world.wasm".into()))
        );
        assert_eq!(m.components[1].trigger.route, "/world/...");
        assert_eq!(m.components[1].build.command, "cargo build --target wasm32-wasi --release");
        assert_eq!(m.components[1].config["greeting"], "{{ foo }}");
        assert!(m.components[1].files.is_empty());
    }

    #[test]
    fn sources_survive_encoding() {
        let sources = vec![
            ComponentSource::Path("a/b.wasm".into()),
            ComponentSource::Url { url: "https://h/c.wasm".into(), digest: "sha256:1".into() },
            ComponentSource::Path("d.wasm".into()),
        ];
        let mut text = String::from("name = \"roundtrip\"\n");
        for (i, source) in sources.iter().enumerate() {
            let value = match source {
                ComponentSource::Path(path) => Value::String(path.clone()),
                ComponentSource::Url { url, digest } => Value::Table(toml::Table::from_iter([
                    ("url".to_string(), Value::String(url.clone())),
                    ("digest".to_string(), Value::String(digest.clone())),
                ])),
            };
            text.push_str(&format!("[[component]]\nid = \"c{i}\"\nsource = {value}\n"));
        }

        let m = Manifest::parse(&text).unwrap();
        let decoded: Vec<_> = m.components.into_iter().map(|c| c.source.unwrap()).collect();
        assert_eq!(decoded, sources);
    }

    #[test]
    fn source_absent_is_not_an_error() {
        let m = Manifest::parse("[[component]]\nid = \"nothing\"\n").unwrap();
        assert_eq!(m.components[0].source, None);
    }

    #[test]
    fn source_table_missing_digest() {
        let err = Manifest::parse(
            "[[component]]\nid = \"a\"\n[[component]]\nid = \"b\"\nsource = { url = \"h.wasm\" }\n",
        )
        .unwrap_err();
        assert!(matches!(err, MalformedSource { component: 1, key: "digest" }));
    }

    #[test]
    fn source_with_wrong_value_type() {
        let err = Manifest::parse("[[component]]\nsource = { url = 1, digest = \"d\" }\n").unwrap_err();
        assert!(matches!(err, MalformedSource { component: 0, key: "url" }));
    }

    #[test]
    fn source_of_unknown_shape() {
        let err = Manifest::parse("[[component]]\nsource = 42\n").unwrap_err();
        assert!(matches!(err, UnknownSourceType { component: 0, found: "integer" }));
    }

    #[test]
    fn files_as_string() {
        let m = Manifest::parse("[[component]]\nsource = \"a.wasm\"\nfiles = \"a.txt\"\n").unwrap();
        assert_eq!(m.components[0].files.paths, vec!["a.txt".to_string()]);
        assert!(m.components[0].files.mappings.is_empty());
    }

    #[test]
    fn files_as_table() {
        let m = Manifest::parse(
            "[[component]]\nsource = \"a.wasm\"\nfiles = { source = \"s\", destination = \"d\" }\n",
        )
        .unwrap();
        assert!(m.components[0].files.paths.is_empty());
        assert_eq!(
            m.components[0].files.mappings,
            vec![FileMapping { source: "s".into(), destination: "d".into() }]
        );
    }

    #[test]
    fn files_as_mixed_list() {
        let m = Manifest::parse(
            r#"
[[component]]
source = "a.wasm"
files = ["a.txt", { source = "s", destination = "d" }, "b.txt"]
"#,
        )
        .unwrap();
        let files = &m.components[0].files;
        assert_eq!(files.paths, vec!["a.txt".to_string(), "b.txt".to_string()]);
        assert_eq!(files.mappings.len(), 1);
        assert_eq!(files.mappings[0].destination, "d");
    }

    #[test]
    fn files_empty_list() {
        let m = Manifest::parse("[[component]]\nsource = \"a.wasm\"\nfiles = []\n").unwrap();
        assert!(m.components[0].files.is_empty());
    }

    #[test]
    fn files_bad_list_entry() {
        let err = Manifest::parse("[[component]]\nfiles = [\"a.txt\", true]\n").unwrap_err();
        assert!(matches!(err, MalformedFileEntry { component: 0, entry: 1, found: "boolean" }));
    }

    #[test]
    fn files_mapping_missing_destination() {
        let err = Manifest::parse("[[component]]\nfiles = [{ source = \"s\" }]\n").unwrap_err();
        assert!(matches!(err, MalformedFileMap { component: 0, key: "destination" }));
    }

    #[test]
    fn files_of_unknown_shape() {
        let err = Manifest::parse("[[component]]\nfiles = 3.5\n").unwrap_err();
        assert!(matches!(err, UnknownFilesType { component: 0, found: "float" }));
    }

    #[test]
    fn syntax_error() {
        assert!(matches!(Manifest::parse("name = "), Err(Toml(_))));
    }

    #[test]
    fn parse_file_reports_path() {
        let err = Manifest::parse_file("/nonexistent/spin.toml").unwrap_err();
        assert!(err.to_string().starts_with("read /nonexistent/spin.toml"));
    }

    #[test]
    fn parse_file_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, HELLO.as_bytes()).unwrap();
        let m = Manifest::parse_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(m.components.len(), 2);
    }
}
