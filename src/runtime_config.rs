//! Spin runtime configuration, supplying variable values and key-value store backends.
//!
//! See <https://developer.fermyon.com/spin/dynamic-configuration>.
use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use crate::spin::Manifest;
use Error::*;

/// Only store type currently supported on AKS.
pub const STORE_TYPE_COSMOS: &str = "azure_cosmos";

#[derive(Error, Debug)]
pub enum Error {
    #[error("read {path}: {err}")]
    ReadFile {
        err: std::io::Error,
        path: String,
    },

    #[error("decode runtime config: {0}")]
    Deserialize(#[from] toml::de::Error),

    #[error("encode runtime config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("key value store {store} has unsupported type {kind:?}")]
    UnsupportedStoreType {
        store: String,
        kind: String,
    },

    #[error("key value store {store} is missing {field}")]
    MissingStoreField {
        store: String,
        field: &'static str,
    },
}

#[derive(Deserialize, Serialize, Debug, Default, Clone, PartialEq)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub variables: BTreeMap<String, RuntimeVariable>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub key_value_store: BTreeMap<String, KeyValueStore>,
}

#[derive(Deserialize, Serialize, Debug, Default, Clone, PartialEq)]
pub struct RuntimeVariable {
    #[serde(default)]
    pub default: String,
    #[serde(default)]
    pub required: bool,
}

#[derive(Deserialize, Serialize, Debug, Default, Clone, PartialEq)]
pub struct KeyValueStore {
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub account: String,
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub container: String,
}

impl RuntimeConfig {
    /// Variables mirror the manifest's declared variables. No stores are configured.
    pub fn from_manifest(manifest: &Manifest) -> Self {
        Self {
            variables: manifest
                .variables
                .iter()
                .map(|(name, variable)| {
                    (
                        name.clone(),
                        RuntimeVariable {
                            default: variable.default.clone(),
                            required: variable.required,
                        },
                    )
                })
                .collect(),
            key_value_store: BTreeMap::new(),
        }
    }

    pub fn parse(toml_string: &str) -> Result<Self, Error> {
        let config = toml::from_str::<Self>(toml_string)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &str) -> Result<Self, Error> {
        Self::parse(
            &std::fs::read_to_string(path).map_err(|err| ReadFile {
                err,
                path: path.to_string(),
            })?
        )
    }

    pub fn to_toml(&self) -> Result<String, Error> {
        Ok(toml::to_string(self)?)
    }

    fn validate(&self) -> Result<(), Error> {
        for (name, store) in &self.key_value_store {
            if store.kind != STORE_TYPE_COSMOS {
                return Err(UnsupportedStoreType {
                    store: name.clone(),
                    kind: store.kind.clone(),
                });
            }
            for (field, value) in [
                ("key", &store.key),
                ("account", &store.account),
                ("database", &store.database),
                ("container", &store.container),
            ] {
                if value.is_empty() {
                    return Err(MissingStoreField {
                        store: name.clone(),
                        field,
                    });
                }
            }
        }
        Ok(())
    }
}
