//! Deploy Spin applications to Azure Kubernetes Service.
//!
//! The Spin manifest is decoded by [`spin`], turned into a Dockerfile and Kubernetes
//! manifests by [`generate`], and handed to external tooling by [`build`], [`docker`]
//! and [`deploy`].

pub mod build;
pub mod config;
pub mod deploy;
pub mod docker;
pub mod generate;
pub mod hasher;
pub mod runtime_config;
pub mod spin;
