//! rigup-lib: Core types and logic for Rigup
//!
//! This crate provides the fundamental types used throughout Rigup:
//! - `Project`: a directory plus its parsed `rigup.yml` manifest
//! - `Requirement`: something a project needs before it can run
//! - `Provider`: a strategy for satisfying a requirement
//! - `PrepareResult`: the outcome of running the preparation pipeline

pub mod consts;
pub mod environ;
pub mod local_state;
pub mod manifest;
pub mod ops;
pub mod plan;
pub mod prepare;
pub mod provider;
pub mod requirement;
pub mod yaml_file;
