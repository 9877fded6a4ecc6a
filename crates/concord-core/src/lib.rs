//! Core library for the concord sync engine — provides the shared domain
//! types, the error taxonomy, and configuration plumbing used by every
//! other `concord-*` crate.
//!
//! This crate deliberately has no I/O dependencies beyond config-file
//! loading: it is the vocabulary the rest of the workspace speaks.

pub mod config;
pub mod error;
pub mod hash;
pub mod mapping;
pub mod types;
