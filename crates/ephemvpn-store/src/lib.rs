//! Parameter store client for ephemvpn.
//!
//! Typed get/put of scalar and binary values against a namespaced
//! key-value store. This crate moves bytes; it never interprets what a
//! parameter means.
//!
//! - **[`ParameterStore`]** — the async contract every backend implements,
//!   including a conditional [`put_if_absent`](ParameterStore::put_if_absent)
//!   and base64 [`get_binary`](ParameterStore::get_binary) /
//!   [`put_binary`](ParameterStore::put_binary) helpers.
//! - **[`SsmStore`]** — AWS Systems Manager Parameter Store.
//! - **[`MemoryStore`]** — in-process store for tests and offline runs.

pub mod error;
pub mod memory;
pub mod ssm;
pub mod store;

pub use error::Error;
pub use memory::MemoryStore;
pub use ssm::{SsmConfig, SsmStore};
pub use store::{Confidentiality, ParameterStore, PutOutcome};
