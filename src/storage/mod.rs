//! # Storage Module
//!
//! Device-local persistence for the few secrets this crate keeps: the locked
//! identity blob and received channel keys. Ciphertext (messages, files)
//! is stored by the host application, not here.

mod secure_store;

pub use secure_store::{keys, SecureStore};
