//! Node Identity Module
//!
//! Provides cryptographic node identity based on Ed25519 keypairs.
//! The provider submodule picks the backend that generates the keypair;
//! the store submodule derives the public metadata (node id, fingerprint)
//! and durably writes the identity record pair to disk.

pub mod provider;
pub mod store;

pub use provider::{select_and_generate, KeyMaterial};
pub use store::{persist, PersistedIdentity, StoreError};
