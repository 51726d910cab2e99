//! Veilpot client library
//!
//! Everything the `veilpot` CLI needs around the pure protocol logic in
//! `veilpot_lib`:
//!
//! - chain indexer access and pool state reconciliation
//! - the local admin cache and the secret vault
//! - wallet signing and transaction submission
//! - the remote proof service with local fallback
//! - deposit and withdrawal flows

pub mod cache;
pub mod commands;
pub mod config;
pub mod flows;
pub mod indexer;
pub mod prover;
pub mod reconciler;
pub mod wallet;
