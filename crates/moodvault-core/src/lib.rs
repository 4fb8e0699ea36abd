//! Core abstractions for Moodvault: emotion labels, the encrypted record store
//! contract, the classifier boundary, and the journal service tying them together.
//! This crate stays free of crypto and I/O so every front end can share it.

pub mod classify;
pub mod emotion;
pub mod journal;
pub mod store;
