//! Remote emotion classifiers.

pub mod http;
