//! Concrete storage implementations with encryption at rest.
//! Uses AES-GCM with a key read from (or created in) a dedicated key file.

pub mod cipher;
pub mod csv_store;
pub mod key_provider;
