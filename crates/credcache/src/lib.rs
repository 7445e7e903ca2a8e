//! credcache - Encrypted local cache for short-lived cloud credentials
//!
//! Temporary credentials fetched from an issuer are cached on disk, every
//! secret field encrypted under a user password, and handed back out as
//! shell exports, docker flags, IDE env lines, a credentials-file profile
//! or a JSON dump. Expired entries are swept before every read.

pub mod cipher;
pub mod error;
pub mod profile;
pub mod render;
pub mod store;
pub mod sweep;
pub mod vault;

pub use error::{Result, VaultError};
pub use render::OutputFormat;
pub use vault::{Credentials, FetchReport, NewCredentials, OutputKey, Vault};
