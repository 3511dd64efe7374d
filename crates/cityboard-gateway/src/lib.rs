//! HTTP request gateway and credential persistence for Cityboard.
//!
//! The orchestrators only need "send GET/POST, get parsed JSON or an error".
//! `HttpGateway` is that seam; `ReqwestGateway` is the production backend.
//! `CredentialSlot` keeps the remembered API key in an injected key-value store.

pub mod error;
pub mod http;
pub mod store;
pub mod url;

pub use error::GatewayError;
pub use http::{HttpGateway, ReqwestGateway};
pub use store::{CredentialSlot, KeyValueStore, MemoryStore, TomlFileStore};
pub use url::{build_preview_url, trim_base_url};
