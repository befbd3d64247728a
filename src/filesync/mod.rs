//! # Resource file synchronization.
//!
//! When a peer reports its instance up and the local instance is not, files
//! listed in the peer's resource status whose checksum differs from the local
//! copy are fetched from that peer and installed atomically.
//!
//! ```text
//! peer status (Up) ──► monitor compares checksums
//!                        │ differs, not in flight
//!                        ▼
//!                   Fetcher::fetch ──► install()
//!                                        ├─► verify sha256
//!                                        ├─► write temp file in target dir
//!                                        ├─► chmod / chown / mtime
//!                                        └─► rename over target
//! ```
//!
//! Failures are logged and skipped; the next status event retries.

mod http;
mod install;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::FetchError;
use crate::model::ObjectPath;

pub use http::HttpFetcher;
pub use install::install;

/// Identifies one resource file on a peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchRequest {
    pub peer: String,
    pub path: ObjectPath,
    pub rid: String,
    /// Absolute path of the file, identical on every node.
    pub name: String,
    /// Expected sha256, hex encoded.
    pub checksum: String,
}

/// Content and metadata of a fetched file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FetchedFile {
    pub content: Vec<u8>,
    pub mtime: Option<DateTime<Utc>>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub mode: Option<u32>,
}

/// Retrieves resource files from peers.
#[async_trait]
pub trait Fetcher: Send + Sync + 'static {
    async fn fetch(&self, req: &FetchRequest) -> Result<FetchedFile, FetchError>;
}

/// Fetches then installs one file.
pub async fn sync_file(fetcher: &dyn Fetcher, req: &FetchRequest) -> Result<(), FetchError> {
    let file = fetcher.fetch(req).await?;
    install(req.name.clone(), req.checksum.clone(), file).await
}
