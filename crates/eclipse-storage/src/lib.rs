//! eclipse-storage: where snapshots come from and where they go
//!
//! - `persistence`: the local state adapter (memory and directory-backed)
//! - `transport`: the remote byte store (OpenDAL)
//! - `operator`: WebDAV operator construction from config

pub mod operator;
pub mod persistence;
pub mod transport;

pub use operator::{build_from_remote_config, build_operator, WebdavConfig};
pub use persistence::{DirectoryStore, MemoryPersistence, PersistenceAdapter};
pub use transport::{OpendalTransport, TransportClient};
