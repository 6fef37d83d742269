//! Remote byte transport: upload and download of whole sync files.

use async_trait::async_trait;
use eclipse_core::{EclipseError, EclipseResult};
use opendal::{ErrorKind, Operator};
use tracing::{debug, info};

#[async_trait]
pub trait TransportClient: Send + Sync {
    /// Store `bytes` at `path`, replacing any previous content. Fails loudly on
    /// any non-success response.
    async fn upload(&self, path: &str, bytes: Vec<u8>) -> EclipseResult<()>;

    /// Fetch the content at `path`. A missing file is `RemoteNotFound`.
    async fn download(&self, path: &str) -> EclipseResult<Vec<u8>>;
}

/// [`TransportClient`] over any OpenDAL operator (WebDAV in production,
/// the memory service in tests).
#[derive(Clone)]
pub struct OpendalTransport {
    op: Operator,
}

impl OpendalTransport {
    pub fn new(op: Operator) -> Self {
        Self { op }
    }

    pub fn operator(&self) -> &Operator {
        &self.op
    }
}

#[async_trait]
impl TransportClient for OpendalTransport {
    async fn upload(&self, path: &str, bytes: Vec<u8>) -> EclipseResult<()> {
        let len = bytes.len();
        self.op
            .write(path, bytes)
            .await
            .map_err(|e| EclipseError::Transport(format!("upload {path}: {e}")))?;
        info!(path, bytes = len, "uploaded");
        Ok(())
    }

    async fn download(&self, path: &str) -> EclipseResult<Vec<u8>> {
        match self.op.read(path).await {
            Ok(buf) => {
                let bytes = buf.to_vec();
                debug!(path, bytes = bytes.len(), "downloaded");
                Ok(bytes)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(EclipseError::RemoteNotFound(path.to_string()))
            }
            Err(e) => Err(EclipseError::Transport(format!("download {path}: {e}"))),
        }
    }
}
