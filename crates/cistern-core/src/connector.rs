//! Connector capability for opening raw connections

use std::sync::Arc;

use async_trait::async_trait;

use crate::{Connection, Result};

/// Opens new raw connections on demand.
///
/// This is the one capability the pool requires from the embedding
/// application. An open failure surfaces to whichever caller triggered it;
/// the pool itself never retries.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open one new raw connection, or fail
    async fn open(&self) -> Result<Arc<dyn Connection>>;
}

#[async_trait]
impl<T: Connector> Connector for Arc<T> {
    async fn open(&self) -> Result<Arc<dyn Connection>> {
        (**self).open().await
    }
}
