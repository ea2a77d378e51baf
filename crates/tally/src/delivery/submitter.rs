use async_trait::async_trait;
use std::sync::Arc;

use crate::error::SubmitError;
use crate::record::ResultPayload;

/// Sends one result payload to the remote endpoint.
///
/// Implementations must send the payload unchanged, `clientResultId`
/// included, so the server can deduplicate retries.
#[async_trait]
pub trait Submitter: Send + Sync {
    async fn submit(&self, payload: &ResultPayload) -> Result<(), SubmitError>;
}

#[async_trait]
impl<S: Submitter + ?Sized> Submitter for Arc<S> {
    async fn submit(&self, payload: &ResultPayload) -> Result<(), SubmitError> {
        (**self).submit(payload).await
    }
}
