use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use tokio::task::AbortHandle;
use tonic::metadata::MetadataMap;
use tracing::instrument;
use wirebind::MethodDescriptor;

use super::{ByteStream, Channel};
use crate::config::DEFAULT_TIMEOUT;
use crate::credentials::CallCredentials;
use crate::error::{RpcError, TransportErrorKind};
use crate::server::ServiceRouter;

const LOCAL_TARGET: &str = "local://in-process";

/// In-process channel that hands requests straight to a [`ServiceRouter`].
///
/// Requests still go through serialization so both sides see exactly the bytes a
/// network peer would. Every call runs on its own task.
#[derive(Debug, Clone)]
pub struct LocalChannel {
    router: Arc<ServiceRouter>,
    call_credentials: CallCredentials,
    timeout: Duration,
}

/// Aborts the dispatch task if the caller stops waiting for it.
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl LocalChannel {
    pub fn new(router: Arc<ServiceRouter>) -> Self {
        Self {
            router,
            call_credentials: CallCredentials::none(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_call_credentials(mut self, call_credentials: CallCredentials) -> Self {
        self.call_credentials = call_credentials;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn metadata(&self) -> Result<MetadataMap, RpcError> {
        let mut metadata = MetadataMap::new();
        self.call_credentials.apply(&mut metadata)?;
        Ok(metadata)
    }

    fn timed_out(&self, context: &str) -> RpcError {
        RpcError::transport(
            TransportErrorKind::Timeout,
            context,
            format!("no reply within {} ms", self.timeout.as_millis()),
        )
    }
}

#[async_trait]
impl Channel for LocalChannel {
    fn target(&self) -> &str {
        LOCAL_TARGET
    }

    #[instrument(level = "debug", skip(self, payload), fields(method = method.name))]
    async fn call(
        &self,
        method: &'static MethodDescriptor,
        payload: Bytes,
    ) -> Result<Bytes, RpcError> {
        let metadata = self.metadata()?;
        let router = Arc::clone(&self.router);
        let path = method.path();

        let task =
            tokio::spawn(async move { router.dispatch_unary(&path, metadata, payload).await });
        let _guard = AbortOnDrop(task.abort_handle());

        match tokio::time::timeout(self.timeout, task).await {
            Err(_) => Err(self.timed_out("local call")),
            Ok(Err(join_error)) => Err(RpcError::from_internal_error(join_error, "local call")),
            Ok(Ok(result)) => result.map_err(|status| RpcError::from_status(status, "local call")),
        }
    }

    #[instrument(level = "debug", skip(self, payload), fields(method = method.name))]
    async fn server_stream(
        &self,
        method: &'static MethodDescriptor,
        payload: Bytes,
    ) -> Result<ByteStream, RpcError> {
        let metadata = self.metadata()?;
        let router = Arc::clone(&self.router);
        let path = method.path();

        let open = async move { router.dispatch_server_stream(&path, metadata, payload).await };
        let stream = tokio::time::timeout(self.timeout, open)
            .await
            .map_err(|_| self.timed_out("local server stream"))?
            .map_err(|status| RpcError::from_status(status, "local server stream"))?;

        Ok(stream
            .map(|item| {
                item.map_err(|status| RpcError::from_status(status, "local server stream"))
            })
            .boxed())
    }
}
