use futures::future::BoxFuture;
use futures::{AsyncReadExt, FutureExt, StreamExt};
use k8s_openapi::api::core::v1::Pod;
use kube::Api;
use kube::api::LogParams;
use tracing::debug;

use migtail_logs::{ChunkStream, LogTransport, TransportError};
use migtail_types::{FetchOptions, Source};

const READ_CHUNK: usize = 8192;

/// Chunked log transport over the pod log subresource.
///
/// One call opens one follow stream; the session layer owns cancellation,
/// so the stream here just reads until end-of-stream or error.
#[derive(Clone)]
pub struct KubeLogTransport {
    client: kube::Client,
}

impl KubeLogTransport {
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }
}

impl LogTransport for KubeLogTransport {
    fn open(
        &self,
        source: &Source,
        options: &FetchOptions,
    ) -> BoxFuture<'static, Result<ChunkStream, TransportError>> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), &source.namespace);
        let name = source.id.clone();
        let params = LogParams {
            follow: options.follow,
            container: source.container.clone(),
            tail_lines: options.tail_lines,
            limit_bytes: options.limit_bytes,
            ..Default::default()
        };

        async move {
            debug!(pod = %name, follow = params.follow, "opening log stream");
            let reader = api
                .log_stream(&name, &params)
                .await
                .map_err(|e| TransportError::Connect(e.to_string()))?;

            let stream = futures::stream::try_unfold(reader, |mut reader| async move {
                let mut buf = vec![0u8; READ_CHUNK];
                let n = reader
                    .read(&mut buf)
                    .await
                    .map_err(|e| TransportError::Read(e.to_string()))?;
                if n == 0 {
                    Ok(None)
                } else {
                    buf.truncate(n);
                    Ok(Some((buf, reader)))
                }
            })
            .boxed();

            Ok(stream)
        }
        .boxed()
    }
}
