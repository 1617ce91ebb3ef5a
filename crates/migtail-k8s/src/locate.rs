use futures::FutureExt;
use futures::future::BoxFuture;
use k8s_openapi::api::core::v1::Pod;
use kube::Api;
use kube::api::ListParams;
use tracing::debug;

use migtail_logs::{LocatorError, SourceLocator};
use migtail_types::{LogTarget, Source};

/// Resolves a [`LogTarget`] against the cluster.
///
/// A pod target is looked up directly; a selector target lists pods by a
/// label selector, one listing call per connect.
#[derive(Clone)]
pub struct KubeSourceLocator {
    client: kube::Client,
}

impl KubeSourceLocator {
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }
}

impl SourceLocator for KubeSourceLocator {
    fn resolve(&self, target: &LogTarget) -> BoxFuture<'static, Result<Vec<Source>, LocatorError>> {
        let client = self.client.clone();
        let target = target.clone();

        async move {
            match target {
                LogTarget::Pod { namespace, name } => {
                    let pods: Api<Pod> = Api::namespaced(client, &namespace);
                    let pod = pods
                        .get(&name)
                        .await
                        .map_err(|e| LocatorError::Discovery(e.to_string()))?;
                    Ok(vec![pod_to_source(pod, &namespace)])
                }
                LogTarget::Selector { namespace, labels } => {
                    let selector = labels
                        .iter()
                        .map(|(k, v)| format!("{}={}", k, v))
                        .collect::<Vec<_>>()
                        .join(",");

                    let pods: Api<Pod> = Api::namespaced(client, &namespace);
                    let list = pods
                        .list(&ListParams::default().labels(&selector))
                        .await
                        .map_err(|e| LocatorError::Discovery(e.to_string()))?;

                    debug!(selector = %selector, matched = list.items.len(), "resolved selector");

                    Ok(list
                        .items
                        .into_iter()
                        .map(|pod| pod_to_source(pod, &namespace))
                        .collect())
                }
            }
        }
        .boxed()
    }
}

fn pod_to_source(pod: Pod, namespace: &str) -> Source {
    let mut source = Source::new(pod.metadata.name.unwrap_or_default(), namespace);

    // Pin the container only when the pod has more than one; the API's
    // default is unambiguous otherwise.
    if let Some(spec) = pod.spec {
        if spec.containers.len() > 1 {
            source.container = spec.containers.into_iter().next().map(|c| c.name);
        }
    }

    source
}
