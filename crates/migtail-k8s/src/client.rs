use anyhow::{Context, Result};
use kube::config::{KubeConfigOptions, Kubeconfig};

/// Kubeconfig wrapper producing per-context clients.
pub struct KubeClient {
    kubeconfig: Kubeconfig,
    current_context: Option<String>,
}

impl KubeClient {
    /// Load the local kubeconfig
    pub fn new() -> Result<Self> {
        let kubeconfig =
            Kubeconfig::read().context("Failed to read kubeconfig. Is kubectl configured?")?;
        let current_context = kubeconfig.current_context.clone();

        Ok(Self {
            kubeconfig,
            current_context,
        })
    }

    /// Names of all contexts in the kubeconfig
    pub fn context_names(&self) -> Vec<String> {
        self.kubeconfig
            .contexts
            .iter()
            .map(|ctx| ctx.name.clone())
            .collect()
    }

    pub fn current_context(&self) -> Option<&str> {
        self.current_context.as_deref()
    }

    /// Create a `kube::Client` for the named context, or the kubeconfig's
    /// current context when `None`.
    pub async fn client_for_context(&self, context_name: Option<&str>) -> Result<kube::Client> {
        let context = context_name
            .map(str::to_string)
            .or_else(|| self.current_context.clone());

        let config = kube::Config::from_custom_kubeconfig(
            self.kubeconfig.clone(),
            &KubeConfigOptions {
                context: context.clone(),
                ..Default::default()
            },
        )
        .await
        .with_context(|| {
            format!(
                "Failed to create config for context: {}",
                context.as_deref().unwrap_or("<current>")
            )
        })?;

        let client = kube::Client::try_from(config).with_context(|| {
            format!(
                "Failed to create client for context: {}",
                context.as_deref().unwrap_or("<current>")
            )
        })?;

        Ok(client)
    }
}
