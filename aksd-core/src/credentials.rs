//! Cluster credential retrieval

use async_trait::async_trait;

use crate::error::Result;
use crate::exec::run_command;

/// Kubeconfig documents returned for a cluster login.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterCredentials {
    pub kubeconfigs: Vec<Vec<u8>>,
}

/// Fetches user credentials for a managed cluster.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn get_user_credentials(
        &self,
        subscription_id: &str,
        resource_group: &str,
        cluster_name: &str,
    ) -> Result<ClusterCredentials>;
}

/// Credential provider backed by `az aks get-credentials`.
#[derive(Debug, Clone)]
pub struct AzCliCredentials {
    program: String,
}

impl AzCliCredentials {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn args(subscription_id: &str, resource_group: &str, cluster_name: &str) -> Vec<String> {
        let mut args: Vec<String> = ["aks", "get-credentials"]
            .into_iter()
            .map(String::from)
            .collect();
        if !subscription_id.is_empty() {
            args.push("--subscription".to_string());
            args.push(subscription_id.to_string());
        }
        args.extend([
            "--resource-group".to_string(),
            resource_group.to_string(),
            "--name".to_string(),
            cluster_name.to_string(),
            // print to stdout instead of merging into ~/.kube/config
            "--file".to_string(),
            "-".to_string(),
        ]);
        args
    }
}

#[async_trait]
impl CredentialProvider for AzCliCredentials {
    async fn get_user_credentials(
        &self,
        subscription_id: &str,
        resource_group: &str,
        cluster_name: &str,
    ) -> Result<ClusterCredentials> {
        let args = Self::args(subscription_id, resource_group, cluster_name);
        let output = run_command(&self.program, &args, &[], None).await?;

        let kubeconfigs = if output.stdout.trim().is_empty() {
            Vec::new()
        } else {
            vec![output.stdout.into_bytes()]
        };
        Ok(ClusterCredentials { kubeconfigs })
    }
}
