//! Deployment rollout verification

use k8s_openapi::api::apps::v1::Deployment;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::Result;
use crate::kubectl::{KubeResource, ResourceReader};
use crate::poller::{PollOptions, name_contains, wait_for_resource};

/// A deployment is rolled out when every desired replica is available.
/// Missing counts are treated as zero.
pub fn is_rollout_ready(deployment: &Deployment) -> bool {
    let desired = deployment
        .spec
        .as_ref()
        .and_then(|spec| spec.replicas)
        .unwrap_or(0);
    let available = deployment
        .status
        .as_ref()
        .and_then(|status| status.available_replicas)
        .unwrap_or(0);
    available == desired
}

/// Waits for a deployment to appear and finish rolling out.
pub struct RolloutVerifier<'a, R: ?Sized> {
    reader: &'a R,
    options: PollOptions,
    cancel: &'a CancellationToken,
}

impl<'a, R: ResourceReader + ?Sized> RolloutVerifier<'a, R> {
    pub fn new(reader: &'a R, options: PollOptions, cancel: &'a CancellationToken) -> Self {
        Self {
            reader,
            options,
            cancel,
        }
    }

    /// Poll for a ready deployment whose name contains `filter`, then confirm
    /// with `kubectl rollout status`.
    pub async fn wait_for_deployment(&self, filter: &str) -> Result<Deployment> {
        let deployment: Deployment = wait_for_resource(
            self.reader,
            &self.options,
            self.cancel,
            name_contains(filter),
            is_rollout_ready,
        )
        .await?;

        let name = deployment.resource_name();
        self.reader.rollout_status(name, None).await?;
        info!(deployment = name, "rollout complete");

        Ok(deployment)
    }
}
