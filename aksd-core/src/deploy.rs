//! Deploy orchestration for the AKS service target
//!
//! push image -> apply manifests -> verify rollout -> resolve endpoints ->
//! persist the most public endpoint. Steps run strictly in order and each one
//! emits a progress label before it starts.

use std::fmt;
use std::sync::Arc;

use k8s_openapi::api::apps::v1::Deployment;
use serde::Serialize;
use snafu::{OptionExt, ResultExt, ensure};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::config::ServiceConfig;
use crate::container::{ContainerPipeline, ServicePackage};
use crate::endpoints::{EndpointResolver, endpoint_url};
use crate::environment::EnvironmentStore;
use crate::error::{
    ApplyManifestsSnafu, ContainerDeploySnafu, MissingPackageOutputSnafu,
    MissingResourceGroupSnafu, Result, SaveEndpointSnafu,
};
use crate::kubectl::Kubectl;
use crate::poller::PollOptions;
use crate::progress::ProgressReporter;
use crate::rollout::RolloutVerifier;
use crate::target::TargetResource;

/// Service property holding the endpoint reported to the user.
pub const ENDPOINT_URL_PROPERTY: &str = "ENDPOINT_URL";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ServiceTargetKind {
    #[serde(rename = "aks")]
    AksTarget,
}

impl fmt::Display for ServiceTargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceTargetKind::AksTarget => f.write_str("aks"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployResult {
    pub package: ServicePackage,
    pub target_resource_id: String,
    pub kind: ServiceTargetKind,
    /// Rolled out deployment; absent when the manifests define none.
    pub details: Option<Deployment>,
    pub endpoints: Vec<String>,
}

/// A deploy needs a resource group to address the cluster.
pub fn validate_target_resource(target: &TargetResource) -> Result<()> {
    ensure!(
        !target.resource_group_name().is_empty(),
        MissingResourceGroupSnafu {
            resource: target.resource_name()
        }
    );
    Ok(())
}

/// Deploys services onto an AKS cluster whose context is already bootstrapped.
pub struct AksTarget {
    kubectl: Arc<dyn Kubectl>,
    env: Arc<dyn EnvironmentStore>,
    container: Arc<dyn ContainerPipeline>,
    poll: PollOptions,
    cancel: CancellationToken,
}

impl AksTarget {
    pub fn new(
        kubectl: Arc<dyn Kubectl>,
        env: Arc<dyn EnvironmentStore>,
        container: Arc<dyn ContainerPipeline>,
    ) -> Self {
        Self {
            kubectl,
            env,
            container,
            poll: PollOptions::default(),
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_poll_options(mut self, poll: PollOptions) -> Self {
        self.poll = poll;
        self
    }

    /// Waits started by this target stop when `cancel` fires.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[instrument(skip_all, fields(service = %service.name))]
    pub async fn deploy(
        &self,
        service: &ServiceConfig,
        package: Option<&ServicePackage>,
        target: &TargetResource,
        progress: &ProgressReporter,
    ) -> Result<DeployResult> {
        validate_target_resource(target)?;
        let package = package.context(MissingPackageOutputSnafu)?;

        self.container
            .deploy(service, package, target, progress)
            .await
            .context(ContainerDeploySnafu {
                service: &service.name,
            })?;

        // manifests may reference environment values
        self.kubectl.set_env(self.env.dotenv());

        progress.report("Applying k8s manifests");
        let manifests = service.deployment_path();
        self.kubectl
            .apply(&manifests, None)
            .await
            .context(ApplyManifestsSnafu {
                path: manifests.as_path(),
            })?;

        // A deploy does not have to contain a deployment object
        progress.report("Verifying deployment");
        let details = match RolloutVerifier::new(self.kubectl.as_ref(), self.poll, &self.cancel)
            .wait_for_deployment(service.deployment_name())
            .await
        {
            Ok(deployment) => Some(deployment),
            Err(err) if err.is_resource_not_found() => {
                info!(
                    filter = service.deployment_name(),
                    "no deployment found, continuing"
                );
                None
            }
            Err(err) => return Err(err),
        };

        progress.report("Fetching endpoints for AKS service");
        let endpoints = self.endpoints(service).await?;

        if let Some(most_public) = endpoints.last() {
            self.env.set_service_property(
                &service.name,
                ENDPOINT_URL_PROPERTY,
                endpoint_url(most_public),
            );
            self.env.save().await.context(SaveEndpointSnafu)?;
        }

        Ok(DeployResult {
            package: package.clone(),
            target_resource_id: target.resource_id(),
            kind: ServiceTargetKind::AksTarget,
            details,
            endpoints,
        })
    }

    /// Endpoints of an already deployed service.
    pub async fn endpoints(&self, service: &ServiceConfig) -> Result<Vec<String>> {
        let endpoints = EndpointResolver::new(self.kubectl.as_ref(), self.poll, &self.cancel)
            .resolve(
                service.service_name(),
                service.ingress_name(),
                service.ingress_relative_path(),
            )
            .await?;
        Ok(endpoints.iter().map(ToString::to_string).collect())
    }
}
