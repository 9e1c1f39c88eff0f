//! Container pipeline backed by the docker CLI

use aksd_core::ProgressReporter;
use aksd_core::ServiceConfig;
use aksd_core::ServicePackage;
use aksd_core::TargetResource;
use aksd_core::container::ContainerPipeline;
use aksd_core::exec::run_command;
use async_trait::async_trait;
use tracing::info;

/// Tags the local image with its registry reference and pushes it.
#[derive(Debug, Clone)]
pub struct DockerPush {
    program: String,
}

impl DockerPush {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl ContainerPipeline for DockerPush {
    async fn deploy(
        &self,
        service: &ServiceConfig,
        package: &ServicePackage,
        target: &TargetResource,
        progress: &ProgressReporter,
    ) -> aksd_core::Result<()> {
        let remote = package.published_image();

        if remote != package.image {
            progress.report("Tagging container image");
            let args = vec!["tag".to_string(), package.image.clone(), remote.to_string()];
            run_command(&self.program, &args, &[], None).await?;
        }

        progress.report("Pushing container image");
        let args = vec!["push".to_string(), remote.to_string()];
        run_command(&self.program, &args, &[], None).await?;

        info!(
            service = %service.name,
            image = remote,
            cluster = target.resource_name(),
            "image pushed"
        );
        Ok(())
    }
}
