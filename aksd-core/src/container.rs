//! Container image hand-off
//!
//! Building and pushing images is owned by an external pipeline; the deploy
//! flow only forwards the package and a progress reporter to it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ServiceConfig;
use crate::error::Result;
use crate::progress::ProgressReporter;
use crate::target::TargetResource;

/// Output of the package step: the image to ship.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePackage {
    /// Locally built image reference
    pub image: String,
    /// Registry reference the image is pushed as, when it differs
    #[serde(default)]
    pub remote_image: Option<String>,
}

impl ServicePackage {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            remote_image: None,
        }
    }

    /// Reference the cluster pulls.
    pub fn published_image(&self) -> &str {
        self.remote_image.as_deref().unwrap_or(&self.image)
    }
}

/// Pushes a packaged image so the cluster can pull it.
#[async_trait]
pub trait ContainerPipeline: Send + Sync {
    async fn deploy(
        &self,
        service: &ServiceConfig,
        package: &ServicePackage,
        target: &TargetResource,
        progress: &ProgressReporter,
    ) -> Result<()>;
}
