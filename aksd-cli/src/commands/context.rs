//! `aksd context`: the post-provision hook on its own

use std::path::Path;

use aksd_core::LifecycleEvent;
use anyhow::{Context, Result};

use super::CommandContext;
use crate::Cli;

pub async fn handle_context(cli: &Cli, service_path: &Path) -> Result<()> {
    let ctx = CommandContext::load(cli, service_path)?;

    println!("🔑 Configuring k8s context for '{}'", ctx.service.name);
    let outcome = ctx
        .bootstrapper()?
        .run(LifecycleEvent::PostProvision)
        .await
        .context("failed configuring the k8s context")?;

    println!("✅ kubeconfig: {}", outcome.kube_config.display());
    println!("✅ namespace: {}", outcome.namespace);
    Ok(())
}
