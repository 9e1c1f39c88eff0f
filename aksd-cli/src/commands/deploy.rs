//! `aksd deploy`

use std::path::Path;

use aksd_core::deploy::validate_target_resource;
use aksd_core::{ProgressReporter, ServicePackage};
use anyhow::{Context, Result};

use super::{CommandContext, print_progress};
use crate::Cli;

pub async fn handle_deploy(
    cli: &Cli,
    service_path: &Path,
    image: &str,
    remote_image: Option<&str>,
) -> Result<()> {
    let ctx = CommandContext::load(cli, service_path)?;
    validate_target_resource(&ctx.target).context("validating target resource")?;

    println!(
        "🚀 Deploying service '{}' to AKS cluster '{}'",
        ctx.service.name,
        ctx.target.resource_name()
    );

    println!("🔑 Configuring cluster context...");
    ctx.bootstrapper()?
        .ensure()
        .await
        .context("failed configuring the k8s context")?;

    let package = ServicePackage {
        image: image.to_string(),
        remote_image: remote_image.map(str::to_string),
    };
    let (progress, receiver) = ProgressReporter::channel(ctx.settings.progress_capacity);
    let printer = tokio::spawn(print_progress(receiver));

    let result = ctx
        .aks_target()
        .deploy(&ctx.service, Some(&package), &ctx.target, &progress)
        .await;
    drop(progress);
    printer.await.context("progress printer stopped")?;
    let result = result.with_context(|| format!("failed deploying '{}'", ctx.service.name))?;

    println!("✅ Deployed {}", result.package.published_image());
    println!("   {}", result.target_resource_id);
    if result.details.is_none() {
        println!("ℹ️  No deployment found for '{}'", ctx.service.deployment_name());
    }
    if result.endpoints.is_empty() {
        println!("ℹ️  No endpoints found");
    }
    for endpoint in &result.endpoints {
        println!("🌐 {endpoint}");
    }
    Ok(())
}
