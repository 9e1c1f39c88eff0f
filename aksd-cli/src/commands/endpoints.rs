//! `aksd endpoints`

use std::path::Path;

use anyhow::{Context, Result};

use super::CommandContext;
use crate::Cli;

pub async fn handle_endpoints(cli: &Cli, service_path: &Path) -> Result<()> {
    let ctx = CommandContext::load(cli, service_path)?;

    ctx.bootstrapper()?
        .ensure()
        .await
        .context("failed configuring the k8s context")?;

    let endpoints = ctx
        .aks_target()
        .endpoints(&ctx.service)
        .await
        .with_context(|| format!("failed resolving endpoints for '{}'", ctx.service.name))?;

    if endpoints.is_empty() {
        println!("ℹ️  No endpoints found for '{}'", ctx.service.name);
    }
    for endpoint in endpoints {
        println!("🌐 {endpoint}");
    }
    Ok(())
}
