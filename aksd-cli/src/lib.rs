//! aksd - deploy a service to AKS and report its endpoints

pub mod commands;
pub mod docker;
pub mod settings;
pub mod telemetry;

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[clap(
    name = "aksd",
    version,
    about = "Deploy container images and Kubernetes manifests to AKS"
)]
pub struct Cli {
    /// Dotenv file holding the environment (cluster name, resource group, ...)
    #[clap(long, global = true, default_value = ".env", env = "AKSD_ENV_FILE")]
    pub env_file: PathBuf,

    /// Azure subscription id (default: AZURE_SUBSCRIPTION_ID from the env file)
    #[clap(long, global = true)]
    pub subscription: Option<String>,

    /// Resource group of the cluster (default: AZURE_RESOURCE_GROUP from the env file)
    #[clap(long, global = true)]
    pub resource_group: Option<String>,

    /// AKS cluster name (default: AZURE_AKS_CLUSTER_NAME from the env file)
    #[clap(long, global = true)]
    pub cluster: Option<String>,

    /// Settings file (default: the per-user aksd settings)
    #[clap(long, global = true, env = "AKSD_SETTINGS")]
    pub settings: Option<PathBuf>,

    /// Debug logging
    #[clap(short, long, global = true)]
    pub verbose: bool,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Parser, Clone)]
pub enum Commands {
    /// Push the image, apply the manifests and report the service endpoints
    Deploy {
        /// Service configuration (yaml)
        #[clap(short, long)]
        service: PathBuf,

        /// Locally built image
        #[clap(short, long)]
        image: String,

        /// Registry reference to push the image as
        #[clap(long)]
        remote_image: Option<String>,
    },

    /// Print the endpoints of an already deployed service
    Endpoints {
        #[clap(short, long)]
        service: PathBuf,
    },

    /// Configure the cluster context and namespace only
    #[clap(alias = "postprovision")]
    Context {
        #[clap(short, long)]
        service: PathBuf,
    },
}
