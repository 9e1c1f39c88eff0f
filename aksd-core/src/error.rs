//! Error type shared by every aksd-core component
//!
//! One enum, one variant per failure the deploy flow can surface. Variants
//! that wrap another failure keep it as the boxed `source` so the full chain
//! reaches the user.

use std::path::PathBuf;
use std::time::Duration;

use snafu::Snafu;

use crate::bootstrap::BootstrapState;
use crate::kubectl::ResourceType;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors produced while bootstrapping a cluster context or deploying to it.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// No resource of `kind` matched before the poll deadline.
    ///
    /// Callers treat this as "the resource was never created" and may choose
    /// to continue without it.
    #[snafu(display("cannot find resource for '{kind}'"))]
    ResourceNotFound { kind: ResourceType },

    /// A matching resource exists but never satisfied its readiness check.
    #[snafu(display("resource '{kind}/{name}' is not ready after {timeout:?}"))]
    ResourceNotReady {
        kind: ResourceType,
        name: String,
        timeout: Duration,
    },

    #[snafu(display("waiting for '{kind}' was cancelled"))]
    Cancelled { kind: ResourceType },

    #[snafu(display("failed waiting for resource '{kind}'"))]
    ListResources {
        kind: ResourceType,
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
    },

    #[snafu(display("failed decoding '{kind}' resource"))]
    DecodeResource {
        kind: ResourceType,
        source: serde_json::Error,
    },

    #[snafu(display(
        "missing resource group name for resource '{resource}'. Pass --resource-group or set AZURE_RESOURCE_GROUP in the env file"
    ))]
    MissingResourceGroup { resource: String },

    #[snafu(display("missing package output"))]
    MissingPackageOutput,

    #[snafu(display(
        "could not determine AKS cluster, ensure {variable} is set as an output of your infrastructure"
    ))]
    MissingClusterName { variable: &'static str },

    #[snafu(display(
        "failed retrieving cluster admin credentials. Ensure your cluster has been configured to support admin credentials"
    ))]
    FetchCredentials {
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
    },

    #[snafu(display(
        "cluster credentials is empty. Ensure your cluster has been configured to support admin credentials"
    ))]
    EmptyCredentials,

    #[snafu(display("kube config is not valid utf-8"))]
    KubeConfigEncoding { source: std::string::FromUtf8Error },

    #[snafu(display("failed parsing kube config. Ensure your configuration is valid yaml"))]
    ParseKubeConfig {
        source: kube::config::KubeconfigError,
    },

    #[snafu(display("failed serializing kube config"))]
    SerializeKubeConfig { source: serde_yaml::Error },

    #[snafu(display("kube config for cluster '{cluster}' does not define a context"))]
    MissingContext { cluster: String },

    #[snafu(display("failed adding/updating kube context '{name}'"))]
    UpdateKubeContext {
        name: String,
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
    },

    #[snafu(display("failed setting kube context '{name}'. Ensure the specified context exists"))]
    UseKubeContext {
        name: String,
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
    },

    #[snafu(display("could not determine the home directory for the kube config store"))]
    NoHomeDirectory,

    #[snafu(display("failed creating kube namespace '{namespace}'"))]
    CreateNamespace {
        namespace: String,
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
    },

    #[snafu(display("failed applying kube namespace '{namespace}'"))]
    ApplyNamespace {
        namespace: String,
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
    },

    #[snafu(display("failed applying kube manifests from {}", path.display()))]
    ApplyManifests {
        path: PathBuf,
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
    },

    #[snafu(display("failed deploying container image for service '{service}'"))]
    ContainerDeploy {
        service: String,
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
    },

    #[snafu(display("failed retrieving service endpoints"))]
    ServiceEndpoints {
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
    },

    #[snafu(display("failed retrieving ingress endpoints"))]
    IngressEndpoints {
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
    },

    #[snafu(display("failed constructing service endpoints from '{base}'"))]
    EndpointUrl {
        base: String,
        source: url::ParseError,
    },

    #[snafu(display("failed updating environment with endpoint url"))]
    SaveEndpoint {
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
    },

    /// Wraps any failure of the cluster context bootstrap with the state the
    /// machine was trying to reach.
    #[snafu(display("cluster context bootstrap failed before reaching {state}"))]
    Bootstrap {
        state: BootstrapState,
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
    },

    #[snafu(display("`{command}` exited with {code:?}: {stderr}"))]
    Command {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[snafu(display("failed to run `{command}`"))]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[snafu(display("failed to read {}", path.display()))]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("failed to write {}", path.display()))]
    WriteFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("failed to parse service config {}", path.display()))]
    ParseServiceConfig {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[snafu(display("invalid line {line} in {}: {content}", path.display()))]
    InvalidEnvLine {
        path: PathBuf,
        line: usize,
        content: String,
    },
}

impl Error {
    /// True for the distinguished "resource never appeared" condition.
    pub fn is_resource_not_found(&self) -> bool {
        matches!(self, Error::ResourceNotFound { .. })
    }
}
