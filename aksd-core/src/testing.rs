//! Test doubles for the collaborator traits and resource builders

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStatus};
use k8s_openapi::api::core::v1::{
    LoadBalancerIngress, LoadBalancerStatus, Service, ServicePort, ServiceSpec, ServiceStatus,
};
use k8s_openapi::api::networking::v1::{
    Ingress, IngressLoadBalancerIngress, IngressLoadBalancerStatus, IngressRule, IngressSpec,
    IngressStatus, IngressTLS,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::config::Kubeconfig;
use serde::Serialize;

use crate::config::ServiceConfig;
use crate::container::{ContainerPipeline, ServicePackage};
use crate::credentials::{ClusterCredentials, CredentialProvider};
use crate::environment::EnvironmentStore;
use crate::error::{Error, Result};
use crate::kubeconfig::KubeConfigStore;
use crate::kubectl::{
    CommandOutput, KubeCliFlags, KubectlSession, ManifestApplier, ResourceReader, ResourceType,
};
use crate::progress::ProgressReporter;
use crate::target::TargetResource;

fn command_error(command: &str, stderr: &str) -> Error {
    Error::Command {
        command: command.to_string(),
        code: Some(1),
        stderr: stderr.to_string(),
    }
}

/// A kubeconfig as `az aks get-credentials` prints it.
pub(crate) fn aks_kube_config(cluster: &str) -> String {
    format!(
        r"apiVersion: v1
kind: Config
clusters:
- name: {cluster}
  cluster:
    server: https://{cluster}.hcp.eastus.azmk8s.io:443
contexts:
- name: {cluster}
  context:
    cluster: {cluster}
    user: clusterUser_rg_{cluster}
users:
- name: clusterUser_rg_{cluster}
  user:
    token: secret
current-context: {cluster}
"
    )
}

pub(crate) fn json<T: Serialize>(resource: &T) -> serde_json::Value {
    serde_json::to_value(resource).unwrap()
}

fn meta(name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        ..ObjectMeta::default()
    }
}

pub(crate) fn deployment(name: &str, replicas: i32, available: i32) -> Deployment {
    Deployment {
        metadata: meta(name),
        spec: Some(DeploymentSpec {
            replicas: Some(replicas),
            ..DeploymentSpec::default()
        }),
        status: Some(DeploymentStatus {
            available_replicas: Some(available),
            ..DeploymentStatus::default()
        }),
    }
}

pub(crate) fn cluster_ip_service(name: &str, ips: &[&str], ports: &[i32]) -> Service {
    Service {
        metadata: meta(name),
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            cluster_ips: Some(ips.iter().map(|ip| (*ip).to_string()).collect()),
            ports: Some(
                ports
                    .iter()
                    .map(|port| ServicePort {
                        port: *port,
                        ..ServicePort::default()
                    })
                    .collect(),
            ),
            ..ServiceSpec::default()
        }),
        status: None,
    }
}

pub(crate) fn load_balancer_service(name: &str, ips: &[&str]) -> Service {
    Service {
        metadata: meta(name),
        spec: Some(ServiceSpec {
            type_: Some("LoadBalancer".to_string()),
            cluster_ips: Some(vec!["10.0.0.9".to_string()]),
            ports: Some(vec![ServicePort {
                port: 80,
                ..ServicePort::default()
            }]),
            ..ServiceSpec::default()
        }),
        status: Some(ServiceStatus {
            load_balancer: Some(LoadBalancerStatus {
                ingress: Some(
                    ips.iter()
                        .map(|ip| LoadBalancerIngress {
                            ip: Some((*ip).to_string()),
                            ..LoadBalancerIngress::default()
                        })
                        .collect(),
                ),
            }),
            ..ServiceStatus::default()
        }),
    }
}

pub(crate) fn ingress(name: &str, tls: bool, hosts: &[Option<&str>], ips: &[&str]) -> Ingress {
    Ingress {
        metadata: meta(name),
        spec: Some(IngressSpec {
            tls: tls.then(|| {
                vec![IngressTLS {
                    secret_name: Some(format!("{name}-tls")),
                    ..IngressTLS::default()
                }]
            }),
            rules: Some(
                hosts
                    .iter()
                    .map(|host| IngressRule {
                        host: host.map(str::to_string),
                        ..IngressRule::default()
                    })
                    .collect(),
            ),
            ..IngressSpec::default()
        }),
        status: Some(IngressStatus {
            load_balancer: Some(IngressLoadBalancerStatus {
                ingress: Some(
                    ips.iter()
                        .map(|ip| IngressLoadBalancerIngress {
                            ip: Some((*ip).to_string()),
                            ..IngressLoadBalancerIngress::default()
                        })
                        .collect(),
                ),
            }),
        }),
    }
}

/// One scripted answer to `list`.
#[derive(Debug, Clone)]
pub(crate) enum Scripted {
    Items(Vec<serde_json::Value>),
    Fail(&'static str),
}

/// Scripted kubectl. Each kind replays its queue; the last answer repeats.
#[derive(Debug, Default)]
pub(crate) struct FakeKubectl {
    lists: Mutex<HashMap<ResourceType, VecDeque<Scripted>>>,
    rollout_error: Mutex<Option<&'static str>>,
    apply_error: Mutex<Option<&'static str>>,
    use_context_error: Mutex<Option<&'static str>>,
    calls: Mutex<Vec<String>>,
    env: Mutex<HashMap<String, String>>,
}

impl FakeKubectl {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn script(&self, kind: ResourceType, answers: Vec<Scripted>) {
        self.lists.lock().unwrap().insert(kind, answers.into());
    }

    pub(crate) fn with_items(self, kind: ResourceType, items: Vec<serde_json::Value>) -> Self {
        self.script(kind, vec![Scripted::Items(items)]);
        self
    }

    pub(crate) fn fail_rollout(&self, stderr: &'static str) {
        *self.rollout_error.lock().unwrap() = Some(stderr);
    }

    pub(crate) fn fail_apply(&self, stderr: &'static str) {
        *self.apply_error.lock().unwrap() = Some(stderr);
    }

    pub(crate) fn fail_use_context(&self, stderr: &'static str) {
        *self.use_context_error.lock().unwrap() = Some(stderr);
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn env(&self) -> HashMap<String, String> {
        self.env.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ManifestApplier for FakeKubectl {
    async fn apply(&self, path: &Path, _flags: Option<&KubeCliFlags>) -> Result<CommandOutput> {
        self.record(format!("apply -f {}", path.display()));
        match *self.apply_error.lock().unwrap() {
            Some(stderr) => Err(command_error("kubectl apply", stderr)),
            None => Ok(CommandOutput::default()),
        }
    }

    async fn apply_with_stdin(
        &self,
        input: &str,
        _flags: Option<&KubeCliFlags>,
    ) -> Result<CommandOutput> {
        self.record(format!("apply -f - <<{}", input.trim()));
        match *self.apply_error.lock().unwrap() {
            Some(stderr) => Err(command_error("kubectl apply", stderr)),
            None => Ok(CommandOutput::default()),
        }
    }

    async fn create_namespace(
        &self,
        namespace: &str,
        flags: Option<&KubeCliFlags>,
    ) -> Result<CommandOutput> {
        let flags = flags.map(KubeCliFlags::to_args).unwrap_or_default();
        self.record(format!("create namespace {namespace} {}", flags.join(" ")));
        Ok(CommandOutput {
            stdout: format!("apiVersion: v1\nkind: Namespace\nmetadata:\n  name: {namespace}\n"),
            stderr: String::new(),
        })
    }
}

#[async_trait]
impl ResourceReader for FakeKubectl {
    async fn list(
        &self,
        kind: ResourceType,
        _flags: Option<&KubeCliFlags>,
    ) -> Result<Vec<serde_json::Value>> {
        self.record(format!("get {kind}"));
        let answer = {
            let mut lists = self.lists.lock().unwrap();
            match lists.get_mut(&kind) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };
        match answer {
            Some(Scripted::Items(items)) => Ok(items),
            Some(Scripted::Fail(stderr)) => Err(command_error("kubectl get", stderr)),
            None => Ok(Vec::new()),
        }
    }

    async fn rollout_status(
        &self,
        deployment: &str,
        _flags: Option<&KubeCliFlags>,
    ) -> Result<CommandOutput> {
        self.record(format!("rollout status deployment/{deployment}"));
        match *self.rollout_error.lock().unwrap() {
            Some(stderr) => Err(command_error("kubectl rollout status", stderr)),
            None => Ok(CommandOutput::default()),
        }
    }
}

#[async_trait]
impl KubectlSession for FakeKubectl {
    fn set_env(&self, env: HashMap<String, String>) {
        self.record(format!("set-env {}", env.len()));
        *self.env.lock().unwrap() = env;
    }

    fn set_kube_config(&self, path: &Path) {
        self.record(format!("set-kube-config {}", path.display()));
    }

    async fn use_context(&self, name: &str) -> Result<CommandOutput> {
        self.record(format!("use-context {name}"));
        match *self.use_context_error.lock().unwrap() {
            Some(stderr) => Err(command_error("kubectl config use-context", stderr)),
            None => Ok(CommandOutput::default()),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct FakeCredentials {
    pub(crate) kubeconfigs: Vec<Vec<u8>>,
    pub(crate) fail: bool,
    pub(crate) requests: Mutex<Vec<(String, String, String)>>,
}

impl FakeCredentials {
    pub(crate) fn for_cluster(cluster: &str) -> Self {
        Self {
            kubeconfigs: vec![aks_kube_config(cluster).into_bytes()],
            ..Self::default()
        }
    }
}

#[async_trait]
impl CredentialProvider for FakeCredentials {
    async fn get_user_credentials(
        &self,
        subscription_id: &str,
        resource_group: &str,
        cluster_name: &str,
    ) -> Result<ClusterCredentials> {
        self.requests.lock().unwrap().push((
            subscription_id.to_string(),
            resource_group.to_string(),
            cluster_name.to_string(),
        ));
        if self.fail {
            return Err(command_error("az aks get-credentials", "AuthorizationFailed"));
        }
        Ok(ClusterCredentials {
            kubeconfigs: self.kubeconfigs.clone(),
        })
    }
}

#[derive(Debug, Default)]
pub(crate) struct MemoryKubeConfigStore {
    pub(crate) merged: Mutex<Vec<(String, Kubeconfig)>>,
}

#[async_trait]
impl KubeConfigStore for MemoryKubeConfigStore {
    async fn add_or_update_context(&self, name: &str, config: Kubeconfig) -> Result<PathBuf> {
        self.merged.lock().unwrap().push((name.to_string(), config));
        Ok(PathBuf::from("/home/test/.kube/config"))
    }
}

#[derive(Debug, Default)]
pub(crate) struct MemoryEnvironment {
    pub(crate) values: Mutex<HashMap<String, String>>,
    pub(crate) saves: Mutex<usize>,
    pub(crate) fail_save: bool,
}

#[async_trait]
impl EnvironmentStore for MemoryEnvironment {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().unwrap().get(key).cloned()
    }

    fn dotenv(&self) -> HashMap<String, String> {
        self.values.lock().unwrap().clone()
    }

    fn set(&self, key: &str, value: &str) {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }

    async fn save(&self) -> Result<()> {
        if self.fail_save {
            return Err(Error::WriteFile {
                path: PathBuf::from(".env"),
                source: std::io::Error::other("disk full"),
            });
        }
        *self.saves.lock().unwrap() += 1;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub(crate) struct FakeContainer {
    pub(crate) pushed: Mutex<Vec<String>>,
    pub(crate) fail: bool,
}

#[async_trait]
impl ContainerPipeline for FakeContainer {
    async fn deploy(
        &self,
        _service: &ServiceConfig,
        package: &ServicePackage,
        _target: &TargetResource,
        progress: &ProgressReporter,
    ) -> Result<()> {
        progress.report("Pushing container image");
        if self.fail {
            return Err(command_error("docker push", "denied: requested access"));
        }
        self.pushed
            .lock()
            .unwrap()
            .push(package.published_image().to_string());
        Ok(())
    }
}
