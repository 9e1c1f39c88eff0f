//! Endpoint resolution
//!
//! Turns the status of a matched Service and Ingress into the endpoint
//! strings reported to the user, in the form
//! `<url>, (<Service|Ingress>, Type: <type>)`. Service endpoints come first
//! and ingress endpoints are appended, so the last entry is the most public.

use std::borrow::Cow;
use std::fmt;
use std::net::IpAddr;

use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use snafu::ResultExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::error::{EndpointUrlSnafu, IngressEndpointsSnafu, Result, ServiceEndpointsSnafu};
use crate::kubectl::ResourceReader;
use crate::poller::{PollOptions, name_contains, wait_for_resource};

pub const SERVICE_TYPE_LOAD_BALANCER: &str = "LoadBalancer";
pub const SERVICE_TYPE_CLUSTER_IP: &str = "ClusterIP";

/// Which resource an endpoint was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointSource {
    Service,
    Ingress,
}

impl fmt::Display for EndpointSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointSource::Service => f.write_str("Service"),
            EndpointSource::Ingress => f.write_str("Ingress"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub url: String,
    pub source: EndpointSource,
    pub endpoint_type: &'static str,
}

impl Endpoint {
    fn service(url: String, endpoint_type: &'static str) -> Self {
        Self {
            url,
            source: EndpointSource::Service,
            endpoint_type,
        }
    }

    fn ingress(url: String) -> Self {
        Self {
            url,
            source: EndpointSource::Ingress,
            endpoint_type: SERVICE_TYPE_LOAD_BALANCER,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, ({}, Type: {})",
            self.url, self.source, self.endpoint_type
        )
    }
}

/// URL portion of a rendered endpoint: the text before the first comma.
pub fn endpoint_url(endpoint: &str) -> &str {
    endpoint
        .split_once(',')
        .map_or(endpoint, |(url, _)| url)
}

fn service_type(service: &Service) -> &str {
    service
        .spec
        .as_ref()
        .and_then(|spec| spec.type_.as_deref())
        .unwrap_or_default()
}

fn service_lb_ips(service: &Service) -> impl Iterator<Item = &str> {
    service
        .status
        .iter()
        .filter_map(|status| status.load_balancer.as_ref())
        .filter_map(|lb| lb.ingress.as_ref())
        .flatten()
        .map(|entry| entry.ip.as_deref().unwrap_or_default())
}

fn ingress_lb_ips(ingress: &Ingress) -> impl Iterator<Item = &str> {
    ingress
        .status
        .iter()
        .filter_map(|status| status.load_balancer.as_ref())
        .filter_map(|lb| lb.ingress.as_ref())
        .flatten()
        .map(|entry| entry.ip.as_deref().unwrap_or_default())
}

/// Services other than load balancers are usable as soon as they exist; a
/// load balancer needs at least one assigned IP.
pub fn is_service_ready(service: &Service) -> bool {
    if service_type(service) != SERVICE_TYPE_LOAD_BALANCER {
        return true;
    }
    service_lb_ips(service).any(|ip| !ip.is_empty())
}

pub fn is_ingress_ready(ingress: &Ingress) -> bool {
    ingress_lb_ips(ingress).any(|ip| !ip.is_empty())
}

/// Endpoints exposed by a ready service.
///
/// Cluster IPs pair with ports by position; extra entries on either side are
/// dropped.
pub fn endpoints_for_service(service: &Service) -> Vec<Endpoint> {
    match service_type(service) {
        SERVICE_TYPE_LOAD_BALANCER => service_lb_ips(service)
            .filter(|ip| !ip.is_empty())
            .map(|ip| {
                Endpoint::service(
                    format!("http://{}", url_host(ip)),
                    SERVICE_TYPE_LOAD_BALANCER,
                )
            })
            .collect(),
        SERVICE_TYPE_CLUSTER_IP => {
            let Some(spec) = service.spec.as_ref() else {
                return Vec::new();
            };
            let ips = spec.cluster_ips.as_deref().unwrap_or_default();
            let ports = spec.ports.as_deref().unwrap_or_default();
            if ips.len() != ports.len() {
                warn!(
                    cluster_ips = ips.len(),
                    ports = ports.len(),
                    "cluster IP and port counts differ, pairing by position"
                );
            }
            ips.iter()
                .zip(ports)
                .map(|(ip, port)| {
                    Endpoint::service(
                        format!("http://{}:{}", url_host(ip), port.port),
                        SERVICE_TYPE_CLUSTER_IP,
                    )
                })
                .collect()
        }
        other => {
            debug!(service_type = other, "no endpoints for service type");
            Vec::new()
        }
    }
}

/// Endpoints exposed by a ready ingress, one per load balancer entry.
///
/// Entry `i` uses the host of rule `i` when it names one and the entry IP
/// otherwise. `relative_path` is joined onto every base URL.
pub fn endpoints_for_ingress(ingress: &Ingress, relative_path: &str) -> Result<Vec<Endpoint>> {
    let spec = ingress.spec.as_ref();
    let protocol = if spec
        .and_then(|spec| spec.tls.as_ref())
        .is_some_and(|tls| !tls.is_empty())
    {
        "https"
    } else {
        "http"
    };
    let rules = spec
        .and_then(|spec| spec.rules.as_deref())
        .unwrap_or_default();
    if rules.len() < ingress_lb_ips(ingress).count() {
        warn!(
            rules = rules.len(),
            "ingress has more load balancer entries than rules, using entry IPs"
        );
    }

    let mut endpoints = Vec::new();
    for (index, ip) in ingress_lb_ips(ingress).enumerate() {
        let host = rules
            .get(index)
            .and_then(|rule| rule.host.as_deref())
            .map_or_else(|| url_host(ip), Cow::Borrowed);
        if host.is_empty() {
            continue;
        }
        let base = format!("{protocol}://{host}");
        let url = join_url_path(&base, relative_path).context(EndpointUrlSnafu { base })?;
        endpoints.push(Endpoint::ingress(url));
    }
    Ok(endpoints)
}

/// IPv6 literals are bracketed so they can carry a port in a URL; hostnames
/// and IPv4 addresses pass through.
fn url_host(host: &str) -> Cow<'_, str> {
    match host.parse::<IpAddr>() {
        Ok(IpAddr::V6(_)) => Cow::Owned(format!("[{host}]")),
        _ => Cow::Borrowed(host),
    }
}

/// Join `relative` onto the path of `base`, resolving `.` and `..` segments.
/// An empty `relative` leaves `base` untouched.
pub fn join_url_path(base: &str, relative: &str) -> Result<String, url::ParseError> {
    let mut url = Url::parse(base)?;
    if relative.is_empty() {
        return Ok(base.to_string());
    }

    let mut segments: Vec<String> = url
        .path_segments()
        .map(|segments| {
            segments
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    for segment in relative.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            segment => segments.push(segment.to_string()),
        }
    }

    let mut path = format!("/{}", segments.join("/"));
    if relative.ends_with('/') && !path.ends_with('/') {
        path.push('/');
    }
    url.set_path(&path);
    Ok(url.to_string())
}

/// Waits for the service and ingress of a deployed app and reads their
/// endpoints.
pub struct EndpointResolver<'a, R: ?Sized> {
    reader: &'a R,
    options: PollOptions,
    cancel: &'a CancellationToken,
}

impl<'a, R: ResourceReader + ?Sized> EndpointResolver<'a, R> {
    pub fn new(reader: &'a R, options: PollOptions, cancel: &'a CancellationToken) -> Self {
        Self {
            reader,
            options,
            cancel,
        }
    }

    pub async fn service_endpoints(&self, filter: &str) -> Result<Vec<Endpoint>> {
        let service: Service = wait_for_resource(
            self.reader,
            &self.options,
            self.cancel,
            name_contains(filter),
            is_service_ready,
        )
        .await?;
        Ok(endpoints_for_service(&service))
    }

    pub async fn ingress_endpoints(
        &self,
        filter: &str,
        relative_path: &str,
    ) -> Result<Vec<Endpoint>> {
        let ingress: Ingress = wait_for_resource(
            self.reader,
            &self.options,
            self.cancel,
            name_contains(filter),
            is_ingress_ready,
        )
        .await?;
        endpoints_for_ingress(&ingress, relative_path)
    }

    /// Service endpoints followed by ingress endpoints. A service or ingress
    /// that never appears contributes nothing; any other failure aborts.
    pub async fn resolve(
        &self,
        service_filter: &str,
        ingress_filter: &str,
        relative_path: &str,
    ) -> Result<Vec<Endpoint>> {
        let mut endpoints = match self.service_endpoints(service_filter).await {
            Ok(endpoints) => endpoints,
            Err(err) if err.is_resource_not_found() => {
                debug!(filter = service_filter, "no matching service");
                Vec::new()
            }
            Err(err) => return Err(err).context(ServiceEndpointsSnafu),
        };

        match self.ingress_endpoints(ingress_filter, relative_path).await {
            Ok(ingress) => endpoints.extend(ingress),
            Err(err) if err.is_resource_not_found() => {
                debug!(filter = ingress_filter, "no matching ingress");
            }
            Err(err) => return Err(err).context(IngressEndpointsSnafu),
        }

        Ok(endpoints)
    }
}
