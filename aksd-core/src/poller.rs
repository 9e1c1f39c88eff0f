//! Bounded polling for cluster resources
//!
//! Lists a resource kind until an object passes both the name filter and the
//! readiness check, or the deadline passes. Listing errors and undecodable
//! objects abort immediately; they do not consume the remaining budget.

use std::time::Duration;

use snafu::ResultExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::error::{
    CancelledSnafu, DecodeResourceSnafu, ListResourcesSnafu, ResourceNotFoundSnafu,
    ResourceNotReadySnafu, Result,
};
use crate::kubectl::{KubeResource, ResourceReader};

/// Constant-interval retry budget for one wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollOptions {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(10 * 60),
        }
    }
}

/// Name filter used by every wait: substring match on `metadata.name`.
pub fn name_contains<K: KubeResource>(filter: &str) -> impl Fn(&K) -> bool + '_ {
    move |resource: &K| resource.resource_name().contains(filter)
}

/// Poll until an object of kind `K` matches `is_match` and satisfies
/// `is_ready`, returning the first such object.
///
/// When the deadline passes, `ResourceNotFound` means nothing ever matched the
/// filter and `ResourceNotReady` names the last match that never got ready.
#[instrument(skip_all, fields(kind = %K::RESOURCE_TYPE))]
pub async fn wait_for_resource<K, R, M, F>(
    reader: &R,
    options: &PollOptions,
    cancel: &CancellationToken,
    is_match: M,
    is_ready: F,
) -> Result<K>
where
    K: KubeResource,
    R: ResourceReader + ?Sized,
    M: Fn(&K) -> bool,
    F: Fn(&K) -> bool,
{
    let kind = K::RESOURCE_TYPE;
    let deadline = Instant::now() + options.timeout;
    let mut last_match: Option<String> = None;

    loop {
        if cancel.is_cancelled() {
            return CancelledSnafu { kind }.fail();
        }

        let items = reader
            .list(kind, None)
            .await
            .context(ListResourcesSnafu { kind })?;

        for item in items {
            let resource: K = serde_json::from_value(item).context(DecodeResourceSnafu { kind })?;
            if !is_match(&resource) {
                continue;
            }
            if is_ready(&resource) {
                debug!(name = resource.resource_name(), "resource ready");
                return Ok(resource);
            }
            last_match = Some(resource.resource_name().to_string());
        }

        let now = Instant::now();
        if now >= deadline {
            return match last_match {
                Some(name) => ResourceNotReadySnafu {
                    kind,
                    name,
                    timeout: options.timeout,
                }
                .fail(),
                None => ResourceNotFoundSnafu { kind }.fail(),
            };
        }

        let pause = options.interval.min(deadline - now);
        debug!(?pause, pending = ?last_match, "resource not ready, retrying");
        tokio::select! {
            () = cancel.cancelled() => return CancelledSnafu { kind }.fail(),
            () = tokio::time::sleep(pause) => {}
        }
    }
}
