//! The Azure resource a service deploys to

use serde::{Deserialize, Serialize};

/// Identifies the managed cluster a service is deployed onto.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetResource {
    subscription_id: String,
    resource_group_name: String,
    resource_name: String,
}

impl TargetResource {
    pub fn new(
        subscription_id: impl Into<String>,
        resource_group_name: impl Into<String>,
        resource_name: impl Into<String>,
    ) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            resource_group_name: resource_group_name.into(),
            resource_name: resource_name.into(),
        }
    }

    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    pub fn resource_group_name(&self) -> &str {
        &self.resource_group_name
    }

    pub fn resource_name(&self) -> &str {
        &self.resource_name
    }

    /// Full ARM id of the managed cluster.
    pub fn resource_id(&self) -> String {
        kubernetes_service_rid(
            &self.subscription_id,
            &self.resource_group_name,
            &self.resource_name,
        )
    }
}

/// `/subscriptions/{sub}/resourceGroups/{rg}/providers/Microsoft.ContainerService/managedClusters/{name}`
pub fn kubernetes_service_rid(subscription_id: &str, resource_group: &str, name: &str) -> String {
    format!(
        "/subscriptions/{subscription_id}/resourceGroups/{resource_group}/providers/Microsoft.ContainerService/managedClusters/{name}"
    )
}
