// Copyright (C) 2025 The Android Open Source Project
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Policy Provider Coordinator
//!
//! Discovers installed external policy-provider services and runs one
//! best-effort collection round. Connection results re-enter the service
//! worker queue as messages; the worker tracks the outstanding set and
//! settles the round when it drains.

use crate::common::{ComponentName, ServiceDescriptor};
use crate::platform::{PermissionGate, ProviderConnector};
use crate::service::ServiceRequest;
use log::{debug, info, warn};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;

pub(crate) struct PolicyProviderCoordinator {
    connector: Arc<dyn ProviderConnector>,
    permissions: Arc<dyn PermissionGate>,
}

impl PolicyProviderCoordinator {
    pub(crate) fn new(
        connector: Arc<dyn ProviderConnector>,
        permissions: Arc<dyn PermissionGate>,
    ) -> Self {
        Self { connector, permissions }
    }

    /// Installed provider services that are enabled and hold the control
    /// permission.
    pub(crate) fn eligible_providers(&self) -> Vec<ServiceDescriptor> {
        self.connector
            .query_installed_providers()
            .into_iter()
            .filter(|descriptor| {
                if !descriptor.enabled {
                    debug!("skipping disabled provider {}", descriptor.package_name);
                    return false;
                }
                if !self.permissions.holds_control_permission(&descriptor.package_name) {
                    info!(
                        "skipping provider {} without control permission",
                        descriptor.package_name
                    );
                    return false;
                }
                true
            })
            .collect()
    }

    /// Connects to every candidate. Each connection outcome, success or
    /// failure, is posted to `queue` as a [`ServiceRequest::ProviderResponse`].
    /// Returns the pending set the worker tracks until the round settles,
    /// keyed by flattened component name so that several provider services
    /// in one package stay distinct round members.
    pub(crate) fn start_round(
        &self,
        candidates: Vec<ServiceDescriptor>,
        queue: mpsc::Sender<ServiceRequest>,
    ) -> HashSet<String> {
        let mut pending = HashSet::new();
        for descriptor in candidates {
            let provider = ComponentName::new(
                descriptor.package_name.clone(),
                descriptor.class_name.clone(),
            );
            info!("binding policy provider {provider}");
            pending.insert(provider.flatten());
            let connection = self.connector.connect(&descriptor);
            let queue = queue.clone();
            tokio::spawn(async move {
                let policy = match connection.await {
                    Ok(policy) => Some(policy),
                    Err(e) => {
                        warn!("provider {provider} failed to deliver a policy: {e:#}");
                        None
                    }
                };
                let response = ServiceRequest::ProviderResponse { provider, policy };
                if queue.send(response).await.is_err() {
                    debug!("service released before the provider response arrived");
                }
            });
        }
        pending
    }
}
