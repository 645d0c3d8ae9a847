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

//! # Platform
//!
//! Collaborator interfaces consumed by the engine. The real OS bindings
//! implement these in production; tests supply in-memory fixtures.

use crate::common::{
    AppBlockingPolicy, BlockingIntent, ComponentName, PackageMetadata, RestrictionState,
    ServiceDescriptor, TaskStackInfo, TopTaskInfo,
};
use anyhow::Result;
use futures::future::BoxFuture;
use std::sync::Arc;

/// Manifest metadata key marking an activity as safe under restrictions.
pub const DISTRACTION_OPTIMIZED_METADATA_KEY: &str = "distractionOptimized";

/// Read access to the installed-package database.
pub trait PackageInspector: Send + Sync {
    fn list_installed_packages(&self) -> Result<Vec<PackageMetadata>>;

    /// `Ok(None)` when the package is not installed.
    fn get_package_metadata(&self, package_name: &str) -> Result<Option<PackageMetadata>>;
}

/// Per-activity declared metadata booleans.
pub trait MetadataSource: Send + Sync {
    fn get_boolean(&self, activity: &ComponentName, key: &str) -> bool;
}

/// Foreground task inspection and the display redirect primitive.
pub trait TaskMonitor: Send + Sync {
    fn get_top_tasks(&self) -> Result<Vec<TopTaskInfo>>;

    /// The focused task stack whose top is `component`, or `None` when the
    /// component is not on top of the focused stack.
    fn get_focused_stack_for(&self, component: &ComponentName) -> Result<Option<TaskStackInfo>>;

    /// Substitutes the blocking surface in place of the task's top activity.
    fn block_activity(&self, task: &TopTaskInfo, intent: &BlockingIntent) -> Result<()>;

    fn restart_task(&self, task_id: i32) -> Result<()>;
}

/// Query access to the restriction-state source. Change events arrive
/// through [`AppBlockingService::on_restriction_change`].
///
/// [`AppBlockingService::on_restriction_change`]: crate::service::AppBlockingService::on_restriction_change
pub trait RestrictionSource: Send + Sync {
    /// `None` when no restriction information is available yet (bootup).
    fn current_restrictions(&self) -> Option<RestrictionState>;
}

/// Discovery of and connection to external policy-provider services.
pub trait ProviderConnector: Send + Sync {
    fn query_installed_providers(&self) -> Vec<ServiceDescriptor>;

    /// Binds to the provider and resolves once it delivers its policy or the
    /// connection fails. Dropping the future severs the connection.
    fn connect(
        &self,
        descriptor: &ServiceDescriptor,
    ) -> BoxFuture<'static, Result<AppBlockingPolicy>>;
}

/// Caller-identity capability checks.
pub trait PermissionGate: Send + Sync {
    /// Whether the package holds the app-blocking control permission.
    fn holds_control_permission(&self, package_name: &str) -> bool;

    /// Whether the package is signed with the platform signature.
    fn is_platform_signed(&self, package_name: &str) -> bool;
}

/// The bundle of collaborators the service is constructed with.
#[derive(Clone)]
pub struct PlatformServices {
    pub inspector: Arc<dyn PackageInspector>,
    pub metadata: Arc<dyn MetadataSource>,
    pub task_monitor: Arc<dyn TaskMonitor>,
    pub restrictions: Arc<dyn RestrictionSource>,
    pub connector: Arc<dyn ProviderConnector>,
    pub permissions: Arc<dyn PermissionGate>,
}
