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

//! # App Blocking Service
//!
//! The decision engine and its enforcement loop. A dedicated worker task
//! owns every mutation of the policy store and every enforcement pass;
//! decision queries from arbitrary callers take the store lock directly and
//! never touch the worker queue.

use crate::common::{
    AppBlockingPolicy, BlockingIntent, ComponentName, PolicyEntryWrapper, RestrictionState,
    SetPolicyFlags, TopTaskInfo,
};
use crate::config::ServiceConfig;
use crate::error::{PolicyError, PolicyResult};
use crate::platform::PlatformServices;
use crate::provider::PolicyProviderCoordinator;
use crate::scanner::PolicySourceScanner;
use crate::store::PolicyStore;
use crate::verifier;
use log::{debug, error, info, warn};
use std::collections::{HashSet, VecDeque};
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

/// Message queue size.
const MESSAGE_QUEUE_SIZE: usize = 32;
/// Debounce window collapsing bursts of package-change events into one scan.
const PACKAGE_PARSING_DELAY: Duration = Duration::from_millis(500);
/// Bounded length of the blocked-activity audit ring.
const LOG_SIZE: usize = 20;

/// How a policy update is merged into a client's lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UpdateMode {
    Add,
    Remove,
    Replace,
}

impl UpdateMode {
    fn from_flags(flags: SetPolicyFlags) -> Self {
        if flags.contains(SetPolicyFlags::ADD) {
            UpdateMode::Add
        } else if flags.contains(SetPolicyFlags::REMOVE) {
            UpdateMode::Remove
        } else {
            UpdateMode::Replace
        }
    }
}

/// Requests processed by the worker task.
pub(crate) enum ServiceRequest {
    Init,
    RequestScan {
        delay: Duration,
    },
    UpdatePolicy {
        client: String,
        policy: AppBlockingPolicy,
        mode: UpdateMode,
        done: Option<oneshot::Sender<()>>,
    },
    ProviderResponse {
        provider: ComponentName,
        policy: Option<AppBlockingPolicy>,
    },
    ActivityLaunched(TopTaskInfo),
    RestrictionChanged(RestrictionState),
    Release {
        done: Option<oneshot::Sender<()>>,
    },
}

/// State shared between the public API surface and the worker task.
struct ServiceShared {
    store: Mutex<PolicyStore>,
    config: ServiceConfig,
    platform: PlatformServices,
    scanner: PolicySourceScanner,
    enforcement_enabled: AtomicBool,
    has_parsed_packages: AtomicBool,
    current_restrictions: Mutex<Option<RestrictionState>>,
    pending_providers: Mutex<Option<HashSet<String>>>,
    blocked_activity_log: Mutex<VecDeque<String>>,
    started: std::time::Instant,
}

impl ServiceShared {
    fn lock_store(&self) -> MutexGuard<'_, PolicyStore> {
        self.store.lock().expect("policy store lock poisoned")
    }

    fn is_activity_distraction_optimized(
        &self,
        package_name: &str,
        class_name: &str,
    ) -> PolicyResult<bool> {
        if package_name.is_empty() {
            return Err(PolicyError::InvalidArgument("package name empty".to_string()));
        }
        if class_name.is_empty() {
            return Err(PolicyError::InvalidArgument("class name empty".to_string()));
        }
        let store = self.lock_store();
        if store.search_blacklists(package_name).is_some() {
            return Ok(false);
        }
        Ok(store.is_activity_in_whitelists(package_name, class_name))
    }

    fn is_service_distraction_optimized(&self, package_name: &str) -> PolicyResult<bool> {
        if package_name.is_empty() {
            return Err(PolicyError::InvalidArgument("package name empty".to_string()));
        }
        let store = self.lock_store();
        if store.search_blacklists(package_name).is_some() {
            return Ok(false);
        }
        Ok(store.search_whitelists(package_name).is_some())
    }

    fn is_activity_backed_by_safe_activity(
        &self,
        activity: &ComponentName,
    ) -> PolicyResult<bool> {
        if !self.is_restricted() {
            return Ok(true);
        }
        let stack = self.platform.task_monitor.get_focused_stack_for(activity)?;
        let Some(stack) = stack else {
            // Not on top of the focused stack.
            return Ok(true);
        };
        if stack.task_names.len() <= 1 {
            // Nothing behind this activity.
            return Ok(false);
        }
        let behind = &stack.task_names[stack.task_names.len() - 2];
        let Some(component) = ComponentName::unflatten(behind) else {
            return Ok(false);
        };
        self.is_activity_distraction_optimized(&component.package, &component.class)
    }

    /// Whether the current context requires distraction optimization. Falls
    /// back to querying the restriction source once when no change event has
    /// been received yet; still-absent information means unrestricted.
    fn is_restricted(&self) -> bool {
        let mut current = self
            .current_restrictions
            .lock()
            .expect("restriction state lock poisoned");
        if current.is_none() {
            *current = self.platform.restrictions.current_restrictions();
        }
        current.map(|r| r.requires_optimization()).unwrap_or(false)
    }

    fn add_blocked_activity_log(&self, line: String) {
        let mut log = self
            .blocked_activity_log
            .lock()
            .expect("blocked activity log lock poisoned");
        while log.len() >= LOG_SIZE {
            log.pop_front();
        }
        log.push_back(format!("t+{:.1}s: {line}", self.started.elapsed().as_secs_f32()));
    }
}

/// Real-time distraction-blocking policy engine.
///
/// Assembles a policy store from the static configuration, per-package
/// manifest declarations and dynamically registered external policy
/// providers, answers distraction-optimization queries against it, and
/// redirects violating foreground activities to the blocking surface while
/// restrictions are active.
///
/// Must be created inside a Tokio runtime; `new` spawns the worker task.
/// Call [`init`](Self::init) once the event sources are wired up, and
/// [`shutdown`](Self::shutdown) to release.
pub struct AppBlockingService {
    shared: Arc<ServiceShared>,
    queue: mpsc::Sender<ServiceRequest>,
}

impl AppBlockingService {
    pub fn new(config: ServiceConfig, platform: PlatformServices) -> Self {
        let (tx, rx) = mpsc::channel(MESSAGE_QUEUE_SIZE);
        let scanner = PolicySourceScanner::new(
            platform.inspector.clone(),
            platform.metadata.clone(),
            config.blocking_surface.clone(),
        );
        let coordinator =
            PolicyProviderCoordinator::new(platform.connector.clone(), platform.permissions.clone());
        let shared = Arc::new(ServiceShared {
            store: Mutex::new(PolicyStore::new()),
            enforcement_enabled: AtomicBool::new(config.enforcement_enabled),
            has_parsed_packages: AtomicBool::new(false),
            current_restrictions: Mutex::new(None),
            pending_providers: Mutex::new(None),
            blocked_activity_log: Mutex::new(VecDeque::new()),
            started: std::time::Instant::now(),
            scanner,
            config,
            platform,
        });
        let worker = ServiceWorker {
            shared: shared.clone(),
            rx,
            queue: tx.clone(),
            coordinator,
            scan_deadline: None,
        };
        tokio::spawn(worker.run());
        Self { shared, queue: tx }
    }

    /// Starts the external policy-provider collection round. Event sources
    /// (package changes, boot completion, launches, restriction changes)
    /// feed the service through the `on_*` entry points.
    pub fn init(&self) {
        self.send_request(ServiceRequest::Init);
    }

    /// Whether the activity is allowed to run while restrictions are active.
    /// Any client blacklist hit blocks regardless of whitelists; a package
    /// in no list at all is blocked by default.
    pub fn is_activity_distraction_optimized(
        &self,
        package_name: &str,
        class_name: &str,
    ) -> PolicyResult<bool> {
        self.shared.is_activity_distraction_optimized(package_name, class_name)
    }

    /// Package-level variant for services.
    pub fn is_service_distraction_optimized(&self, package_name: &str) -> PolicyResult<bool> {
        self.shared.is_service_distraction_optimized(package_name)
    }

    /// Whether the activity directly behind `activity` in its task stack is
    /// itself distraction optimized. Vacuously true while unrestricted.
    pub fn is_activity_backed_by_safe_activity(
        &self,
        activity: &ComponentName,
    ) -> PolicyResult<bool> {
        self.shared.is_activity_backed_by_safe_activity(activity)
    }

    /// Merges `policy` into the client's lists. With
    /// [`SetPolicyFlags::WAIT_FOR_CHANGE`] the call returns only after the
    /// worker has applied this exact update and run one enforcement pass;
    /// there is no timeout, but shutdown releases any waiter.
    pub async fn set_policy(
        &self,
        client_name: &str,
        policy: AppBlockingPolicy,
        flags: SetPolicyFlags,
    ) -> PolicyResult<()> {
        if client_name.is_empty() {
            return Err(PolicyError::InvalidArgument("client name empty".to_string()));
        }
        if flags.contains(SetPolicyFlags::ADD) && flags.contains(SetPolicyFlags::REMOVE) {
            return Err(PolicyError::InvalidArgument(
                "cannot set both ADD and REMOVE".to_string(),
            ));
        }
        if !self.shared.platform.permissions.holds_control_permission(client_name) {
            return Err(PolicyError::PermissionDenied(format!(
                "{client_name} lacks the app blocking control permission"
            )));
        }
        debug!("policy update from client {client_name}");
        let (done_tx, done_rx) = if flags.contains(SetPolicyFlags::WAIT_FOR_CHANGE) {
            let (tx, rx) = oneshot::channel();
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };
        self.queue
            .send(ServiceRequest::UpdatePolicy {
                client: client_name.to_string(),
                policy,
                mode: UpdateMode::from_flags(flags),
                done: done_tx,
            })
            .await
            .map_err(|_| PolicyError::ServiceStopped)?;
        if let Some(rx) = done_rx {
            // A dropped sender means the service released before applying
            // the update; the waiter is unblocked either way.
            let _ = rx.await;
        }
        Ok(())
    }

    /// Administratively enables or disables display enforcement. Restricted
    /// to platform-signed callers.
    pub fn set_enforcement_enabled(&self, caller: &str, enable: bool) -> PolicyResult<()> {
        if !self.shared.platform.permissions.is_platform_signed(caller) {
            return Err(PolicyError::PermissionDenied(format!(
                "{caller} does not have the platform signature"
            )));
        }
        self.shared.enforcement_enabled.store(enable, Ordering::SeqCst);
        Ok(())
    }

    /// Restarts the requested task. Forwarded to the task monitor; the
    /// engine itself restarts nothing.
    pub fn restart_task(&self, task_id: i32) -> PolicyResult<()> {
        self.shared.platform.task_monitor.restart_task(task_id)?;
        Ok(())
    }

    /// Manifest-declared distraction-optimized activities of one package.
    pub fn distraction_optimized_activities(&self, package_name: &str) -> Option<Vec<String>> {
        self.shared.scanner.distraction_optimized_activities(package_name)
    }

    /// A new foreground task snapshot from the task monitor.
    pub fn on_activity_launched(&self, top_task: TopTaskInfo) {
        self.send_request(ServiceRequest::ActivityLaunched(top_task));
    }

    /// A restriction-state change from the restriction source.
    pub fn on_restriction_change(&self, state: RestrictionState) {
        self.send_request(ServiceRequest::RestrictionChanged(state));
    }

    /// A package install/remove/change notification. Bursts within the
    /// debounce window collapse into one rescan.
    pub fn on_packages_changed(&self) {
        self.send_request(ServiceRequest::RequestScan { delay: PACKAGE_PARSING_DELAY });
    }

    /// Boot completion; triggers the initial scan immediately.
    pub fn on_boot_completed(&self) {
        self.send_request(ServiceRequest::RequestScan { delay: Duration::ZERO });
    }

    /// Releases the service: clears the store, severs any outstanding
    /// provider round and unblocks waiting policy-set callers. Idempotent.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self
            .queue
            .send(ServiceRequest::Release { done: Some(tx) })
            .await
            .is_err()
        {
            return; // already released
        }
        let _ = rx.await;
    }

    /// Diagnostic snapshot of the whole engine state.
    pub fn dump(&self) -> String {
        let shared = &self.shared;
        let mut out = String::new();
        out.push_str("*AppBlockingService*\n");
        let _ = writeln!(
            out,
            "enforcement_enabled: {}",
            shared.enforcement_enabled.load(Ordering::SeqCst)
        );
        let _ = writeln!(
            out,
            "has_parsed_packages: {}",
            shared.has_parsed_packages.load(Ordering::SeqCst)
        );
        let _ = writeln!(out, "restricted: {}", shared.is_restricted());
        {
            let log = shared
                .blocked_activity_log
                .lock()
                .expect("blocked activity log lock poisoned");
            for line in log.iter() {
                let _ = writeln!(out, "{line}");
            }
        }
        let store = shared.lock_store();
        out.push_str("**System whitelist**\n");
        dump_partition(&mut out, store.system_whitelist());
        out.push_str("**System blacklist**\n");
        dump_partition(&mut out, store.system_blacklist());
        out.push_str("**Client policies**\n");
        for (client, policy) in store.client_policies() {
            let _ = writeln!(out, "client: {client}");
            out.push_str("  whitelist:\n");
            dump_partition(&mut out, policy.whitelist());
            out.push_str("  blacklist:\n");
            dump_partition(&mut out, policy.blacklist());
        }
        out.push_str("**Pending policy providers**\n");
        {
            let pending = shared
                .pending_providers
                .lock()
                .expect("pending providers lock poisoned");
            if let Some(pending) = pending.as_ref() {
                for package in pending {
                    let _ = writeln!(out, "{package}");
                }
            }
        }
        let _ = writeln!(
            out,
            "**Whitelist string in config**\n{:?}",
            shared.config.activity_whitelist
        );
        let _ = writeln!(
            out,
            "**Blacklist string in config**\n{:?}",
            shared.config.activity_blacklist
        );
        out
    }

    fn send_request(&self, request: ServiceRequest) {
        match self.queue.try_send(request) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                error!("request queue full, event dropped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("service already released, event dropped");
            }
        }
    }
}

impl Drop for AppBlockingService {
    fn drop(&mut self) {
        // Best effort; an explicit shutdown() has already closed the loop.
        let _ = self.queue.try_send(ServiceRequest::Release { done: None });
    }
}

fn dump_partition(
    out: &mut String,
    partition: &std::collections::HashMap<String, PolicyEntryWrapper>,
) {
    for wrapper in partition.values() {
        let _ = writeln!(out, "{wrapper}");
    }
}

/// The worker task. Owns every store mutation and enforcement pass; a full
/// rebuild runs to completion before the next queued request is processed.
struct ServiceWorker {
    shared: Arc<ServiceShared>,
    rx: mpsc::Receiver<ServiceRequest>,
    queue: mpsc::Sender<ServiceRequest>,
    coordinator: PolicyProviderCoordinator,
    scan_deadline: Option<Instant>,
}

impl ServiceWorker {
    async fn run(mut self) {
        info!("app blocking worker started");
        loop {
            let scan_at = self.scan_deadline.unwrap_or_else(Instant::now);
            tokio::select! {
                maybe_request = self.rx.recv() => {
                    match maybe_request {
                        Some(request) => {
                            if !self.handle_request(request) {
                                break;
                            }
                        }
                        None => {
                            info!("request channel closed, stopping worker");
                            break;
                        }
                    }
                }
                _ = tokio::time::sleep_until(scan_at), if self.scan_deadline.is_some() => {
                    self.scan_deadline = None;
                    self.handle_parse_installed_packages();
                }
            }
        }
        info!("app blocking worker stopped");
    }

    /// Returns false when the worker should stop.
    fn handle_request(&mut self, request: ServiceRequest) -> bool {
        match request {
            ServiceRequest::Init => self.handle_init(),
            ServiceRequest::RequestScan { delay } => self.handle_request_scan(delay),
            ServiceRequest::UpdatePolicy { client, policy, mode, done } => {
                self.handle_update_policy(client, policy, mode, done)
            }
            ServiceRequest::ProviderResponse { provider, policy } => {
                self.handle_provider_response(provider, policy)
            }
            ServiceRequest::ActivityLaunched(top_task) => {
                if self.shared.is_restricted() {
                    self.block_top_activity_if_not_allowed(&top_task);
                }
            }
            ServiceRequest::RestrictionChanged(state) => self.handle_restriction_changed(state),
            ServiceRequest::Release { done } => {
                self.handle_release(done);
                return false;
            }
        }
        true
    }

    fn handle_init(&mut self) {
        let candidates = self.coordinator.eligible_providers();
        if candidates.is_empty() {
            info!("no app blocking policy providers installed");
            self.block_top_activities_if_necessary();
            return;
        }
        let pending = self.coordinator.start_round(candidates, self.queue.clone());
        *self
            .shared
            .pending_providers
            .lock()
            .expect("pending providers lock poisoned") = Some(pending);
    }

    fn handle_request_scan(&mut self, delay: Duration) {
        let at = Instant::now() + delay;
        self.scan_deadline = Some(match self.scan_deadline {
            Some(current) => current.min(at),
            None => at,
        });
    }

    fn handle_parse_installed_packages(&mut self) {
        let whitelist = self
            .shared
            .scanner
            .generate_whitelist(self.shared.config.activity_whitelist.as_deref());
        let blacklist = self
            .shared
            .scanner
            .generate_blacklist(self.shared.config.activity_blacklist.as_deref());
        {
            let mut store = self.shared.lock_store();
            store.replace_system_whitelist(whitelist.into_values());
            store.replace_system_blacklist(blacklist.into_values());
        }
        self.shared.has_parsed_packages.store(true, Ordering::SeqCst);
        info!("installed packages parsed");
        self.block_top_activities_if_necessary();
    }

    fn handle_update_policy(
        &mut self,
        client: String,
        policy: AppBlockingPolicy,
        mode: UpdateMode,
        done: Option<oneshot::Sender<()>>,
    ) {
        debug!("applying policy from {client}, mode {mode:?}");
        // Verification touches the package inspector, so it happens before
        // the store lock is taken.
        let whitelist = self.verify_list(policy.whitelists);
        let blacklist = self.verify_list(policy.blacklists);
        {
            let mut store = self.shared.lock_store();
            let client_policy = store.client_policy_mut(&client);
            match mode {
                UpdateMode::Add => {
                    client_policy.add_to_whitelist(whitelist);
                    client_policy.add_to_blacklist(blacklist);
                }
                UpdateMode::Remove => {
                    client_policy.remove_from_whitelist(&whitelist);
                    client_policy.remove_from_blacklist(&blacklist);
                }
                UpdateMode::Replace => {
                    client_policy.replace_whitelist(whitelist);
                    client_policy.replace_blacklist(blacklist);
                }
            }
        }
        self.block_top_activities_if_necessary();
        if let Some(done) = done {
            let _ = done.send(());
        }
    }

    fn verify_list(&self, entries: Vec<crate::common::PolicyEntry>) -> Vec<PolicyEntryWrapper> {
        entries
            .into_iter()
            .map(|entry| {
                let installed = match self
                    .shared
                    .platform
                    .inspector
                    .get_package_metadata(&entry.package_name)
                {
                    Ok(installed) => installed,
                    Err(e) => {
                        warn!("failed to inspect {}: {e:#}", entry.package_name);
                        None
                    }
                };
                let is_matching =
                    verifier::is_installed_package_matching(&entry, installed.as_ref());
                PolicyEntryWrapper::new(entry, is_matching)
            })
            .collect()
    }

    /// Providers are tracked per service component; two provider services in
    /// the same package are distinct round members and distinct policy
    /// clients. A policy arriving after the round settled is still merged.
    fn handle_provider_response(
        &mut self,
        provider: ComponentName,
        policy: Option<AppBlockingPolicy>,
    ) {
        let round_settled = {
            let mut pending = self
                .shared
                .pending_providers
                .lock()
                .expect("pending providers lock poisoned");
            match pending.as_mut() {
                Some(outstanding) => {
                    outstanding.remove(&provider.flatten());
                    if outstanding.is_empty() {
                        *pending = None;
                        true
                    } else {
                        false
                    }
                }
                None => {
                    debug!("response from {provider} after the round settled");
                    false
                }
            }
        };
        if let Some(policy) = policy {
            info!("policy delivered by provider {provider}");
            self.handle_update_policy(provider.flatten(), policy, UpdateMode::Replace, None);
        }
        if round_settled {
            info!("provider round complete");
            self.block_top_activities_if_necessary();
        }
    }

    fn handle_restriction_changed(&mut self, state: RestrictionState) {
        // Ignore restriction changes until the first scan: the lists are
        // still empty and would block every app.
        if !self.shared.has_parsed_packages.load(Ordering::SeqCst) {
            debug!("restriction change before first package scan, ignored");
            return;
        }
        *self
            .shared
            .current_restrictions
            .lock()
            .expect("restriction state lock poisoned") = Some(state);
        if state.requires_optimization() {
            self.block_top_activities_if_necessary();
        }
    }

    fn handle_release(&mut self, done: Option<oneshot::Sender<()>>) {
        self.shared.has_parsed_packages.store(false, Ordering::SeqCst);
        self.shared.lock_store().clear();
        *self
            .shared
            .pending_providers
            .lock()
            .expect("pending providers lock poisoned") = None;
        // Queued UpdatePolicy requests are dropped with the receiver, which
        // releases their waiters.
        if let Some(done) = done {
            let _ = done.send(());
        }
        info!("app blocking service released");
    }

    fn block_top_activities_if_necessary(&self) {
        if !self.shared.is_restricted() {
            return;
        }
        let top_tasks = match self.shared.platform.task_monitor.get_top_tasks() {
            Ok(tasks) => tasks,
            Err(e) => {
                error!("failed to query top tasks: {e:#}");
                return;
            }
        };
        for top_task in &top_tasks {
            self.block_top_activity_if_not_allowed(top_task);
        }
    }

    /// One enforcement evaluation. Collaborator failures are logged and do
    /// not abort evaluation of the remaining tasks in the same cycle.
    fn block_top_activity_if_not_allowed(&self, top_task: &TopTaskInfo) {
        let top = &top_task.top_activity;
        let allowed = match self
            .shared
            .is_activity_distraction_optimized(&top.package, &top.class)
        {
            Ok(allowed) => allowed,
            Err(e) => {
                warn!("skipping task {}: {e}", top_task.task_id);
                return;
            }
        };
        if allowed {
            return;
        }
        if !self.shared.enforcement_enabled.load(Ordering::SeqCst) {
            info!("activity {} not allowed, blocking disabled", top.flatten());
            return;
        }
        let mut intent = BlockingIntent {
            component: self.shared.config.blocking_surface.clone(),
            blocked_activity: top.flatten(),
            restart_task_id: None,
        };
        let mut log_line =
            format!("blocked activity {} in task {}", top.flatten(), top_task.task_id);
        // If the root activity of the blocked task is itself approved, pass
        // the task id so the blocking surface can offer a restart.
        if let Some(root) = top_task.root_activity() {
            if let Some(root_component) = ComponentName::unflatten(root) {
                let root_allowed = self
                    .shared
                    .is_activity_distraction_optimized(
                        &root_component.package,
                        &root_component.class,
                    )
                    .unwrap_or(false);
                if root_allowed {
                    intent.restart_task_id = Some(top_task.task_id);
                    let _ = write!(log_line, ", restartable root {root}");
                }
            }
        }
        self.shared.add_blocked_activity_log(log_line);
        if let Err(e) = self.shared.platform.task_monitor.block_activity(top_task, &intent) {
            error!("failed to redirect {}: {e:#}", top.flatten());
        }
    }
}
