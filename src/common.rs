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

//! # Common
//!
//! Shared value types used across the crate: component names, policy entries
//! and the wrappers carrying their verification state, policy payloads and
//! the snapshot types delivered by the task monitor.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An opaque package signing certificate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature(pub Vec<u8>);

/// A `package/class` pair identifying one activity (or service).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentName {
    pub package: String,
    pub class: String,
}

impl ComponentName {
    pub fn new(package: impl Into<String>, class: impl Into<String>) -> Self {
        Self { package: package.into(), class: class.into() }
    }

    /// Renders the component as `package/class`.
    pub fn flatten(&self) -> String {
        format!("{}/{}", self.package, self.class)
    }

    /// Parses a `package/class` string. Returns `None` when either side is
    /// empty or the separator is missing.
    pub fn unflatten(flattened: &str) -> Option<Self> {
        let (package, class) = flattened.split_once('/')?;
        if package.is_empty() || class.is_empty() {
            return None;
        }
        Some(Self::new(package, class))
    }
}

impl fmt::Display for ComponentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.package, self.class)
    }
}

/// One package's declared blocking policy.
///
/// `covers_whole_package` is the "every activity in this package" marker.
/// Entries produced by the system scanner still carry the concrete activity
/// list alongside it so the entry stays well formed for consumers that want
/// the names. Version bounds of 0 mean unbounded on that end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyEntry {
    pub package_name: String,
    pub activities: Vec<String>,
    pub covers_whole_package: bool,
    pub is_system_app: bool,
    pub min_version: i64,
    pub max_version: i64,
    pub signatures: Vec<Signature>,
}

impl PolicyEntry {
    /// True when this entry applies to `class_name`.
    pub fn is_activity_covered(&self, class_name: &str) -> bool {
        self.covers_whole_package || self.activities.iter().any(|a| a == class_name)
    }
}

impl fmt::Display for PolicyEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PolicyEntry[package={}, whole={}, activities={:?}, system={}, versions=({}, {})]",
            self.package_name,
            self.covers_whole_package,
            self.activities,
            self.is_system_app,
            self.min_version,
            self.max_version
        )
    }
}

/// A policy entry plus whether it matched the installed package at the time
/// it entered the store. A mismatch can happen for a version out of range or
/// a signature mismatch. The flag is not revalidated lazily; it goes stale
/// until the next full rescan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyEntryWrapper {
    pub entry: PolicyEntry,
    pub is_matching: bool,
}

impl PolicyEntryWrapper {
    pub fn new(entry: PolicyEntry, is_matching: bool) -> Self {
        Self { entry, is_matching }
    }

    /// Wrapper for entries derived from canonical installed-package data.
    pub fn matching(entry: PolicyEntry) -> Self {
        Self::new(entry, true)
    }
}

impl fmt::Display for PolicyEntryWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} matching={}", self.entry, self.is_matching)
    }
}

/// The whitelist/blacklist pair declared by one client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppBlockingPolicy {
    pub whitelists: Vec<PolicyEntry>,
    pub blacklists: Vec<PolicyEntry>,
}

/// Flags accepted by `set_policy`. `ADD` and `REMOVE` are mutually
/// exclusive; when neither is set the update replaces the client's lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SetPolicyFlags(u32);

impl SetPolicyFlags {
    pub const REPLACE: SetPolicyFlags = SetPolicyFlags(0);
    pub const ADD: SetPolicyFlags = SetPolicyFlags(1 << 0);
    pub const REMOVE: SetPolicyFlags = SetPolicyFlags(1 << 1);
    pub const WAIT_FOR_CHANGE: SetPolicyFlags = SetPolicyFlags(1 << 2);

    pub fn contains(self, flag: SetPolicyFlags) -> bool {
        self.0 & flag.0 != 0
    }
}

impl std::ops::BitOr for SetPolicyFlags {
    type Output = SetPolicyFlags;

    fn bitor(self, rhs: SetPolicyFlags) -> SetPolicyFlags {
        SetPolicyFlags(self.0 | rhs.0)
    }
}

/// Externally-owned signal describing the current operating context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestrictionState {
    pub requires_distraction_optimization: bool,
}

impl RestrictionState {
    pub fn requires_optimization(&self) -> bool {
        self.requires_distraction_optimization
    }
}

/// The task stack behind a top activity. `task_ids` and `task_names` are
/// parallel; `task_names[i]` is the flattened root activity of `task_ids[i]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskStackInfo {
    pub task_ids: Vec<i32>,
    pub task_names: Vec<String>,
}

/// A snapshot of one foreground task, supplied by the task monitor. It is a
/// value read at decision time, never stored by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopTaskInfo {
    pub top_activity: ComponentName,
    pub task_id: i32,
    pub stack: TaskStackInfo,
}

impl TopTaskInfo {
    /// The flattened root activity of this task, looked up in the stack
    /// snapshot.
    pub fn root_activity(&self) -> Option<&str> {
        let index = self.stack.task_ids.iter().position(|&id| id == self.task_id)?;
        self.stack.task_names.get(index).map(String::as_str)
    }
}

/// Installed-package metadata as reported by the package inspector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageMetadata {
    pub package_name: String,
    pub version_code: i64,
    pub signatures: Vec<Signature>,
    pub is_system_app: bool,
    pub is_updated_system_app: bool,
    pub activities: Vec<String>,
}

/// An installed service advertising the policy-provider interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub package_name: String,
    pub class_name: String,
    pub enabled: bool,
}

/// The redirect command handed to the display collaborator when a foreground
/// activity is blocked. `restart_task_id` is present only when the blocked
/// task's root activity is itself approved, enabling a restart affordance on
/// the blocking surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockingIntent {
    pub component: ComponentName,
    pub blocked_activity: String,
    pub restart_task_id: Option<i32>,
}
