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

//! # Policy Store
//!
//! The aggregate of all policy partitions: the system whitelist and
//! blacklist rebuilt by the scanner, and one whitelist/blacklist pair per
//! client. The store itself carries no lock; the service guards the whole
//! aggregate with a single mutex and never performs I/O while holding it.

use crate::common::{PolicyEntry, PolicyEntryWrapper};
use std::collections::HashMap;

type Partition = HashMap<String, PolicyEntryWrapper>;

fn add_entries(partition: &mut Partition, wrappers: Vec<PolicyEntryWrapper>) {
    for wrapper in wrappers {
        partition.insert(wrapper.entry.package_name.clone(), wrapper);
    }
}

fn remove_entries(partition: &mut Partition, wrappers: &[PolicyEntryWrapper]) {
    for wrapper in wrappers {
        partition.remove(&wrapper.entry.package_name);
    }
}

/// Policy holder for one client. Each list supports add (upsert by package
/// name), remove (absent keys are a no-op) and replace (clear then add).
#[derive(Debug, Default)]
pub struct ClientPolicy {
    whitelist: Partition,
    blacklist: Partition,
}

impl ClientPolicy {
    pub fn add_to_whitelist(&mut self, wrappers: Vec<PolicyEntryWrapper>) {
        add_entries(&mut self.whitelist, wrappers);
    }

    pub fn remove_from_whitelist(&mut self, wrappers: &[PolicyEntryWrapper]) {
        remove_entries(&mut self.whitelist, wrappers);
    }

    pub fn replace_whitelist(&mut self, wrappers: Vec<PolicyEntryWrapper>) {
        self.whitelist.clear();
        add_entries(&mut self.whitelist, wrappers);
    }

    pub fn add_to_blacklist(&mut self, wrappers: Vec<PolicyEntryWrapper>) {
        add_entries(&mut self.blacklist, wrappers);
    }

    pub fn remove_from_blacklist(&mut self, wrappers: &[PolicyEntryWrapper]) {
        remove_entries(&mut self.blacklist, wrappers);
    }

    pub fn replace_blacklist(&mut self, wrappers: Vec<PolicyEntryWrapper>) {
        self.blacklist.clear();
        add_entries(&mut self.blacklist, wrappers);
    }

    pub fn whitelist(&self) -> &HashMap<String, PolicyEntryWrapper> {
        &self.whitelist
    }

    pub fn blacklist(&self) -> &HashMap<String, PolicyEntryWrapper> {
        &self.blacklist
    }

    pub fn is_empty(&self) -> bool {
        self.whitelist.is_empty() && self.blacklist.is_empty()
    }
}

/// All policy partitions. Created empty at service start; the system
/// partitions are fully rebuilt (never patched) on every scan, client
/// policies are created lazily on first update and persist until shutdown.
#[derive(Debug, Default)]
pub struct PolicyStore {
    system_whitelist: Partition,
    system_blacklist: Partition,
    client_policies: HashMap<String, ClientPolicy>,
}

impl PolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace_system_whitelist(
        &mut self,
        wrappers: impl IntoIterator<Item = PolicyEntryWrapper>,
    ) {
        self.system_whitelist.clear();
        add_entries(&mut self.system_whitelist, wrappers.into_iter().collect());
    }

    pub fn replace_system_blacklist(
        &mut self,
        wrappers: impl IntoIterator<Item = PolicyEntryWrapper>,
    ) {
        self.system_blacklist.clear();
        add_entries(&mut self.system_blacklist, wrappers.into_iter().collect());
    }

    /// The policy holder for `client_name`, created on first use.
    pub fn client_policy_mut(&mut self, client_name: &str) -> &mut ClientPolicy {
        self.client_policies.entry(client_name.to_string()).or_default()
    }

    /// First matching blacklist hit, client lists before the system list.
    /// Iteration order over clients is unspecified; a block from any client
    /// blocks.
    pub fn search_blacklists(&self, package_name: &str) -> Option<&PolicyEntry> {
        for policy in self.client_policies.values() {
            if let Some(wrapper) = policy.blacklist.get(package_name) {
                if wrapper.is_matching {
                    return Some(&wrapper.entry);
                }
            }
        }
        self.system_blacklist
            .get(package_name)
            .filter(|wrapper| wrapper.is_matching)
            .map(|wrapper| &wrapper.entry)
    }

    /// First matching package-level whitelist hit, client lists before the
    /// system list.
    pub fn search_whitelists(&self, package_name: &str) -> Option<&PolicyEntry> {
        for policy in self.client_policies.values() {
            if let Some(wrapper) = policy.whitelist.get(package_name) {
                if wrapper.is_matching {
                    return Some(&wrapper.entry);
                }
            }
        }
        self.system_whitelist
            .get(package_name)
            .filter(|wrapper| wrapper.is_matching)
            .map(|wrapper| &wrapper.entry)
    }

    /// Whether any whitelist carries a matching entry covering the activity.
    pub fn is_activity_in_whitelists(&self, package_name: &str, class_name: &str) -> bool {
        for policy in self.client_policies.values() {
            if is_activity_in_partition(&policy.whitelist, package_name, class_name) {
                return true;
            }
        }
        is_activity_in_partition(&self.system_whitelist, package_name, class_name)
    }

    pub fn system_whitelist(&self) -> &HashMap<String, PolicyEntryWrapper> {
        &self.system_whitelist
    }

    pub fn system_blacklist(&self) -> &HashMap<String, PolicyEntryWrapper> {
        &self.system_blacklist
    }

    pub fn client_policies(&self) -> &HashMap<String, ClientPolicy> {
        &self.client_policies
    }

    pub fn clear(&mut self) {
        self.system_whitelist.clear();
        self.system_blacklist.clear();
        self.client_policies.clear();
    }
}

fn is_activity_in_partition(partition: &Partition, package_name: &str, class_name: &str) -> bool {
    match partition.get(package_name) {
        Some(wrapper) if wrapper.is_matching => wrapper.entry.is_activity_covered(class_name),
        _ => false,
    }
}
