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

//! # Policy Source Scanner
//!
//! Builds the system whitelist and blacklist partitions from the static
//! configuration strings and the installed-package database. The whitelist
//! additionally consults per-activity manifest metadata for packages the
//! configuration does not mention; the blacklist comes from configuration
//! alone.

use crate::common::{ComponentName, PackageMetadata, PolicyEntry, PolicyEntryWrapper};
use crate::platform::{MetadataSource, PackageInspector, DISTRACTION_OPTIMIZED_METADATA_KEY};
use log::{debug, error, warn};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

const PACKAGE_DELIMITER: char = ',';
const PACKAGE_ACTIVITY_DELIMITER: char = '/';

/// Parses a configuration list into `package -> activity set`. An empty set
/// means the whole package is included.
///
/// Entries are separated by `,` and are either `package` or
/// `package/Activity`. A bare `package` clears any activity set accumulated
/// so far (whole-package wins over partial); `package/Activity` entries for
/// an already whole-listed package are ignored.
pub fn parse_config_list(config: &str) -> HashMap<String, HashSet<String>> {
    let mut package_to_activities: HashMap<String, HashSet<String>> = HashMap::new();
    for entry in config.split(PACKAGE_DELIMITER) {
        let parts: Vec<&str> = entry.split(PACKAGE_ACTIVITY_DELIMITER).collect();
        let new_package = !package_to_activities.contains_key(parts[0]);
        let activities = package_to_activities.entry(parts[0].to_string()).or_default();
        if parts.len() == 1 {
            // whole package
            activities.clear();
        } else if parts.len() == 2 {
            // add the class only when the whole package is not listed yet
            if new_package || !activities.is_empty() {
                activities.insert(parts[1].to_string());
            }
        }
    }
    package_to_activities
}

/// Rebuilds the system partitions. Runs entirely outside the store lock; the
/// caller merges the returned maps in one critical section.
pub struct PolicySourceScanner {
    inspector: Arc<dyn PackageInspector>,
    metadata: Arc<dyn MetadataSource>,
    blocking_surface: ComponentName,
}

impl PolicySourceScanner {
    pub fn new(
        inspector: Arc<dyn PackageInspector>,
        metadata: Arc<dyn MetadataSource>,
        blocking_surface: ComponentName,
    ) -> Self {
        Self { inspector, metadata, blocking_surface }
    }

    /// Generates the system whitelist from the configuration string and the
    /// manifest metadata of every installed package. Configuration entries
    /// win wholesale over manifest data for the same package.
    pub fn generate_whitelist(
        &self,
        config: Option<&str>,
    ) -> HashMap<String, PolicyEntryWrapper> {
        let mut whitelist = HashMap::new();
        let Some(config) = config else {
            debug!("no whitelist in config");
            return whitelist;
        };
        let mut config_whitelist = parse_config_list(config);
        // The blocking surface must stay reachable under restriction.
        config_whitelist.insert(
            self.blocking_surface.package.clone(),
            HashSet::from([self.blocking_surface.class.clone()]),
        );

        let packages = match self.inspector.list_installed_packages() {
            Ok(packages) => packages,
            Err(e) => {
                error!("failed to list installed packages: {e:#}");
                return whitelist;
            }
        };
        for info in packages {
            let (activities, whole_package) =
                match config_whitelist.get(&info.package_name) {
                    Some(configured) if configured.is_empty() => {
                        // Whole package whitelisted; carry its live activity
                        // list.
                        match activities_in_package(&info) {
                            Some(activities) => (activities, true),
                            None => {
                                debug!("{}: no activities", info.package_name);
                                continue;
                            }
                        }
                    }
                    Some(configured) => (configured.iter().cloned().collect(), false),
                    None => match self.manifest_distraction_optimized(&info) {
                        Some(activities) => (activities, false),
                        None => continue,
                    },
                };
            let entry = self.system_entry(&info, activities, whole_package);
            whitelist.insert(info.package_name, PolicyEntryWrapper::matching(entry));
        }
        whitelist
    }

    /// Generates the system blacklist from the configuration string alone.
    pub fn generate_blacklist(
        &self,
        config: Option<&str>,
    ) -> HashMap<String, PolicyEntryWrapper> {
        let mut blacklist = HashMap::new();
        let Some(config) = config else {
            debug!("no blacklist in config");
            return blacklist;
        };
        for (package_name, configured) in parse_config_list(config) {
            let info = match self.inspector.get_package_metadata(&package_name) {
                Ok(Some(info)) => info,
                Ok(None) => {
                    error!("{package_name} not found, cannot blacklist");
                    continue;
                }
                Err(e) => {
                    error!("failed to inspect {package_name}: {e:#}");
                    continue;
                }
            };
            let (activities, whole_package) = if configured.is_empty() {
                // A whole-package blacklist entry still resolves to the live
                // activity list so the entry stays well formed.
                match activities_in_package(&info) {
                    Some(activities) => (activities, true),
                    None => continue,
                }
            } else {
                (configured.into_iter().collect(), false)
            };
            let entry = self.system_entry(&info, activities, whole_package);
            blacklist.insert(package_name, PolicyEntryWrapper::matching(entry));
        }
        blacklist
    }

    /// The activities of `info` whose manifest metadata marks them as
    /// distraction optimized, or `None` when the package declares none.
    pub fn manifest_distraction_optimized(&self, info: &PackageMetadata) -> Option<Vec<String>> {
        let optimized: Vec<String> = info
            .activities
            .iter()
            .filter(|class| {
                self.metadata.get_boolean(
                    &ComponentName::new(info.package_name.clone(), (*class).clone()),
                    DISTRACTION_OPTIMIZED_METADATA_KEY,
                )
            })
            .cloned()
            .collect();
        if optimized.is_empty() {
            None
        } else {
            Some(optimized)
        }
    }

    /// Manifest-declared distraction-optimized activities for one installed
    /// package, `None` when the package is missing or declares none.
    pub fn distraction_optimized_activities(&self, package_name: &str) -> Option<Vec<String>> {
        match self.inspector.get_package_metadata(package_name) {
            Ok(Some(info)) => self.manifest_distraction_optimized(&info),
            Ok(None) => None,
            Err(e) => {
                warn!("error reading metadata for {package_name}: {e:#}");
                None
            }
        }
    }

    fn system_entry(
        &self,
        info: &PackageMetadata,
        activities: Vec<String>,
        whole_package: bool,
    ) -> PolicyEntry {
        PolicyEntry {
            package_name: info.package_name.clone(),
            activities,
            covers_whole_package: whole_package,
            is_system_app: info.is_system_app || info.is_updated_system_app,
            min_version: 0,
            max_version: 0,
            signatures: info.signatures.clone(),
        }
    }
}

fn activities_in_package(info: &PackageMetadata) -> Option<Vec<String>> {
    if info.activities.is_empty() {
        None
    } else {
        Some(info.activities.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn parses_whole_package_and_partial_entries() {
        let map = parse_config_list("com.a,com.b/Main,com.b/Other");
        assert!(map["com.a"].is_empty());
        assert_eq!(map["com.b"].len(), 2);
        assert!(map["com.b"].contains("Main"));
        assert!(map["com.b"].contains("Other"));
    }

    #[test]
    fn bare_package_clears_accumulated_activities() {
        let map = parse_config_list("com.a/Main,com.a");
        assert!(map["com.a"].is_empty());
    }

    #[test]
    fn partial_entries_after_whole_package_are_ignored() {
        let map = parse_config_list("com.a,com.a/Main");
        assert!(map["com.a"].is_empty());
    }

    struct FixtureInspector {
        packages: Vec<PackageMetadata>,
    }

    impl PackageInspector for FixtureInspector {
        fn list_installed_packages(&self) -> Result<Vec<PackageMetadata>> {
            Ok(self.packages.clone())
        }

        fn get_package_metadata(&self, package_name: &str) -> Result<Option<PackageMetadata>> {
            Ok(self.packages.iter().find(|p| p.package_name == package_name).cloned())
        }
    }

    struct FixtureMetadata {
        optimized: HashSet<String>,
    }

    impl MetadataSource for FixtureMetadata {
        fn get_boolean(&self, activity: &ComponentName, key: &str) -> bool {
            key == DISTRACTION_OPTIMIZED_METADATA_KEY && self.optimized.contains(&activity.flatten())
        }
    }

    fn package(name: &str, activities: &[&str]) -> PackageMetadata {
        PackageMetadata {
            package_name: name.to_string(),
            version_code: 1,
            activities: activities.iter().map(|a| a.to_string()).collect(),
            ..Default::default()
        }
    }

    fn scanner(packages: Vec<PackageMetadata>, optimized: &[&str]) -> PolicySourceScanner {
        PolicySourceScanner::new(
            Arc::new(FixtureInspector { packages }),
            Arc::new(FixtureMetadata {
                optimized: optimized.iter().map(|s| s.to_string()).collect(),
            }),
            ComponentName::new("com.blocker", "BlockingActivity"),
        )
    }

    #[test]
    fn config_wins_wholesale_over_manifest_metadata() {
        // "com.x" whole package plus a redundant partial entry; the manifest
        // also marks com.x/Bar. The result must be whole-package, manifest
        // ignored.
        let s = scanner(vec![package("com.x", &["Foo", "Bar", "Baz"])], &["com.x/Bar"]);
        let whitelist = s.generate_whitelist(Some("com.x,com.x/Foo"));
        let wrapper = &whitelist["com.x"];
        assert!(wrapper.entry.covers_whole_package);
        assert_eq!(wrapper.entry.activities.len(), 3);
    }

    #[test]
    fn manifest_metadata_fills_in_unconfigured_packages() {
        let s = scanner(vec![package("com.m", &["Safe", "Unsafe"])], &["com.m/Safe"]);
        let whitelist = s.generate_whitelist(Some(""));
        let wrapper = &whitelist["com.m"];
        assert!(!wrapper.entry.covers_whole_package);
        assert_eq!(wrapper.entry.activities, ["Safe"]);
    }

    #[test]
    fn package_without_any_source_contributes_nothing() {
        let s = scanner(vec![package("com.plain", &["Main"])], &[]);
        let whitelist = s.generate_whitelist(Some(""));
        assert!(!whitelist.contains_key("com.plain"));
    }

    #[test]
    fn blocking_surface_is_always_whitelisted() {
        let s = scanner(vec![package("com.blocker", &["BlockingActivity", "Other"])], &[]);
        let whitelist = s.generate_whitelist(Some(""));
        let wrapper = &whitelist["com.blocker"];
        assert!(wrapper.entry.is_activity_covered("BlockingActivity"));
        assert!(!wrapper.entry.is_activity_covered("Other"));
    }

    #[test]
    fn missing_config_leaves_partition_empty() {
        let s = scanner(vec![package("com.x", &["Foo"])], &["com.x/Foo"]);
        assert!(s.generate_whitelist(None).is_empty());
        assert!(s.generate_blacklist(None).is_empty());
    }

    #[test]
    fn blacklist_ignores_manifest_and_uninstalled_packages() {
        let s = scanner(vec![package("com.bad", &["A", "B"])], &["com.gone/Opt"]);
        let blacklist = s.generate_blacklist(Some("com.bad,com.gone"));
        assert_eq!(blacklist.len(), 1);
        let wrapper = &blacklist["com.bad"];
        assert!(wrapper.entry.covers_whole_package);
        assert_eq!(wrapper.entry.activities.len(), 2);
    }

    #[test]
    fn whole_package_blacklist_with_no_activities_is_dropped() {
        let s = scanner(vec![package("com.empty", &[])], &[]);
        let blacklist = s.generate_blacklist(Some("com.empty"));
        assert!(blacklist.is_empty());
    }
}
