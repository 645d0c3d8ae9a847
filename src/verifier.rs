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

//! # Verifier
//!
//! Decides whether a declared policy entry currently matches the installed
//! package: any-match signature intersection plus strictly exclusive version
//! bounds.

use crate::common::{PackageMetadata, PolicyEntry, Signature};
use std::collections::HashSet;

/// True when `entry` matches the live installed-package metadata.
///
/// The signature check is skipped only when the entry declares a system-app
/// requirement and the installed package actually is a system app (or an
/// updated system app). Version bounds of 0 are unbounded; set bounds are
/// exclusive on both ends.
pub fn is_installed_package_matching(
    entry: &PolicyEntry,
    installed: Option<&PackageMetadata>,
) -> bool {
    let Some(installed) = installed else {
        return false;
    };
    if !entry.is_system_app
        || (!installed.is_system_app && !installed.is_updated_system_app)
    {
        if !is_any_signature_matching(&installed.signatures, &entry.signatures) {
            return false;
        }
    }
    let version = installed.version_code;
    if entry.min_version == 0 {
        if entry.max_version == 0 {
            true // all versions
        } else {
            entry.max_version > version
        }
    } else if entry.max_version == 0 {
        entry.min_version < version
    } else {
        entry.min_version < version && entry.max_version > version
    }
}

/// Any signature from the policy appearing in the package's signature set is
/// treated as matching.
fn is_any_signature_matching(from_package: &[Signature], from_policy: &[Signature]) -> bool {
    if from_package.is_empty() {
        return false;
    }
    let set_from_package: HashSet<&Signature> = from_package.iter().collect();
    from_policy.iter().any(|sig| set_from_package.contains(sig))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(byte: u8) -> Signature {
        Signature(vec![byte; 4])
    }

    fn entry(min_version: i64, max_version: i64) -> PolicyEntry {
        PolicyEntry {
            package_name: "com.example".to_string(),
            activities: vec![],
            covers_whole_package: true,
            is_system_app: false,
            min_version,
            max_version,
            signatures: vec![sig(1)],
        }
    }

    fn installed(version_code: i64) -> PackageMetadata {
        PackageMetadata {
            package_name: "com.example".to_string(),
            version_code,
            signatures: vec![sig(1)],
            ..Default::default()
        }
    }

    #[test]
    fn missing_package_never_matches() {
        assert!(!is_installed_package_matching(&entry(0, 0), None));
    }

    #[test]
    fn unbounded_versions_match_anything() {
        assert!(is_installed_package_matching(&entry(0, 0), Some(&installed(1))));
        assert!(is_installed_package_matching(&entry(0, 0), Some(&installed(i64::MAX))));
    }

    #[test]
    fn version_bounds_are_strictly_exclusive() {
        let e = entry(5, 10);
        assert!(!is_installed_package_matching(&e, Some(&installed(5))));
        for v in 6..=9 {
            assert!(is_installed_package_matching(&e, Some(&installed(v))), "version {v}");
        }
        assert!(!is_installed_package_matching(&e, Some(&installed(10))));
    }

    #[test]
    fn min_only_bound_is_exclusive() {
        let e = entry(5, 0);
        assert!(!is_installed_package_matching(&e, Some(&installed(5))));
        assert!(is_installed_package_matching(&e, Some(&installed(6))));
    }

    #[test]
    fn max_only_bound_is_exclusive() {
        let e = entry(0, 5);
        assert!(is_installed_package_matching(&e, Some(&installed(4))));
        assert!(!is_installed_package_matching(&e, Some(&installed(5))));
    }

    #[test]
    fn any_single_signature_overlap_matches() {
        let mut e = entry(0, 0);
        e.signatures = vec![sig(9), sig(1)];
        let pkg = installed(3);
        assert!(is_installed_package_matching(&e, Some(&pkg)));
    }

    #[test]
    fn disjoint_signatures_do_not_match() {
        let mut e = entry(0, 0);
        e.signatures = vec![sig(9)];
        assert!(!is_installed_package_matching(&e, Some(&installed(3))));
    }

    #[test]
    fn system_app_entry_skips_signature_check_for_system_packages() {
        let mut e = entry(0, 0);
        e.is_system_app = true;
        e.signatures = vec![sig(9)]; // would not match
        let mut pkg = installed(3);
        pkg.is_system_app = true;
        assert!(is_installed_package_matching(&e, Some(&pkg)));
    }

    #[test]
    fn system_app_entry_still_checks_signature_for_user_packages() {
        let mut e = entry(0, 0);
        e.is_system_app = true;
        e.signatures = vec![sig(9)];
        let pkg = installed(3); // not a system app
        assert!(!is_installed_package_matching(&e, Some(&pkg)));
    }
}
