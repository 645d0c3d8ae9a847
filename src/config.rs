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

//! Static service configuration. The engine never reads files itself; the
//! embedding layer deserializes this from wherever it keeps configuration.

use crate::common::ComponentName;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Whitelist configuration string (`pkg` or `pkg/Activity`, comma
    /// separated). Absent means no configured whitelist.
    #[serde(default)]
    pub activity_whitelist: Option<String>,

    /// Blacklist configuration string, same grammar.
    #[serde(default)]
    pub activity_blacklist: Option<String>,

    /// The component the engine redirects to when blocking an activity.
    pub blocking_surface: ComponentName,

    /// Initial administrative enforcement toggle.
    #[serde(default = "default_enforcement")]
    pub enforcement_enabled: bool,
}

impl ServiceConfig {
    pub fn new(blocking_surface: ComponentName) -> Self {
        Self {
            activity_whitelist: None,
            activity_blacklist: None,
            blocking_surface,
            enforcement_enabled: true,
        }
    }
}

fn default_enforcement() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_with_defaults() {
        let config: ServiceConfig = serde_json::from_str(
            r#"{"blocking_surface": {"package": "com.blocker", "class": "Blocking"}}"#,
        )
        .unwrap();
        assert!(config.enforcement_enabled);
        assert!(config.activity_whitelist.is_none());
        assert_eq!(config.blocking_surface.package, "com.blocker");
    }
}
