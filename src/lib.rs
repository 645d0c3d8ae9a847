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

//! # App Blocking Policies
//!
//! A distraction-blocking policy engine for activity-based platforms. The
//! engine decides, per foreground activity, whether the app may keep running
//! while the operating context requires driver-distraction optimization, and
//! redirects violators to a designated blocking surface.
//!
//! Policy flows in from three sources: the static configuration strings, the
//! manifest metadata of every installed package, and external policy-provider
//! services collected once at init. Runtime clients holding the control
//! permission can additionally push their own whitelist/blacklist pairs.
//!
//! The engine is headless. It owns no OS bindings; the embedding layer
//! supplies the collaborators in [`platform::PlatformServices`] and feeds
//! launch, restriction and package-change events into
//! [`service::AppBlockingService`].

pub mod common;
pub mod config;
pub mod error;
pub mod platform;
pub mod scanner;
pub mod service;
pub mod store;
pub mod verifier;

mod provider;

pub use common::{
    AppBlockingPolicy, BlockingIntent, ComponentName, PackageMetadata, PolicyEntry,
    PolicyEntryWrapper, RestrictionState, ServiceDescriptor, SetPolicyFlags, Signature,
    TaskStackInfo, TopTaskInfo,
};
pub use config::ServiceConfig;
pub use error::{PolicyError, PolicyResult};
pub use platform::PlatformServices;
pub use service::AppBlockingService;
