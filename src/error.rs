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

//! Errors surfaced by the public service API. Lookup misses are ordinary
//! negative results, not errors; only caller mistakes, missing permissions
//! and collaborator failures reach this type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolicyError {
    /// The caller passed an empty name or a malformed flag combination.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The caller lacks the capability required for the operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The service has been released and no longer accepts requests.
    #[error("service stopped")]
    ServiceStopped,

    /// A collaborator call (task monitor, package inspector) failed.
    #[error(transparent)]
    Platform(#[from] anyhow::Error),
}

pub type PolicyResult<T> = std::result::Result<T, PolicyError>;
