// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Status of rack-level operations run by a bootstrap agent.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifies a single attempt to initialize the rack.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    JsonSchema,
)]
#[serde(transparent)]
pub struct RackInitId(pub Uuid);

impl RackInitId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RackInitId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RackInitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifies a single attempt to reset the rack.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    JsonSchema,
)]
#[serde(transparent)]
pub struct RackResetId(pub Uuid);

impl RackResetId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RackResetId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RackResetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Current status of any rack-level operation being performed by this bootstrap
/// agent.
#[derive(
    Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RackOperationStatus {
    Initializing {
        id: RackInitId,
        step: RssStep,
    },
    /// `id` will be none if the rack was already initialized on startup.
    Initialized {
        id: Option<RackInitId>,
    },
    InitializationFailed {
        id: RackInitId,
        message: String,
    },
    InitializationPanicked {
        id: RackInitId,
    },
    Resetting {
        id: RackResetId,
    },
    /// `reset_id` will be None if the rack is in an uninitialized-on-startup,
    /// or Some if it is in an uninitialized state due to a reset operation
    /// completing.
    Uninitialized {
        reset_id: Option<RackResetId>,
    },
    ResetFailed {
        id: RackResetId,
        message: String,
    },
    ResetPanicked {
        id: RackResetId,
    },
}

/// Steps we go through during initial rack setup.
#[derive(
    Copy,
    Clone,
    Debug,
    Deserialize,
    Eq,
    Hash,
    JsonSchema,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RssStep {
    Requested,
    Starting,
    LoadExistingPlan,
    CreateSledPlan,
    InitTrustQuorum,
    SledsInit,
    InitNtp,
    WaitForTimeSync,
    Handoff,
}
