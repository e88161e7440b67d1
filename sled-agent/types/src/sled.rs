// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Sled-related types for the Sled Agent API.

use rss_common::address::{self, Ipv6Subnet, SLED_PREFIX};
use rss_common::ledger::Ledgerable;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddrV6};
use uuid::Uuid;

/// The filename of the ledger holding a sled's [`PersistentSledAgentRequest`].
pub const SLED_AGENT_REQUEST_FILE: &str = "sled-agent-request.json";

/// Configuration information for launching a Sled Agent.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct StartSledAgentRequest {
    /// Uuid of the Sled Agent to be created.
    pub id: Uuid,

    /// Uuid of the rack to which this sled agent belongs.
    pub rack_id: Uuid,

    /// The external NTP servers to use
    pub ntp_servers: Vec<String>,

    /// The external DNS servers to use
    pub dns_servers: Vec<IpAddr>,

    /// Use trust quorum for key generation
    pub use_trust_quorum: bool,

    /// Portion of the IP space to be managed by the Sled Agent.
    pub subnet: Ipv6Subnet<SLED_PREFIX>,
}

impl StartSledAgentRequest {
    /// Returns the address on which this sled's agent listens.
    pub fn sled_address(&self) -> SocketAddrV6 {
        address::get_sled_address(self.subnet)
    }
}

/// The record a sled agent reads at startup to learn who it is.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct PersistentSledAgentRequest {
    pub request: StartSledAgentRequest,
}

impl Ledgerable for PersistentSledAgentRequest {
    // Once written, the request is never superseded by another copy.
    fn is_newer_than(&self, _other: &Self) -> bool {
        false
    }
}
