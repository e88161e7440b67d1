// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Plan generation for "how should sleds be initialized".

use crate::config::ledger_paths;
use camino::Utf8PathBuf;
use oxnet::Ipv6Net;
use rss_common::address::{
    Ipv6Subnet, BOOTSTRAP_AGENT_RACK_INIT_PORT, SLED_PREFIX,
};
use rss_common::api::external;
use rss_common::ledger::{self, Ledger, Ledgerable};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sled_agent_types::rack_init::{
    BootstrapAddressDiscovery, RackInitializeRequest,
    RackInitializeRequestError,
};
use sled_agent_types::sled::StartSledAgentRequest;
use sled_hardware_types::Baseboard;
use slog::Logger;
use std::collections::{BTreeMap, BTreeSet};
use std::net::{Ipv6Addr, SocketAddrV6};
use thiserror::Error;
use uuid::Uuid;

/// The filename of the ledger holding the rack's [`Plan`].
pub const RSS_SLED_PLAN_FILENAME: &str = "rss-sled-plan.json";

/// The most sleds a single rack subnet can address; index 0 is reserved.
pub const MAX_SLEDS: usize = u8::MAX as usize;

/// Describes errors which may occur while generating a plan for sleds.
#[derive(Error, Debug)]
pub enum PlanError {
    #[error("Invalid rack configuration: {0}")]
    Config(#[from] RackInitializeRequestError),

    #[error("Sled with bootstrap address {addr} was not discovered")]
    MissingBootstrapSled { addr: Ipv6Addr },

    #[error(
        "Baseboard {baseboard} was reported by sleds at both {first} and \
         {second}"
    )]
    DuplicateBaseboard { baseboard: Baseboard, first: Ipv6Addr, second: Ipv6Addr },

    #[error("No sleds were selected for initialization")]
    NoSleds,

    #[error("Found {count} sleds, but at most {max} can be initialized")]
    TooManySleds { count: usize, max: usize },

    #[error("Trust quorum peer {peer} is not among the discovered sleds")]
    UnknownQuorumPeer { peer: Baseboard },

    #[error("Sled {sled_id} belongs to rack {found}, not rack {expected}")]
    SledInOtherRack { sled_id: Uuid, found: Uuid, expected: Uuid },

    #[error("Sled id {sled_id} was assigned more than once")]
    DuplicateSledId { sled_id: Uuid },

    #[error("Sled subnet {subnet} was assigned more than once")]
    DuplicateSledSubnet { subnet: Ipv6Net },

    #[error("Sled subnet {subnet} is not a sled subnet of the rack")]
    SubnetOutsideRack { subnet: Ipv6Net },

    #[error("Failed to access ledger: {0}")]
    Ledger(#[from] ledger::Error),
}

impl From<PlanError> for external::Error {
    fn from(err: PlanError) -> Self {
        match err {
            PlanError::Config(err) => err.into(),
            PlanError::Ledger(err) => err.into(),
            PlanError::MissingBootstrapSled { .. }
            | PlanError::DuplicateBaseboard { .. }
            | PlanError::NoSleds
            | PlanError::TooManySleds { .. }
            | PlanError::UnknownQuorumPeer { .. }
            | PlanError::SledInOtherRack { .. }
            | PlanError::DuplicateSledId { .. }
            | PlanError::DuplicateSledSubnet { .. }
            | PlanError::SubnetOutsideRack { .. } => {
                external::Error::invalid_request(&err.to_string())
            }
        }
    }
}

impl Ledgerable for Plan {
    fn is_newer_than(&self, _other: &Self) -> bool {
        true
    }
}

#[derive(Deserialize)]
struct UnvalidatedPlan {
    rack_id: Uuid,
    sleds: BTreeMap<SocketAddrV6, StartSledAgentRequest>,
    config: RackInitializeRequest,
}

impl TryFrom<UnvalidatedPlan> for Plan {
    type Error = PlanError;

    fn try_from(value: UnvalidatedPlan) -> Result<Self, Self::Error> {
        let plan = Plan {
            rack_id: value.rack_id,
            sleds: value.sleds,
            config: value.config,
        };
        plan.validate()?;
        Ok(plan)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(try_from = "UnvalidatedPlan")]
pub struct Plan {
    pub rack_id: Uuid,
    pub sleds: BTreeMap<SocketAddrV6, StartSledAgentRequest>,

    // Store the provided RSS configuration as part of the sled plan; if it
    // changes after reboot, we need to know.
    pub config: RackInitializeRequest,
}

impl Plan {
    /// Checks that every sled belongs to this rack and has its own identity
    /// and sled subnet within the rack subnet.
    pub fn validate(&self) -> Result<(), PlanError> {
        if self.sleds.is_empty() {
            return Err(PlanError::NoSleds);
        }
        if self.sleds.len() > MAX_SLEDS {
            return Err(PlanError::TooManySleds {
                count: self.sleds.len(),
                max: MAX_SLEDS,
            });
        }

        let rack_sled_subnets: BTreeSet<Ipv6Subnet<SLED_PREFIX>> =
            (1..=u8::MAX).map(|i| self.config.sled_subnet(i)).collect();
        let mut ids = BTreeSet::new();
        let mut subnets = BTreeSet::new();
        for request in self.sleds.values() {
            if request.rack_id != self.rack_id {
                return Err(PlanError::SledInOtherRack {
                    sled_id: request.id,
                    found: request.rack_id,
                    expected: self.rack_id,
                });
            }
            if !ids.insert(request.id) {
                return Err(PlanError::DuplicateSledId { sled_id: request.id });
            }
            if !rack_sled_subnets.contains(&request.subnet) {
                return Err(PlanError::SubnetOutsideRack {
                    subnet: request.subnet.net(),
                });
            }
            if !subnets.insert(request.subnet) {
                return Err(PlanError::DuplicateSledSubnet {
                    subnet: request.subnet.net(),
                });
            }
        }
        Ok(())
    }

    /// Loads a previously committed plan from any of `ledger_dirs`.
    pub async fn load(
        log: &Logger,
        ledger_dirs: &[Utf8PathBuf],
    ) -> Result<Option<Self>, PlanError> {
        let paths = ledger_paths(ledger_dirs, RSS_SLED_PLAN_FILENAME);

        // If we already created a plan for this RSS to allocate
        // subnets/requests to sleds, re-use that existing plan.
        let ledger = Ledger::<Self>::new(log, paths).await;
        if let Some(ledger) = ledger {
            info!(log, "RSS plan already created, loading from file");
            Ok(Some(ledger.into_inner()))
        } else {
            Ok(None)
        }
    }

    /// Assigns a subnet and identity to every sled that will join the rack.
    ///
    /// `discovered` maps each bootstrap address seen on the bootstrap network
    /// to the baseboard that sled reported.  The result depends only on the
    /// arguments.
    pub fn create(
        log: &Logger,
        config: &RackInitializeRequest,
        rack_id: Uuid,
        our_bootstrap_address: Ipv6Addr,
        discovered: &BTreeMap<Ipv6Addr, Baseboard>,
    ) -> Result<Self, PlanError> {
        config.validate()?;

        let selected: Vec<Ipv6Addr> = match &config.bootstrap_discovery {
            BootstrapAddressDiscovery::OnlyOurs => {
                vec![our_bootstrap_address]
            }
            BootstrapAddressDiscovery::OnlyThese { addrs } => {
                addrs.iter().copied().collect()
            }
        };

        let mut by_baseboard: BTreeMap<&Baseboard, Ipv6Addr> = BTreeMap::new();
        for addr in selected {
            let baseboard = discovered
                .get(&addr)
                .ok_or(PlanError::MissingBootstrapSled { addr })?;
            if let Some(first) = by_baseboard.insert(baseboard, addr) {
                return Err(PlanError::DuplicateBaseboard {
                    baseboard: baseboard.clone(),
                    first,
                    second: addr,
                });
            }
        }

        if by_baseboard.is_empty() {
            return Err(PlanError::NoSleds);
        }
        if by_baseboard.len() > MAX_SLEDS {
            return Err(PlanError::TooManySleds {
                count: by_baseboard.len(),
                max: MAX_SLEDS,
            });
        }

        if let Some(peers) = &config.trust_quorum_peers {
            let known: BTreeSet<&Baseboard> =
                by_baseboard.keys().copied().collect();
            if let Some(peer) = peers.iter().find(|p| !known.contains(p)) {
                return Err(PlanError::UnknownQuorumPeer { peer: peer.clone() });
            }
        }

        let use_trust_quorum = config.trust_quorum_peers.is_some();

        // Iterating the map visits sleds in baseboard order, so subnet
        // assignment does not depend on the order of discovery.
        let mut sleds = BTreeMap::new();
        for (idx, (baseboard, bootstrap_addr)) in
            by_baseboard.into_iter().enumerate()
        {
            let sled_subnet_index = u8::try_from(idx + 1).map_err(|_| {
                PlanError::TooManySleds { count: idx + 1, max: MAX_SLEDS }
            })?;
            let subnet = config.sled_subnet(sled_subnet_index);
            let id = Uuid::new_v5(&rack_id, baseboard.to_string().as_bytes());
            info!(
                log,
                "Creating plan for sled";
                "bootstrap_addr" => %bootstrap_addr,
                "baseboard" => %baseboard,
                "sled_id" => %id,
                "subnet" => ?subnet,
            );

            let bootstrap_addr = SocketAddrV6::new(
                bootstrap_addr,
                BOOTSTRAP_AGENT_RACK_INIT_PORT,
                0,
                0,
            );
            sleds.insert(
                bootstrap_addr,
                StartSledAgentRequest {
                    id,
                    rack_id,
                    ntp_servers: config.ntp_servers.clone(),
                    dns_servers: config.dns_servers.clone(),
                    use_trust_quorum,
                    subnet,
                },
            );
        }

        Ok(Self { rack_id, sleds, config: config.clone() })
    }

    /// Writes this plan to every one of `ledger_dirs`.
    pub async fn commit(
        &self,
        log: &Logger,
        ledger_dirs: &[Utf8PathBuf],
    ) -> Result<(), PlanError> {
        let paths = ledger_paths(ledger_dirs, RSS_SLED_PLAN_FILENAME);
        let mut ledger = Ledger::<Self>::new_with(log, paths, self.clone());
        ledger.commit().await?;
        info!(log, "Sled plan written to storage");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rss_test_utils::dev::test_setup_log;
    use sled_agent_types::rack_init::rack_initialize_request_test_config;

    const RACK_ID: &str = "c19a698f-c6f9-4a17-ae30-20d711b8f7dc";

    fn rack_id() -> Uuid {
        RACK_ID.parse().unwrap()
    }

    fn bootstrap_addr(n: u16) -> Ipv6Addr {
        Ipv6Addr::new(0xfdb0, 0xa840, 0x2504, 0x1, 0, 0, 0, n)
    }

    fn gimlet(serial: &str) -> Baseboard {
        Baseboard::new_gimlet(serial.to_string(), "913-0000019".to_string(), 6)
    }

    fn config_with_sleds(addrs: &[Ipv6Addr]) -> RackInitializeRequest {
        let mut config = rack_initialize_request_test_config();
        config.bootstrap_discovery = BootstrapAddressDiscovery::OnlyThese {
            addrs: addrs.iter().copied().collect(),
        };
        config
    }

    fn key(addr: Ipv6Addr) -> SocketAddrV6 {
        SocketAddrV6::new(addr, BOOTSTRAP_AGENT_RACK_INIT_PORT, 0, 0)
    }

    #[test]
    fn test_only_ours() {
        let logctx = test_setup_log("test_only_ours");
        let config = rack_initialize_request_test_config();
        let discovered = BTreeMap::from([
            (bootstrap_addr(1), gimlet("BRM01")),
            (bootstrap_addr(2), gimlet("BRM02")),
        ]);

        let plan = Plan::create(
            &logctx.log,
            &config,
            rack_id(),
            bootstrap_addr(2),
            &discovered,
        )
        .unwrap();
        assert_eq!(plan.rack_id, rack_id());
        assert_eq!(plan.sleds.len(), 1);
        let request = &plan.sleds[&key(bootstrap_addr(2))];
        assert_eq!(request.rack_id, rack_id());
        assert_eq!(request.subnet, config.sled_subnet(1));
        assert!(!request.use_trust_quorum);
        assert_eq!(request.ntp_servers, config.ntp_servers);

        // Our own address must have been discovered, too.
        let err = Plan::create(
            &logctx.log,
            &config,
            rack_id(),
            bootstrap_addr(3),
            &discovered,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            PlanError::MissingBootstrapSled { addr } if addr == bootstrap_addr(3)
        ));
        logctx.cleanup_successful();
    }

    #[test]
    fn test_subnets_follow_baseboard_order() {
        let logctx = test_setup_log("test_subnets_follow_baseboard_order");
        let addrs = [bootstrap_addr(1), bootstrap_addr(2), bootstrap_addr(3)];
        let config = config_with_sleds(&addrs);

        // The lowest address has the highest serial number.
        let discovered = BTreeMap::from([
            (addrs[0], gimlet("BRM03")),
            (addrs[1], gimlet("BRM01")),
            (addrs[2], gimlet("BRM02")),
        ]);
        let plan =
            Plan::create(&logctx.log, &config, rack_id(), addrs[0], &discovered)
                .unwrap();

        let subnet_of = |addr| plan.sleds[&key(addr)].subnet;
        assert_eq!(
            subnet_of(addrs[1]),
            Ipv6Subnet::<SLED_PREFIX>::new(
                "fd00:1122:3344:0101::".parse().unwrap()
            )
        );
        assert_eq!(subnet_of(addrs[2]), config.sled_subnet(2));
        assert_eq!(subnet_of(addrs[0]), config.sled_subnet(3));

        for request in plan.sleds.values() {
            assert_eq!(request.rack_id, plan.rack_id);
        }
        let ids: BTreeSet<_> = plan.sleds.values().map(|r| r.id).collect();
        assert_eq!(ids.len(), 3);
        logctx.cleanup_successful();
    }

    #[test]
    fn test_plan_is_deterministic() {
        let logctx = test_setup_log("test_plan_is_deterministic");
        let addrs = [bootstrap_addr(7), bootstrap_addr(3), bootstrap_addr(5)];
        let config = config_with_sleds(&addrs);
        let discovered: BTreeMap<_, _> = addrs
            .iter()
            .enumerate()
            .map(|(i, addr)| (*addr, gimlet(&format!("BRM0{i}"))))
            .collect();
        let reversed: BTreeMap<_, _> =
            discovered.clone().into_iter().rev().collect();

        let first =
            Plan::create(&logctx.log, &config, rack_id(), addrs[0], &discovered)
                .unwrap();
        let second =
            Plan::create(&logctx.log, &config, rack_id(), addrs[0], &reversed)
                .unwrap();
        assert_eq!(first.sleds, second.sleds);
        assert_eq!(
            serde_json::to_string(&first.sleds).unwrap(),
            serde_json::to_string(&second.sleds).unwrap()
        );

        // The sled id is derived from the rack id and baseboard.
        let expected_id =
            Uuid::new_v5(&rack_id(), gimlet("BRM00").to_string().as_bytes());
        assert_eq!(first.sleds[&key(addrs[0])].id, expected_id);
        logctx.cleanup_successful();
    }

    #[test]
    fn test_external_dns_outside_pool() {
        let logctx = test_setup_log("test_external_dns_outside_pool");
        let mut config = rack_initialize_request_test_config();
        config.external_dns_ips = vec!["10.0.1.5".parse().unwrap()];
        let discovered = BTreeMap::from([(bootstrap_addr(1), gimlet("BRM01"))]);
        let err = Plan::create(
            &logctx.log,
            &config,
            rack_id(),
            bootstrap_addr(1),
            &discovered,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            PlanError::Config(
                RackInitializeRequestError::ExternalDnsIpNotInPool { .. }
            )
        ));
        assert!(matches!(
            external::Error::from(err),
            external::Error::ExternalDnsIpNotInPool { .. }
        ));
        logctx.cleanup_successful();
    }

    #[test]
    fn test_sled_set_errors() {
        let logctx = test_setup_log("test_sled_set_errors");
        let log = &logctx.log;
        let addrs = [bootstrap_addr(1), bootstrap_addr(2), bootstrap_addr(3)];

        let duplicate = BTreeMap::from([
            (addrs[0], gimlet("BRM01")),
            (addrs[1], gimlet("BRM01")),
        ]);
        let err = Plan::create(
            log,
            &config_with_sleds(&addrs[..2]),
            rack_id(),
            addrs[0],
            &duplicate,
        )
        .unwrap_err();
        assert!(matches!(err, PlanError::DuplicateBaseboard { .. }), "{err}");

        let err = Plan::create(
            log,
            &config_with_sleds(&[]),
            rack_id(),
            addrs[0],
            &duplicate,
        )
        .unwrap_err();
        assert!(matches!(err, PlanError::NoSleds), "{err}");

        let discovered: BTreeMap<_, _> =
            addrs.iter().map(|a| (*a, gimlet(&a.to_string()))).collect();
        let mut config = config_with_sleds(&addrs);
        config.trust_quorum_peers = Some(vec![
            gimlet(&addrs[0].to_string()),
            gimlet(&addrs[1].to_string()),
            gimlet("BRM99"),
        ]);
        let err =
            Plan::create(log, &config, rack_id(), addrs[0], &discovered)
                .unwrap_err();
        assert!(
            matches!(
                &err,
                PlanError::UnknownQuorumPeer { peer } if *peer == gimlet("BRM99")
            ),
            "{err}"
        );

        config.trust_quorum_peers =
            Some(addrs.iter().map(|a| gimlet(&a.to_string())).collect());
        let plan = Plan::create(log, &config, rack_id(), addrs[0], &discovered)
            .unwrap();
        assert!(plan.sleds.values().all(|r| r.use_trust_quorum));
        logctx.cleanup_successful();
    }

    #[test]
    fn test_too_many_sleds() {
        let logctx = test_setup_log("test_too_many_sleds");
        let addrs: Vec<Ipv6Addr> =
            (1..=(MAX_SLEDS as u16 + 1)).map(bootstrap_addr).collect();
        let discovered: BTreeMap<_, _> = addrs
            .iter()
            .map(|a| (*a, Baseboard::new_pc(a.to_string(), "i86pc".into())))
            .collect();

        let err = Plan::create(
            &logctx.log,
            &config_with_sleds(&addrs),
            rack_id(),
            addrs[0],
            &discovered,
        )
        .unwrap_err();
        assert!(
            matches!(err, PlanError::TooManySleds { count: 256, max: 255 }),
            "{err}"
        );

        // A full rack is fine.
        let plan = Plan::create(
            &logctx.log,
            &config_with_sleds(&addrs[..MAX_SLEDS]),
            rack_id(),
            addrs[0],
            &discovered,
        )
        .unwrap();
        assert_eq!(plan.sleds.len(), MAX_SLEDS);
        logctx.cleanup_successful();
    }

    #[tokio::test]
    async fn test_commit_and_load() {
        let logctx = test_setup_log("test_commit_and_load");
        let dirs = vec![
            camino_tempfile::tempdir().unwrap(),
            camino_tempfile::tempdir().unwrap(),
        ];
        let ledger_dirs: Vec<Utf8PathBuf> =
            dirs.iter().map(|d| d.path().to_owned()).collect();

        assert!(Plan::load(&logctx.log, &ledger_dirs).await.unwrap().is_none());

        let config = rack_initialize_request_test_config();
        let discovered = BTreeMap::from([(bootstrap_addr(1), gimlet("BRM01"))]);
        let plan = Plan::create(
            &logctx.log,
            &config,
            rack_id(),
            bootstrap_addr(1),
            &discovered,
        )
        .unwrap();
        plan.commit(&logctx.log, &ledger_dirs).await.unwrap();
        for dir in &ledger_dirs {
            assert!(dir.join(RSS_SLED_PLAN_FILENAME).exists());
        }

        let loaded = Plan::load(&logctx.log, &ledger_dirs)
            .await
            .unwrap()
            .expect("plan should have been committed");
        assert_eq!(loaded, plan);
        logctx.cleanup_successful();
    }

    fn three_sled_plan(log: &Logger) -> Plan {
        let addrs = [bootstrap_addr(1), bootstrap_addr(2), bootstrap_addr(3)];
        let discovered: BTreeMap<_, _> =
            addrs.iter().map(|a| (*a, gimlet(&a.to_string()))).collect();
        Plan::create(
            log,
            &config_with_sleds(&addrs),
            rack_id(),
            addrs[0],
            &discovered,
        )
        .unwrap()
    }

    // Applies `f` to the first sled of `plan`'s JSON form and parses the
    // result.
    fn edit_first_sled(
        plan: &Plan,
        f: impl FnOnce(&mut serde_json::Value),
    ) -> Result<Plan, serde_json::Error> {
        let mut value = serde_json::to_value(plan).unwrap();
        let first = value["sleds"]
            .as_object_mut()
            .unwrap()
            .values_mut()
            .next()
            .unwrap();
        f(first);
        serde_json::from_value(value)
    }

    #[test]
    fn test_deserialize_validates_sleds() {
        let logctx = test_setup_log("test_deserialize_validates_sleds");
        let plan = three_sled_plan(&logctx.log);
        plan.validate().unwrap();
        let back: Plan =
            serde_json::from_value(serde_json::to_value(&plan).unwrap())
                .unwrap();
        assert_eq!(back, plan);

        let err = edit_first_sled(&plan, |sled| {
            sled["rack_id"] = Uuid::new_v4().to_string().into();
        })
        .unwrap_err();
        assert!(err.to_string().contains("belongs to rack"), "{err}");

        let second = plan.sleds.values().nth(1).unwrap().clone();
        let err = edit_first_sled(&plan, |sled| {
            sled["id"] = second.id.to_string().into();
        })
        .unwrap_err();
        assert!(err.to_string().contains("assigned more than once"), "{err}");

        let err = edit_first_sled(&plan, |sled| {
            sled["subnet"] = serde_json::to_value(second.subnet).unwrap();
        })
        .unwrap_err();
        assert!(err.to_string().contains("assigned more than once"), "{err}");

        // Index 0 of the rack subnet is reserved for rack-wide services.
        let err = edit_first_sled(&plan, |sled| {
            sled["subnet"] =
                serde_json::to_value(plan.config.sled_subnet(0)).unwrap();
        })
        .unwrap_err();
        assert!(err.to_string().contains("not a sled subnet"), "{err}");

        let err = edit_first_sled(&plan, |sled| {
            sled["subnet"] = serde_json::json!({ "net": "fd00:9999::/64" });
        })
        .unwrap_err();
        assert!(err.to_string().contains("not a sled subnet"), "{err}");
        logctx.cleanup_successful();
    }

    #[tokio::test]
    async fn test_load_ignores_tampered_plan() {
        let logctx = test_setup_log("test_load_ignores_tampered_plan");
        let dirs = vec![
            camino_tempfile::tempdir().unwrap(),
            camino_tempfile::tempdir().unwrap(),
        ];
        let ledger_dirs: Vec<Utf8PathBuf> =
            dirs.iter().map(|d| d.path().to_owned()).collect();
        let plan = three_sled_plan(&logctx.log);
        plan.commit(&logctx.log, &ledger_dirs).await.unwrap();

        // Move one sled of the first copy into another rack.
        let tampered_path = ledger_dirs[0].join(RSS_SLED_PLAN_FILENAME);
        let mut value: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(&tampered_path).unwrap(),
        )
        .unwrap();
        let sled = value["sleds"]
            .as_object_mut()
            .unwrap()
            .values_mut()
            .next()
            .unwrap();
        sled["rack_id"] = Uuid::new_v4().to_string().into();
        std::fs::write(&tampered_path, value.to_string()).unwrap();

        // The intact copy is still found.
        let loaded = Plan::load(&logctx.log, &ledger_dirs).await.unwrap();
        assert_eq!(loaded, Some(plan));

        // With only the tampered copy left, there is no plan to reuse.
        std::fs::remove_file(ledger_dirs[1].join(RSS_SLED_PLAN_FILENAME))
            .unwrap();
        let loaded = Plan::load(&logctx.log, &ledger_dirs).await.unwrap();
        assert_eq!(loaded, None);
        logctx.cleanup_successful();
    }

    proptest! {
        #[test]
        fn test_every_sled_gets_its_own_subnet(
            serials in prop::collection::btree_set("[A-Z]{3}[0-9]{4}", 1..32),
        ) {
            let logctx = test_setup_log("test_every_sled_gets_its_own_subnet");
            let discovered: BTreeMap<_, _> = serials
                .iter()
                .enumerate()
                .map(|(i, serial)| {
                    (bootstrap_addr(u16::try_from(i).unwrap() + 1), gimlet(serial))
                })
                .collect();
            let addrs: Vec<_> = discovered.keys().copied().collect();
            let config = config_with_sleds(&addrs);
            let plan = Plan::create(
                &logctx.log,
                &config,
                rack_id(),
                addrs[0],
                &discovered,
            )
            .unwrap();

            let subnets: BTreeSet<_> =
                plan.sleds.values().map(|r| r.subnet).collect();
            let expected: BTreeSet<_> = (1..=u8::try_from(serials.len()).unwrap())
                .map(|i| config.sled_subnet(i))
                .collect();
            prop_assert_eq!(subnets, expected);

            let ids: BTreeSet<_> = plan.sleds.values().map(|r| r.id).collect();
            prop_assert_eq!(ids.len(), serials.len());
        }
    }

    #[test]
    fn test_rss_sled_plan_schema() {
        let schema = schemars::schema_for!(Plan);
        let value = serde_json::to_value(&schema).unwrap();
        assert_eq!(value["title"], "Plan");
        for field in ["rack_id", "sleds", "config"] {
            assert!(
                value["properties"].get(field).is_some(),
                "missing {field} in schema"
            );
        }
    }
}
