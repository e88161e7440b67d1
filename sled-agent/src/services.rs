// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Sled-local service management.
//!
//! The [ServiceManager] owns the zones whose "source-of-truth" is the rack
//! setup service (or, eventually, Nexus):
//! [ServiceManager::ensure_all_zones] accepts a generation-numbered set of
//! zones, creates what is missing, removes what is no longer requested, and
//! records the result in a ledger so it survives a reboot.
//! [ServiceManager::load_services] re-creates the ledgered zones on a cold
//! boot without contacting anyone.

use crate::config::ledger_paths;
use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use rss_common::api::external::{self, Generation};
use rss_common::ledger::{self, Ledger};
use serde::Serialize;
use sled_agent_types::zone::{
    AllZoneRequests, ServiceZoneRequest, ZoneRequest, ZoneRequestError,
    SERVICES_LEDGER_FILENAME,
};
use slog::Logger;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

#[derive(thiserror::Error, Debug)]
pub enum ServiceError {
    #[error(
        "Requested generation {requested} is older than current generation \
         {current}"
    )]
    StaleGeneration { requested: Generation, current: Generation },

    #[error(transparent)]
    ZoneRequest(ZoneRequestError),

    #[error("Zone {zone} was requested more than once")]
    DuplicateZone { zone: String },

    #[error("Failed to create zone {zone}: {message}")]
    ZoneCreation { zone: String, message: String },

    #[error("Failed to destroy zone {zone}: {message}")]
    ZoneDestruction { zone: String, message: String },

    #[error("Failed to access ledger: {0}")]
    Ledger(#[from] ledger::Error),
}

impl From<ZoneRequestError> for ServiceError {
    fn from(err: ZoneRequestError) -> Self {
        match err {
            ZoneRequestError::StaleGeneration { requested, current } => {
                ServiceError::StaleGeneration { requested, current }
            }
            ZoneRequestError::DuplicateZone { zone } => {
                ServiceError::DuplicateZone { zone }
            }
            err => ServiceError::ZoneRequest(err),
        }
    }
}

impl From<ServiceError> for external::Error {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::StaleGeneration { requested, current } => {
                external::Error::StaleGeneration { requested, current }
            }
            ServiceError::ZoneRequest(err) => err.into(),
            ServiceError::DuplicateZone { .. } => {
                external::Error::invalid_request(&err.to_string())
            }
            ServiceError::ZoneCreation { .. }
            | ServiceError::ZoneDestruction { .. } => {
                external::Error::internal_error(&err.to_string())
            }
            ServiceError::Ledger(err) => err.into(),
        }
    }
}

/// The runtime that actually creates and destroys zones on this sled.
#[async_trait]
pub trait ZoneInstaller: Send + Sync {
    /// Creates and boots the zone described by `request`.
    async fn create_zone(&self, request: &ZoneRequest) -> anyhow::Result<()>;

    /// Halts and removes the zone named `zone_name`.
    async fn destroy_zone(&self, zone_name: &str) -> anyhow::Result<()>;
}

/// Where this sled is in applying the most recent set of zones.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ServiceState {
    /// No set of zones has been accepted yet.
    Uninitialized,
    /// A set of zones was submitted and is being checked.
    Requested { generation: Generation },
    /// The set was accepted and its zones are being created.
    Applying { generation: Generation },
    /// Every zone in the set is running.
    Applied { generation: Generation },
    /// Creating the set failed; the previous set remains in effect.
    Rejected { generation: Generation, reason: String },
}

impl ServiceState {
    pub fn generation(&self) -> Option<Generation> {
        match self {
            ServiceState::Uninitialized => None,
            ServiceState::Requested { generation }
            | ServiceState::Applying { generation }
            | ServiceState::Applied { generation }
            | ServiceState::Rejected { generation, .. } => Some(*generation),
        }
    }
}

// Everything protected by the service manager's lock.
struct ManagedZones {
    // The most recently accepted (and ledgered) set of zones, if any.
    requests: Option<AllZoneRequests>,
    // Zones believed to exist, by name.
    running: BTreeMap<String, ZoneRequest>,
}

/// Manages the zones a single sled has been asked to run.
pub struct ServiceManager {
    log: Logger,
    zones: Mutex<ManagedZones>,
    state: watch::Sender<ServiceState>,
    ledger_paths: Vec<Utf8PathBuf>,
    zone_root: Utf8PathBuf,
    installer: Arc<dyn ZoneInstaller>,
}

impl ServiceManager {
    /// Creates a service manager, loading any previously ledgered zones.
    ///
    /// Args:
    /// - `log`: The logger
    /// - `installer`: The runtime used to create and destroy zones
    /// - `ledger_dirs`: Directories holding copies of the services ledger
    /// - `zone_root`: The directory beneath which zones are created
    ///
    /// No zones are created; call [ServiceManager::load_services] for that.
    pub async fn new(
        log: &Logger,
        installer: Arc<dyn ZoneInstaller>,
        ledger_dirs: &[Utf8PathBuf],
        zone_root: Utf8PathBuf,
    ) -> Self {
        let log = log.new(o!("component" => "ServiceManager"));
        let ledger_paths = ledger_paths(ledger_dirs, SERVICES_LEDGER_FILENAME);

        let (requests, state) =
            match Ledger::<AllZoneRequests>::new(&log, ledger_paths.clone())
                .await
            {
                Some(ledger) => {
                    let requests = ledger.into_inner();
                    info!(
                        log,
                        "Loaded services ledger";
                        "generation" => %requests.generation,
                        "zones" => requests.requests().len(),
                    );
                    let generation = requests.generation;
                    (Some(requests), ServiceState::Applied { generation })
                }
                None => {
                    info!(log, "No services ledger found");
                    (None, ServiceState::Uninitialized)
                }
            };

        let (state, _) = watch::channel(state);
        Self {
            log,
            zones: Mutex::new(ManagedZones {
                requests,
                running: BTreeMap::new(),
            }),
            state,
            ledger_paths,
            zone_root,
            installer,
        }
    }

    /// Returns the current state of this sled's zones.
    pub fn state(&self) -> ServiceState {
        self.state.borrow().clone()
    }

    /// Returns a receiver which observes every state transition.
    pub fn subscribe(&self) -> watch::Receiver<ServiceState> {
        self.state.subscribe()
    }

    /// Returns the most recently accepted set of zones, or `None` if no set
    /// has been accepted yet.
    pub async fn zone_requests(&self) -> Option<AllZoneRequests> {
        self.zones.lock().await.requests.clone()
    }

    /// Returns the zones currently believed to be running, by name.
    pub async fn running_zones(&self) -> BTreeMap<String, ZoneRequest> {
        self.zones.lock().await.running.clone()
    }

    pub fn zone_root(&self) -> &Utf8Path {
        &self.zone_root
    }

    fn set_state(&self, state: ServiceState) {
        debug!(self.log, "Service state transition"; "state" => ?state);
        self.state.send_replace(state);
    }

    /// Creates every zone recorded in the services ledger.
    ///
    /// Used on a cold boot, when the ledger is the only source of truth.
    pub async fn load_services(&self) -> Result<(), ServiceError> {
        let mut managed = self.zones.lock().await;
        let requests = managed
            .requests
            .as_ref()
            .map(|set| set.requests().to_vec())
            .unwrap_or_default();
        for request in requests {
            let name = request.zone().zone_name();
            if managed.running.get(&name) == Some(&request) {
                continue;
            }
            info!(self.log, "Starting ledgered zone"; "zone" => &name);
            self.installer.create_zone(&request).await.map_err(|err| {
                ServiceError::ZoneCreation {
                    zone: name.clone(),
                    message: format!("{err:#}"),
                }
            })?;
            managed.running.insert(name, request);
        }
        Ok(())
    }

    /// Ensures that exactly the zones in `zones` are running on this sled.
    ///
    /// The request is accepted only if `generation` is at least the current
    /// generation; the first request is accepted at any generation. If any
    /// zone fails to be created, or the ledger cannot be written, the zones
    /// created by this call are destroyed and the previous set stays in
    /// effect.
    pub async fn ensure_all_zones(
        &self,
        generation: Generation,
        zones: Vec<ServiceZoneRequest>,
    ) -> Result<(), ServiceError> {
        let mut managed = self.zones.lock().await;

        let mut names = BTreeSet::new();
        let mut requests = Vec::with_capacity(zones.len());
        for zone in zones {
            let zone_name = zone.zone_name();
            if !names.insert(zone_name.clone()) {
                return Err(ServiceError::DuplicateZone { zone: zone_name });
            }
            requests.push(ZoneRequest::new(zone, self.zone_root.clone())?);
        }

        // Compare against a copy: the stored set only changes once every
        // zone is running and the ledger is written.
        let requested = AllZoneRequests::new(generation, requests)?;
        let new_set = match &managed.requests {
            Some(current) => {
                let mut new_set = current.clone();
                if let Err(err) = new_set.try_replace(requested) {
                    warn!(
                        self.log,
                        "Rejecting zone request";
                        "requested" => %generation,
                        "current" => %current.generation,
                    );
                    return Err(err.into());
                }
                new_set
            }
            None => requested,
        };

        self.set_state(ServiceState::Requested { generation });
        info!(
            self.log,
            "Applying zone request";
            "generation" => %generation,
            "zones" => new_set.requests().len(),
        );
        self.set_state(ServiceState::Applying { generation });

        let mut created: Vec<String> = vec![];
        let mut replaced: Vec<ZoneRequest> = vec![];
        for request in new_set.requests() {
            let zone_name = request.zone().zone_name();
            if let Some(existing) = managed.running.get(&zone_name) {
                if existing == request {
                    debug!(self.log, "Zone already running"; "zone" => &zone_name);
                    continue;
                }
                info!(self.log, "Replacing zone"; "zone" => &zone_name);
                let existing = existing.clone();
                if let Err(err) = self.installer.destroy_zone(&zone_name).await
                {
                    let err = ServiceError::ZoneDestruction {
                        zone: zone_name,
                        message: format!("{err:#}"),
                    };
                    self.rollback(&mut managed, created, replaced).await;
                    self.set_state(ServiceState::Rejected {
                        generation,
                        reason: err.to_string(),
                    });
                    return Err(err);
                }
                managed.running.remove(&zone_name);
                replaced.push(existing);
            }

            info!(self.log, "Creating zone"; "zone" => &zone_name);
            if let Err(err) = self.installer.create_zone(request).await {
                let err = ServiceError::ZoneCreation {
                    zone: zone_name,
                    message: format!("{err:#}"),
                };
                self.rollback(&mut managed, created, replaced).await;
                self.set_state(ServiceState::Rejected {
                    generation,
                    reason: err.to_string(),
                });
                return Err(err);
            }
            managed.running.insert(zone_name.clone(), request.clone());
            created.push(zone_name);
        }

        // The new set is ledgered before any unrequested zone is destroyed.
        let mut ledger =
            Ledger::new_with(&self.log, self.ledger_paths.clone(), new_set);
        if let Err(err) = ledger.commit().await {
            let err = ServiceError::from(err);
            self.rollback(&mut managed, created, replaced).await;
            self.set_state(ServiceState::Rejected {
                generation,
                reason: err.to_string(),
            });
            return Err(err);
        }

        // Remove zones that are no longer requested.
        let obsolete: Vec<String> = managed
            .running
            .keys()
            .filter(|name| !names.contains(*name))
            .cloned()
            .collect();
        for zone_name in obsolete {
            info!(self.log, "Destroying unrequested zone"; "zone" => &zone_name);
            match self.installer.destroy_zone(&zone_name).await {
                Ok(()) => {
                    managed.running.remove(&zone_name);
                }
                Err(err) => {
                    warn!(
                        self.log,
                        "Failed to destroy unrequested zone";
                        "zone" => &zone_name,
                        "error" => format!("{err:#}"),
                    );
                }
            }
        }

        managed.requests = Some(ledger.into_inner());
        self.set_state(ServiceState::Applied { generation });
        Ok(())
    }

    // Undoes a partially applied request: destroys the zones created in this
    // batch, then brings back any zone they replaced.
    async fn rollback(
        &self,
        managed: &mut ManagedZones,
        created: Vec<String>,
        replaced: Vec<ZoneRequest>,
    ) {
        warn!(
            self.log,
            "Rolling back zone request";
            "created" => ?created,
            "replaced" => replaced.len(),
        );
        let results = futures::future::join_all(
            created.iter().map(|name| self.installer.destroy_zone(name)),
        )
        .await;
        for (zone_name, result) in created.into_iter().zip(results) {
            match result {
                Ok(()) => {
                    managed.running.remove(&zone_name);
                }
                Err(err) => {
                    error!(
                        self.log,
                        "Failed to destroy zone during rollback";
                        "zone" => &zone_name,
                        "error" => format!("{err:#}"),
                    );
                }
            }
        }

        for request in replaced {
            let zone_name = request.zone().zone_name();
            match self.installer.create_zone(&request).await {
                Ok(()) => {
                    managed.running.insert(zone_name, request);
                }
                Err(err) => {
                    error!(
                        self.log,
                        "Failed to restore zone during rollback";
                        "zone" => &zone_name,
                        "error" => format!("{err:#}"),
                    );
                }
            }
        }
    }
}
