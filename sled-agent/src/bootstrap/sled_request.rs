// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The ledgered request which told this sled which sled agent to become.
//!
//! The first [StartSledAgentRequest] a sled accepts is recorded in every
//! ledger directory and read back on each later boot. A sled never changes
//! identity: a later request naming another sled, rack or subnet is refused.

use crate::config::ledger_paths;
use camino::Utf8PathBuf;
use oxnet::Ipv6Net;
use rss_common::api::external;
use rss_common::ledger::{self, Ledger};
use sled_agent_types::sled::{
    PersistentSledAgentRequest, StartSledAgentRequest, SLED_AGENT_REQUEST_FILE,
};
use slog::Logger;
use uuid::Uuid;

#[derive(thiserror::Error, Debug)]
pub enum SledRequestError {
    #[error(
        "Sled Agent already initialized with UUID {current}, but {requested} \
         was requested"
    )]
    SledIdMismatch { current: Uuid, requested: Uuid },

    #[error(
        "Sled Agent already initialized for rack {current}, but rack \
         {requested} was requested"
    )]
    RackIdMismatch { current: Uuid, requested: Uuid },

    #[error(
        "Sled Agent already initialized on subnet {current}, but {requested} \
         was requested"
    )]
    SubnetMismatch { current: Ipv6Net, requested: Ipv6Net },

    #[error("Failed to access ledger: {0}")]
    Ledger(#[from] ledger::Error),
}

impl From<SledRequestError> for external::Error {
    fn from(err: SledRequestError) -> Self {
        match err {
            SledRequestError::Ledger(err) => err.into(),
            SledRequestError::SledIdMismatch { .. }
            | SledRequestError::RackIdMismatch { .. }
            | SledRequestError::SubnetMismatch { .. } => {
                external::Error::invalid_request(&err.to_string())
            }
        }
    }
}

/// Returns the request this sled was initialized with, if any.
pub async fn load(
    log: &Logger,
    ledger_dirs: &[Utf8PathBuf],
) -> Option<StartSledAgentRequest> {
    let paths = ledger_paths(ledger_dirs, SLED_AGENT_REQUEST_FILE);
    let ledger = Ledger::<PersistentSledAgentRequest>::new(log, paths).await?;
    let request = ledger.into_inner().request;
    info!(
        log,
        "Sled already configured";
        "sled_id" => %request.id,
        "rack_id" => %request.rack_id,
    );
    Some(request)
}

/// Records `request` as this sled's identity, unless one is recorded already.
///
/// Idempotent for a request naming the same sled, rack and subnet; in that
/// case the recorded request is returned unchanged.
pub async fn ensure(
    log: &Logger,
    ledger_dirs: &[Utf8PathBuf],
    request: &StartSledAgentRequest,
) -> Result<StartSledAgentRequest, SledRequestError> {
    if let Some(current) = load(log, ledger_dirs).await {
        if current.id != request.id {
            return Err(SledRequestError::SledIdMismatch {
                current: current.id,
                requested: request.id,
            });
        }
        if current.rack_id != request.rack_id {
            return Err(SledRequestError::RackIdMismatch {
                current: current.rack_id,
                requested: request.rack_id,
            });
        }
        if current.subnet != request.subnet {
            return Err(SledRequestError::SubnetMismatch {
                current: current.subnet.net(),
                requested: request.subnet.net(),
            });
        }
        return Ok(current);
    }

    info!(log, "Recording sled agent request"; "sled_id" => %request.id);
    let paths = ledger_paths(ledger_dirs, SLED_AGENT_REQUEST_FILE);
    let mut ledger = Ledger::new_with(
        log,
        paths,
        PersistentSledAgentRequest { request: request.clone() },
    );
    ledger.commit().await?;
    Ok(ledger.into_inner().request)
}

#[cfg(test)]
mod test {
    use super::*;
    use camino_tempfile::Utf8TempDir;
    use rss_common::address::Ipv6Subnet;
    use rss_test_utils::dev::test_setup_log;

    fn request() -> StartSledAgentRequest {
        StartSledAgentRequest {
            id: Uuid::new_v4(),
            rack_id: Uuid::new_v4(),
            ntp_servers: vec!["ntp.eng.oxide.computer".to_string()],
            dns_servers: vec!["1.1.1.1".parse().unwrap()],
            use_trust_quorum: false,
            subnet: Ipv6Subnet::new("fd00:1122:3344:101::".parse().unwrap()),
        }
    }

    fn dirs_of(dirs: &[Utf8TempDir]) -> Vec<Utf8PathBuf> {
        dirs.iter().map(|d| d.path().to_owned()).collect()
    }

    #[tokio::test]
    async fn test_request_survives_restart() {
        let logctx = test_setup_log("test_request_survives_restart");
        let log = &logctx.log;
        let dirs = [Utf8TempDir::new().unwrap(), Utf8TempDir::new().unwrap()];
        let ledger_dirs = dirs_of(&dirs);

        assert_eq!(load(log, &ledger_dirs).await, None);
        let first = request();
        assert_eq!(ensure(log, &ledger_dirs, &first).await.unwrap(), first);
        for dir in &ledger_dirs {
            assert!(dir.join(SLED_AGENT_REQUEST_FILE).exists());
        }

        // After a restart, the same request is accepted again, and a request
        // differing only in its services keeps the recorded one.
        assert_eq!(load(log, &ledger_dirs).await, Some(first.clone()));
        let mut resent = first.clone();
        resent.ntp_servers = vec!["time.example.com".to_string()];
        assert_eq!(ensure(log, &ledger_dirs, &resent).await.unwrap(), first);
        assert_eq!(load(log, &ledger_dirs).await, Some(first.clone()));

        // One surviving copy is enough.
        std::fs::remove_file(ledger_dirs[0].join(SLED_AGENT_REQUEST_FILE))
            .unwrap();
        assert_eq!(load(log, &ledger_dirs).await, Some(first));
        logctx.cleanup_successful();
    }

    #[tokio::test]
    async fn test_identity_is_immutable() {
        let logctx = test_setup_log("test_identity_is_immutable");
        let log = &logctx.log;
        let dirs = [Utf8TempDir::new().unwrap()];
        let ledger_dirs = dirs_of(&dirs);

        let first = request();
        ensure(log, &ledger_dirs, &first).await.unwrap();

        let mut other_sled = first.clone();
        other_sled.id = Uuid::new_v4();
        let err = ensure(log, &ledger_dirs, &other_sled).await.unwrap_err();
        assert!(
            matches!(
                err,
                SledRequestError::SledIdMismatch { current, requested }
                    if current == first.id && requested == other_sled.id
            ),
            "{err}"
        );

        let mut other_rack = first.clone();
        other_rack.rack_id = Uuid::new_v4();
        let err = ensure(log, &ledger_dirs, &other_rack).await.unwrap_err();
        assert!(
            matches!(err, SledRequestError::RackIdMismatch { .. }),
            "{err}"
        );

        let mut other_subnet = first.clone();
        other_subnet.subnet =
            Ipv6Subnet::new("fd00:1122:3344:102::".parse().unwrap());
        let err = ensure(log, &ledger_dirs, &other_subnet).await.unwrap_err();
        assert!(
            matches!(err, SledRequestError::SubnetMismatch { .. }),
            "{err}"
        );
        assert!(matches!(
            external::Error::from(err),
            external::Error::InvalidRequest { .. }
        ));

        // Nothing was overwritten.
        assert_eq!(load(log, &ledger_dirs).await, Some(first));
        logctx.cleanup_successful();
    }
}
