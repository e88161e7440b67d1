// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Tracks the rack-level operations (initialize and reset) a bootstrap agent
//! may run, and refuses to start one that conflicts with the current state.

use rss_common::api::external;
use sled_agent_types::rack_init::RackInitializeRequest;
use sled_agent_types::rack_ops::{
    RackInitId, RackOperationStatus, RackResetId, RssStep,
};
use slog::Logger;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RssAccessError {
    #[error("Rack already initialized")]
    AlreadyInitialized,
    #[error("Rack uninitialized")]
    AlreadyUninitialized,
    #[error("Rack initialization in progress")]
    InitializationInProgress,
    #[error("Rack reset in progress")]
    ResetInProgress,
    #[error("Previous rack initialization attempt panicked")]
    InitializationPanicked,
    #[error("Previous rack reset attempt panicked")]
    ResetPanicked,
}

impl From<RssAccessError> for external::Error {
    fn from(err: RssAccessError) -> Self {
        match err {
            RssAccessError::InitializationPanicked
            | RssAccessError::ResetPanicked => {
                external::Error::internal_error(&err.to_string())
            }
            RssAccessError::AlreadyInitialized
            | RssAccessError::AlreadyUninitialized
            | RssAccessError::InitializationInProgress
            | RssAccessError::ResetInProgress => {
                external::Error::invalid_request(&err.to_string())
            }
        }
    }
}

/// Shared handle to the status of this bootstrap agent's rack operations.
#[derive(Debug, Clone)]
pub struct RssAccess {
    status: Arc<watch::Sender<RackOperationStatus>>,
}

/// Lets a running initialization report which step it has reached.
#[derive(Debug, Clone)]
pub struct RssProgress {
    id: RackInitId,
    status: Arc<watch::Sender<RackOperationStatus>>,
}

impl RssProgress {
    pub fn id(&self) -> RackInitId {
        self.id
    }

    /// Records that the initialization has reached `step`.
    ///
    /// Ignored once this attempt is no longer the one in progress.
    pub fn update(&self, step: RssStep) {
        set_step_if(&self.status, Some(self.id), step);
    }
}

fn set_step_if(
    status: &watch::Sender<RackOperationStatus>,
    expected_id: Option<RackInitId>,
    new_step: RssStep,
) -> bool {
    status.send_if_modified(|status| match status {
        RackOperationStatus::Initializing { id, step }
            if expected_id.map_or(true, |expected| expected == *id) =>
        {
            let changed = *step != new_step;
            *step = new_step;
            changed
        }
        _ => false,
    })
}

impl RssAccess {
    /// `initialized` reports whether the rack was already initialized when
    /// this bootstrap agent started.
    pub fn new(initialized: bool) -> Self {
        let status = if initialized {
            RackOperationStatus::Initialized { id: None }
        } else {
            RackOperationStatus::Uninitialized { reset_id: None }
        };
        let (status, _) = watch::channel(status);
        Self { status: Arc::new(status) }
    }

    pub fn operation_status(&self) -> RackOperationStatus {
        self.status.borrow().clone()
    }

    /// Returns a receiver which observes every status change.
    pub fn subscribe(&self) -> watch::Receiver<RackOperationStatus> {
        self.status.subscribe()
    }

    /// Updates the step of the initialization in progress, if any.
    pub fn set_step(&self, step: RssStep) -> bool {
        set_step_if(&self.status, None, step)
    }

    /// Starts initializing the rack by spawning `run` onto the runtime.
    ///
    /// Fails without spawning anything if the rack is already initialized or
    /// another operation is in progress. A failed attempt may be retried; a
    /// panicked one may not.
    pub fn start_initializing<F, Fut>(
        &self,
        log: &Logger,
        request: RackInitializeRequest,
        run: F,
    ) -> Result<RackInitId, RssAccessError>
    where
        F: FnOnce(RackInitializeRequest, RssProgress) -> Fut,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let id = RackInitId::new();
        let mut result = Ok(id);
        self.status.send_if_modified(|status| {
            match status {
                RackOperationStatus::Initializing { .. } => {
                    result = Err(RssAccessError::InitializationInProgress);
                }
                RackOperationStatus::Initialized { .. } => {
                    result = Err(RssAccessError::AlreadyInitialized);
                }
                RackOperationStatus::InitializationPanicked { .. } => {
                    result = Err(RssAccessError::InitializationPanicked);
                }
                RackOperationStatus::Resetting { .. } => {
                    result = Err(RssAccessError::ResetInProgress);
                }
                RackOperationStatus::ResetPanicked { .. } => {
                    result = Err(RssAccessError::ResetPanicked);
                }
                RackOperationStatus::InitializationFailed { .. }
                | RackOperationStatus::Uninitialized { .. }
                | RackOperationStatus::ResetFailed { .. } => {
                    *status = RackOperationStatus::Initializing {
                        id,
                        step: RssStep::Requested,
                    };
                }
            }
            result.is_ok()
        });
        let id = result?;

        let log = log.new(o!(
            "component" => "RssAccess",
            "rack_init_id" => id.to_string(),
        ));
        info!(log, "Starting rack initialization");
        let progress = RssProgress { id, status: self.status.clone() };
        let task = tokio::spawn(run(request, progress));

        let status = self.status.clone();
        tokio::spawn(async move {
            let new_status = match task.await {
                Ok(Ok(())) => {
                    info!(log, "Rack initialization completed");
                    RackOperationStatus::Initialized { id: Some(id) }
                }
                Ok(Err(err)) => {
                    warn!(
                        log,
                        "Rack initialization failed";
                        "error" => format!("{err:#}"),
                    );
                    RackOperationStatus::InitializationFailed {
                        id,
                        message: format!("{err:#}"),
                    }
                }
                Err(err) if err.is_panic() => {
                    error!(log, "Rack initialization panicked");
                    RackOperationStatus::InitializationPanicked { id }
                }
                Err(err) => {
                    warn!(log, "Rack initialization cancelled");
                    RackOperationStatus::InitializationFailed {
                        id,
                        message: err.to_string(),
                    }
                }
            };
            status.send_replace(new_status);
        });

        Ok(id)
    }

    /// Starts resetting the rack by spawning `run` onto the runtime.
    pub fn start_reset<F, Fut>(
        &self,
        log: &Logger,
        run: F,
    ) -> Result<RackResetId, RssAccessError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let id = RackResetId::new();
        let mut result = Ok(id);
        self.status.send_if_modified(|status| {
            match status {
                RackOperationStatus::Initializing { .. } => {
                    result = Err(RssAccessError::InitializationInProgress);
                }
                RackOperationStatus::InitializationPanicked { .. } => {
                    result = Err(RssAccessError::InitializationPanicked);
                }
                RackOperationStatus::Resetting { .. } => {
                    result = Err(RssAccessError::ResetInProgress);
                }
                RackOperationStatus::Uninitialized { .. } => {
                    result = Err(RssAccessError::AlreadyUninitialized);
                }
                RackOperationStatus::ResetPanicked { .. } => {
                    result = Err(RssAccessError::ResetPanicked);
                }
                RackOperationStatus::Initialized { .. }
                | RackOperationStatus::InitializationFailed { .. }
                | RackOperationStatus::ResetFailed { .. } => {
                    *status = RackOperationStatus::Resetting { id };
                }
            }
            result.is_ok()
        });
        let id = result?;

        let log = log.new(o!(
            "component" => "RssAccess",
            "rack_reset_id" => id.to_string(),
        ));
        info!(log, "Starting rack reset");
        let task = tokio::spawn(run());

        let status = self.status.clone();
        tokio::spawn(async move {
            let new_status = match task.await {
                Ok(Ok(())) => {
                    info!(log, "Rack reset completed");
                    RackOperationStatus::Uninitialized { reset_id: Some(id) }
                }
                Ok(Err(err)) => {
                    warn!(
                        log,
                        "Rack reset failed";
                        "error" => format!("{err:#}"),
                    );
                    RackOperationStatus::ResetFailed {
                        id,
                        message: format!("{err:#}"),
                    }
                }
                Err(err) if err.is_panic() => {
                    error!(log, "Rack reset panicked");
                    RackOperationStatus::ResetPanicked { id }
                }
                Err(err) => {
                    warn!(log, "Rack reset cancelled");
                    RackOperationStatus::ResetFailed {
                        id,
                        message: err.to_string(),
                    }
                }
            };
            status.send_replace(new_status);
        });

        Ok(id)
    }
}
