// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error handling facilities for rack and zone configuration
//!
//! Each module reports failures through its own error type.  Those that reach
//! an operator or a remote caller are converted into [`Error`], which carries
//! a machine-readable kind alongside a human-readable message.

use super::Generation;
use super::NameError;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;
use std::fmt::Display;
use std::net::IpAddr;

/// An error that can be generated while validating or applying configuration
///
/// General best practices for error design apply here.  Where possible, we
/// want to reuse existing variants rather than inventing new ones to
/// distinguish cases that no programmatic consumer needs to distinguish.
#[derive(
    Clone,
    Debug,
    Deserialize,
    thiserror::Error,
    JsonSchema,
    PartialEq,
    Serialize,
)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Error {
    /// A name did not satisfy the naming rules.
    #[error("Invalid Name: {message}")]
    InvalidName { message: String },
    /// A zpool name was not of the form `ox{i,p}_<UUID>`.
    #[error("Invalid Zpool Name: {message}")]
    InvalidZpoolName { message: String },
    /// An address range was decreasing or mixed address families.
    #[error("Invalid Range: {message}")]
    InvalidRange { message: String },
    /// A MAC address was not six colon-separated hex octets.
    #[error("Invalid MAC Address: {message}")]
    InvalidMacAddress { message: String },
    /// The specified input field is not valid.
    #[error("Invalid Value: {label}, {message}")]
    InvalidValue { label: String, message: String },

    /// A zone's services disagree with its declared zone type.
    #[error("Inconsistent Zone Composition: {message}")]
    InconsistentZoneComposition { message: String },
    /// A zone carries a dataset of a kind it cannot use.
    #[error("Incompatible Dataset: {message}")]
    IncompatibleDataset { message: String },
    /// A zone carries more than one primary network interface.
    #[error("Multiple Primary Interfaces: {message}")]
    MultiplePrimaryInterfaces { message: String },

    /// A request was older than the one already accepted.
    #[error(
        "Stale Generation: requested generation {requested} is older than \
         current generation {current}"
    )]
    StaleGeneration { requested: Generation, current: Generation },

    /// An external DNS address lies outside every service IP pool range.
    #[error(
        "External DNS IP {ip} is not contained in \
         `internal_services_ip_pool_ranges`"
    )]
    ExternalDnsIpNotInPool { ip: IpAddr },
    /// Too few trust quorum peers were supplied.
    #[error(
        "Insufficient Quorum Peers: found {found}, at least {required} \
         required"
    )]
    InsufficientQuorumPeers { found: usize, required: usize },
    /// The request was well-formed, but cannot be satisfied given the
    /// current configuration.
    #[error("Invalid Request: {message}")]
    InvalidRequest { message: String },

    /// The system encountered an unhandled operational error.
    #[error("Internal Error: {internal_message}")]
    InternalError { internal_message: String },
}

/// Broad classes of [`Error`], used to decide how a failure is surfaced
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed input, detected at parse or construction time.
    Validation,
    /// A zone description that is not self-consistent.
    Composition,
    /// Lost an optimistic concurrency race; retry with fresh state.
    Concurrency,
    /// Configuration that violates rack policy.
    Policy,
    /// Anything else.
    Internal,
}

impl Error {
    /// Returns whether the error is likely transient and could reasonably be
    /// retried
    pub fn retryable(&self) -> bool {
        match self {
            Error::StaleGeneration { .. } => true,

            Error::InvalidName { .. }
            | Error::InvalidZpoolName { .. }
            | Error::InvalidRange { .. }
            | Error::InvalidMacAddress { .. }
            | Error::InvalidValue { .. }
            | Error::InconsistentZoneComposition { .. }
            | Error::IncompatibleDataset { .. }
            | Error::MultiplePrimaryInterfaces { .. }
            | Error::ExternalDnsIpNotInPool { .. }
            | Error::InsufficientQuorumPeers { .. }
            | Error::InvalidRequest { .. }
            | Error::InternalError { .. } => false,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InvalidName { .. }
            | Error::InvalidZpoolName { .. }
            | Error::InvalidRange { .. }
            | Error::InvalidMacAddress { .. }
            | Error::InvalidValue { .. } => ErrorCategory::Validation,
            Error::InconsistentZoneComposition { .. }
            | Error::IncompatibleDataset { .. }
            | Error::MultiplePrimaryInterfaces { .. } => {
                ErrorCategory::Composition
            }
            Error::StaleGeneration { .. } => ErrorCategory::Concurrency,
            Error::ExternalDnsIpNotInPool { .. }
            | Error::InsufficientQuorumPeers { .. }
            | Error::InvalidRequest { .. } => ErrorCategory::Policy,
            Error::InternalError { .. } => ErrorCategory::Internal,
        }
    }

    /// Generates an [`Error::InternalError`] error with the specific message
    ///
    /// InternalError should be used for operational conditions that should not
    /// happen but that we cannot reasonably handle at runtime.
    pub fn internal_error(internal_message: &str) -> Error {
        Error::InternalError { internal_message: internal_message.to_owned() }
    }

    /// Generates an [`Error::InvalidRequest`] error with the specific message
    ///
    /// This should be used for failures due possibly to invalid client input
    /// or malformed requests.
    pub fn invalid_request(message: &str) -> Error {
        Error::InvalidRequest { message: message.to_owned() }
    }

    /// Generates an [`Error::InvalidValue`] error for the field `label`.
    pub fn invalid_value(label: &str, message: impl Display) -> Error {
        Error::InvalidValue {
            label: label.to_owned(),
            message: message.to_string(),
        }
    }

    /// Given an [`Error`] with an internal message, return the same error with
    /// `context` prepended to it to provide more context
    ///
    /// If the error has no internal message, then it is returned unchanged.
    pub fn internal_context<C>(self, context: C) -> Error
    where
        C: Display + Send + Sync + 'static,
    {
        match self {
            Error::InternalError { internal_message } => Error::InternalError {
                internal_message: format!("{}: {}", context, internal_message),
            },
            other => other,
        }
    }
}

impl From<NameError> for Error {
    fn from(err: NameError) -> Self {
        Error::InvalidName { message: err.to_string() }
    }
}

impl From<super::MacAddrError> for Error {
    fn from(err: super::MacAddrError) -> Self {
        Error::InvalidMacAddress { message: err.to_string() }
    }
}

impl From<super::VniError> for Error {
    fn from(err: super::VniError) -> Self {
        Error::invalid_value("vni", err)
    }
}
