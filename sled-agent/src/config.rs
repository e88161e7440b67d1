// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Interfaces for working with sled agent configuration

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use slog::Drain;
use slog::Logger;
use std::fs::OpenOptions;
use std::io;

/// Configuration for a sled agent
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Configuration for the sled agent debug log
    pub log: ConfigLogging,
    /// Directories in which every ledger is written.
    pub ledger_dirs: Vec<Utf8PathBuf>,
    /// Root directory beneath which zones are created.
    pub zone_root: Utf8PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config from {path}: {err}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("Failed to parse config from {path}: {err}")]
    Parse {
        path: Utf8PathBuf,
        #[source]
        err: toml::de::Error,
    },
    #[error("Config {path} must name at least one ledger directory")]
    NoLedgerDirs { path: Utf8PathBuf },
}

impl Config {
    pub fn from_file<P: AsRef<Utf8Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|err| ConfigError::Io { path: path.into(), err })?;
        let config: Config = toml::from_str(&contents)
            .map_err(|err| ConfigError::Parse { path: path.into(), err })?;
        if config.ledger_dirs.is_empty() {
            return Err(ConfigError::NoLedgerDirs { path: path.into() });
        }
        Ok(config)
    }

    /// Returns the path of `filename` within every ledger directory.
    pub fn ledger_paths(&self, filename: &str) -> Vec<Utf8PathBuf> {
        ledger_paths(&self.ledger_dirs, filename)
    }
}

/// Returns the path of `filename` within each of `dirs`.
pub fn ledger_paths(dirs: &[Utf8PathBuf], filename: &str) -> Vec<Utf8PathBuf> {
    dirs.iter().map(|dir| dir.join(filename)).collect()
}

/// Represents the logging configuration for a program
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "mode")]
pub enum ConfigLogging {
    /// Pretty-printed output to stderr, assumed to support terminal escapes.
    StderrTerminal { level: ConfigLoggingLevel },
    /// Bunyan-formatted output to a specified file.
    File {
        level: ConfigLoggingLevel,
        path: Utf8PathBuf,
        if_exists: ConfigLoggingIfExists,
    },
}

/// Log levels, in order of increasing severity
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigLoggingLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Critical,
}

impl From<ConfigLoggingLevel> for slog::Level {
    fn from(level: ConfigLoggingLevel) -> slog::Level {
        match level {
            ConfigLoggingLevel::Trace => slog::Level::Trace,
            ConfigLoggingLevel::Debug => slog::Level::Debug,
            ConfigLoggingLevel::Info => slog::Level::Info,
            ConfigLoggingLevel::Warn => slog::Level::Warning,
            ConfigLoggingLevel::Error => slog::Level::Error,
            ConfigLoggingLevel::Critical => slog::Level::Critical,
        }
    }
}

/// What to do when the log file named in [`ConfigLogging::File`] exists
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigLoggingIfExists {
    /// Fail to create the log
    Fail,
    /// Truncate the existing file
    Truncate,
    /// Append to the existing file
    Append,
}

impl ConfigLogging {
    /// Create the root logger described by this configuration.
    pub fn to_logger<S: AsRef<str>>(&self, log_name: S) -> io::Result<Logger> {
        match self {
            ConfigLogging::StderrTerminal { level } => {
                let decorator = slog_term::TermDecorator::new().stderr().build();
                let drain = slog_term::FullFormat::new(decorator).build().fuse();
                Ok(async_root_logger(log_name.as_ref(), *level, drain))
            }

            ConfigLogging::File { level, path, if_exists } => {
                let mut open_options = OpenOptions::new();
                open_options.write(true);
                match if_exists {
                    ConfigLoggingIfExists::Fail => {
                        open_options.create_new(true);
                    }
                    ConfigLoggingIfExists::Append => {
                        open_options.create(true).append(true);
                    }
                    ConfigLoggingIfExists::Truncate => {
                        open_options.create(true).truncate(true);
                    }
                }

                let file = open_options.open(path)?;
                // slog-bunyan wants a &'static str name; loggers are built
                // once per process.
                let log_name_leaked: &'static str =
                    Box::leak(log_name.as_ref().to_owned().into_boxed_str());
                let drain = slog_bunyan::with_name(log_name_leaked, file)
                    .build()
                    .fuse();
                let log = async_root_logger(log_name.as_ref(), *level, drain);
                info!(log, "opened log file"; "path" => %path);
                Ok(log)
            }
        }
    }
}

fn async_root_logger<D>(
    log_name: &str,
    level: ConfigLoggingLevel,
    drain: D,
) -> Logger
where
    D: Drain<Ok = (), Err = slog::Never> + Send + 'static,
{
    let drain = slog_async::Async::new(drain)
        .overflow_strategy(slog_async::OverflowStrategy::Block)
        .build_no_guard();
    let drain = slog::LevelFilter::new(drain, level.into()).fuse();
    Logger::root(drain, o!("name" => log_name.to_owned()))
}
