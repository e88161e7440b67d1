// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Utilities to help reading/writing json files from/to multiple paths

use camino::{Utf8Path, Utf8PathBuf};
use serde::{de::DeserializeOwned, Serialize};
use slog::{debug, info, warn, Logger};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Cannot serialize JSON to file {path}: {err}")]
    JsonSerialize { path: Utf8PathBuf, err: serde_json::Error },

    #[error("Cannot deserialize JSON from file {path}: {err}")]
    JsonDeserialize { path: Utf8PathBuf, err: serde_json::Error },

    #[error("Failed to perform I/O: {message}: {err}")]
    Io {
        message: String,
        #[source]
        err: std::io::Error,
    },

    #[error("Failed to write the ledger to storage")]
    FailedToWrite { failed_paths: Vec<(Utf8PathBuf, Error)> },
}

impl Error {
    fn io_path(path: &Utf8Path, err: std::io::Error) -> Self {
        Self::Io { message: format!("Error accessing {path}"), err }
    }
}

impl From<Error> for crate::api::external::Error {
    fn from(err: Error) -> Self {
        crate::api::external::Error::InternalError {
            internal_message: err.to_string(),
        }
    }
}

/// Manage the serialization and deserialization of a ledger of information.
///
/// This structure is intended to help with serializing and deserializing
/// configuration information to both M.2s.
#[derive(Debug)]
pub struct Ledger<T> {
    log: Logger,
    ledger: T,
    paths: Vec<Utf8PathBuf>,
}

impl<T: Ledgerable> Ledger<T> {
    /// Creates a ledger with a new initial value.
    pub fn new_with(log: &Logger, paths: Vec<Utf8PathBuf>, default: T) -> Self {
        Self { log: log.clone(), ledger: default, paths }
    }

    /// Reads the ledger from any of the provided `paths`.
    ///
    /// Returns the following, in order:
    /// - The ledger with the highest generation number
    /// - If none exists, returns `None`.
    pub async fn new(log: &Logger, paths: Vec<Utf8PathBuf>) -> Option<Self> {
        // Read the ledgers from storage
        let mut ledgers = vec![];
        for path in paths.iter() {
            match read_from::<T>(log, path).await {
                Ok(ledger) => ledgers.push(ledger),
                Err(err) => {
                    debug!(log, "Failed to read ledger: {err}"; "path" => %path)
                }
            }
        }

        // Return the ledger with the highest generation number.
        let ledger = ledgers.into_iter().reduce(|prior, ledger| {
            if ledger.is_newer_than(&prior) {
                ledger
            } else {
                prior
            }
        });
        ledger.map(|ledger| Self { log: log.clone(), ledger, paths })
    }

    pub fn data(&self) -> &T {
        &self.ledger
    }

    pub fn data_mut(&mut self) -> &mut T {
        &mut self.ledger
    }

    pub fn into_inner(self) -> T {
        self.ledger
    }

    pub fn paths(&self) -> &[Utf8PathBuf] {
        &self.paths
    }

    /// Writes the ledger back to all config directories.
    ///
    /// Succeeds if at least one of the writes succeeds.
    pub async fn commit(&mut self) -> Result<(), Error> {
        let mut failed_paths = vec![];
        let mut one_successful_write = false;
        for path in self.paths.iter() {
            if let Err(e) = self.atomic_write(path).await {
                warn!(
                    self.log,
                    "Failed to write ledger";
                    "path" => %path,
                    "err" => %e,
                );
                failed_paths.push((path.to_path_buf(), e));
            } else {
                one_successful_write = true;
            }
        }

        if !one_successful_write {
            return Err(Error::FailedToWrite { failed_paths });
        }
        info!(self.log, "Committed ledger"; "paths" => ?self.paths);
        Ok(())
    }

    // Atomically serialize and write the ledger to storage.
    //
    // We accomplish this by first writing to a temporary file, then
    // renaming to the target location.
    async fn atomic_write(&self, path: &Utf8Path) -> Result<(), Error> {
        let as_str = serde_json::to_string(&self.ledger).map_err(|err| {
            Error::JsonSerialize { path: path.to_path_buf(), err }
        })?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| Error::io_path(parent, err))?;
        }
        let tmp_path = Utf8PathBuf::from(format!("{path}.tmp"));
        tokio::fs::write(&tmp_path, as_str)
            .await
            .map_err(|err| Error::io_path(&tmp_path, err))?;
        tokio::fs::rename(&tmp_path, path)
            .await
            .map_err(|err| Error::io_path(path, err))?;
        Ok(())
    }
}

/// A value which can be stored in a [`Ledger`].
pub trait Ledgerable: DeserializeOwned + Serialize + Send + Sync {
    /// Returns true if this ledger is newer than another.
    fn is_newer_than(&self, other: &Self) -> bool;
}

async fn read_from<T: Ledgerable>(
    log: &Logger,
    path: &Utf8Path,
) -> Result<T, Error> {
    debug!(log, "Reading ledger from {}", path);
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|err| Error::io_path(path, err))?;
    serde_json::from_str(&contents)
        .map_err(|err| Error::JsonDeserialize { path: path.to_path_buf(), err })
}

#[cfg(test)]
mod test {
    use super::*;
    use camino_tempfile::Utf8TempDir;
    use rss_test_utils::dev::test_setup_log;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, Default, Eq, PartialEq, Debug)]
    struct Data {
        generation: u64,
        contents: String,
    }

    impl Ledgerable for Data {
        fn is_newer_than(&self, other: &Self) -> bool {
            self.generation >= other.generation
        }
    }

    #[tokio::test]
    async fn test_create_default_ledger() {
        let logctx = test_setup_log("create_default_ledger");
        let log = &logctx.log;

        let config_dir = Utf8TempDir::new().unwrap();
        let ledger = Ledger::<Data>::new(
            log,
            vec![config_dir.path().join("ledger.json")],
        )
        .await;
        assert!(ledger.is_none());

        let ledger = Ledger::new_with(
            log,
            vec![config_dir.path().join("ledger.json")],
            Data::default(),
        );
        assert_eq!(ledger.data(), &Data::default());

        logctx.cleanup_successful();
    }

    #[tokio::test]
    async fn test_create_ledger_reads_from_storage() {
        let logctx = test_setup_log("create_ledger_reads_from_storage");
        let log = &logctx.log;

        // Create the ledger within a configuration directory
        let config_dir = Utf8TempDir::new().unwrap();
        let config_path = config_dir.path().join("ledger.json");
        let mut ledger =
            Ledger::new_with(log, vec![config_path.clone()], Data::default());
        ledger.data_mut().contents = "new contents".to_string();
        ledger.commit().await.expect("Failed to write ledger");
        assert!(config_path.exists());
        assert!(!Utf8PathBuf::from(format!("{config_path}.tmp")).exists());

        drop(ledger);

        // Re-create the ledger, observe the new contents.
        let ledger = Ledger::<Data>::new(log, vec![config_path.clone()])
            .await
            .expect("Failed to read ledger");

        assert_eq!(ledger.data().contents, "new contents");
        assert_eq!(ledger.paths(), &[config_path]);

        logctx.cleanup_successful();
    }

    #[tokio::test]
    async fn test_create_ledger_reads_latest_from_storage() {
        let logctx = test_setup_log("create_ledger_reads_latest_from_storage");
        let log = &logctx.log;

        // Create the ledger, initialize contents.
        let config_dirs =
            [Utf8TempDir::new().unwrap(), Utf8TempDir::new().unwrap()];
        let config_paths = config_dirs
            .iter()
            .map(|d| d.path().join("ledger.json"))
            .collect::<Vec<_>>();
        let mut ledger = Ledger::new_with(
            log,
            config_paths.clone(),
            Data { generation: 1, contents: "old".to_string() },
        );
        ledger.commit().await.expect("Failed to write ledger");

        // Write a newer generation to only one of the two paths.
        let mut newer = Ledger::new_with(
            log,
            vec![config_paths[1].clone()],
            Data { generation: 2, contents: "new".to_string() },
        );
        newer.commit().await.expect("Failed to write ledger");

        let ledger = Ledger::<Data>::new(log, config_paths)
            .await
            .expect("Failed to read ledger");
        assert_eq!(
            ledger.data(),
            &Data { generation: 2, contents: "new".to_string() }
        );

        logctx.cleanup_successful();
    }

    #[tokio::test]
    async fn test_commit_succeeds_if_any_path_writable() {
        let logctx = test_setup_log("commit_succeeds_if_any_path_writable");
        let log = &logctx.log;

        let config_dir = Utf8TempDir::new().unwrap();
        // A regular file cannot be used as a directory.
        let blocker = config_dir.path().join("not-a-dir");
        std::fs::write(&blocker, "").unwrap();
        let bad_path = blocker.join("ledger.json");
        let good_path = config_dir.path().join("ledger.json");

        let mut ledger = Ledger::new_with(
            log,
            vec![bad_path.clone(), good_path.clone()],
            Data::default(),
        );
        ledger.commit().await.expect("one path should have been written");
        assert!(good_path.exists());

        let mut ledger =
            Ledger::new_with(log, vec![bad_path], Data::default());
        match ledger.commit().await {
            Err(Error::FailedToWrite { failed_paths }) => {
                assert_eq!(failed_paths.len(), 1);
            }
            other => panic!("expected FailedToWrite, got {other:?}"),
        }

        logctx.cleanup_successful();
    }

    #[tokio::test]
    async fn test_unparseable_ledger_is_skipped() {
        let logctx = test_setup_log("unparseable_ledger_is_skipped");
        let log = &logctx.log;

        let config_dir = Utf8TempDir::new().unwrap();
        let garbage = config_dir.path().join("garbage.json");
        std::fs::write(&garbage, "{ not json").unwrap();
        let good = config_dir.path().join("good.json");
        let mut ledger = Ledger::new_with(
            log,
            vec![good.clone()],
            Data { generation: 7, contents: "ok".to_string() },
        );
        ledger.commit().await.unwrap();

        let ledger = Ledger::<Data>::new(log, vec![garbage, good])
            .await
            .expect("the readable ledger should be used");
        assert_eq!(ledger.data().generation, 7);

        logctx.cleanup_successful();
    }
}
