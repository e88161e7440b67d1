// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Facilities intended for development tools and the test suite.  These should
//! not be used in production code.

pub mod test_cmds;

use slog::o;
use slog::Drain;
use slog::Logger;

/// A logger for a single test, plus enough bookkeeping to report when the test
/// finished
pub struct LogContext {
    /// the logger for this test
    pub log: Logger,
    test_name: String,
}

impl LogContext {
    fn new(test_name: &str) -> LogContext {
        let decorator =
            slog_term::PlainSyncDecorator::new(slog_term::TestStdoutWriter);
        let drain = slog_term::FullFormat::new(decorator).build().fuse();
        let log = Logger::root(drain, o!("test_name" => test_name.to_owned()));
        LogContext { log, test_name: test_name.to_owned() }
    }

    /// Mark the test as having completed successfully.
    ///
    /// Tests that fail never get here, so the absence of this message in a
    /// test's output is a clue as to where things went wrong.
    pub fn cleanup_successful(self) {
        slog::info!(self.log, "test complete"; "test" => &self.test_name);
    }
}

/// Set up a [`LogContext`] appropriate for a test named `test_name`
///
/// This function is currently only used by unit tests.  (We want the dead code
/// warning if it's removed from unit tests, but not during a normal build.)
pub fn test_setup_log(test_name: &str) -> LogContext {
    LogContext::new(test_name)
}
