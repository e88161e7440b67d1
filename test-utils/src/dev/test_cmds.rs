// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Facilities for testing command-line programs

use std::path::PathBuf;
use subprocess::Exec;
use subprocess::ExitStatus;
use subprocess::Redirection;

/// EXIT_SUCCESS is the conventional exit code for a successful program
pub const EXIT_SUCCESS: u32 = 0;
/// EXIT_FAILURE is the exit code for a program that failed after parsing its
/// arguments
pub const EXIT_FAILURE: u32 = 1;
/// EXIT_USAGE is the exit code for a program that was invoked incorrectly
pub const EXIT_USAGE: u32 = 2;

/// Returns the path to the executable built by Cargo for `cmd_name`
///
/// `cmd_name` is expected to be the value of `env!("CARGO_BIN_EXE_<name>")`,
/// which Cargo sets for integration tests.
pub fn path_to_executable(cmd_name: &str) -> PathBuf {
    PathBuf::from(cmd_name)
}

/// Runs the command described by `exec` to completion, returning its exit
/// status along with everything it wrote to stdout and stderr
pub fn run_command(exec: Exec) -> (ExitStatus, String, String) {
    let cmdline = exec.to_cmdline_lossy();
    let capture = exec
        .stdout(Redirection::Pipe)
        .stderr(Redirection::Pipe)
        .capture()
        .unwrap_or_else(|err| panic!("failed to run {cmdline}: {err}"));
    (capture.exit_status, capture.stdout_str(), capture.stderr_str())
}

/// Asserts that the command exited with `code`, printing stderr otherwise
pub fn assert_exit_code(exit_status: ExitStatus, code: u32, stderr_text: &str) {
    if let ExitStatus::Exited(exit_code) = exit_status {
        assert_eq!(exit_code, code, "stderr:\n{}", stderr_text);
    } else {
        panic!(
            "expected normal process exit with code {}, got {:?}\n\n\
             process stderr:{}",
            code, exit_status, stderr_text
        );
    }
}
