// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Facilities used by the command-line tools

use std::env::current_exe;
use std::process::exit;

/// Exit code for usage errors
pub const EXIT_USAGE: i32 = 2;
/// Exit code for all other failures
pub const EXIT_FAILURE: i32 = 1;

/// represents a fatal error in a command-line program
#[derive(Debug)]
pub enum CmdError {
    /// incorrect command-line arguments
    Usage(String),
    /// all other errors
    Failure(anyhow::Error),
}

impl CmdError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CmdError::Usage(_) => EXIT_USAGE,
            CmdError::Failure(_) => EXIT_FAILURE,
        }
    }
}

impl From<anyhow::Error> for CmdError {
    fn from(err: anyhow::Error) -> Self {
        CmdError::Failure(err)
    }
}

/// Exits the current process on a fatal error.
pub fn fatal(cmd_error: CmdError) -> ! {
    let arg0_result = current_exe().ok();
    let arg0 = arg0_result
        .as_deref()
        .and_then(|pathbuf| pathbuf.file_stem())
        .and_then(|file_name| file_name.to_str())
        .unwrap_or("command");
    let exit_code = cmd_error.exit_code();
    let message = match cmd_error {
        CmdError::Usage(m) => m,
        CmdError::Failure(e) => format!("{e:#}"),
    };
    eprintln!("{}: {}", arg0, message);
    exit(exit_code);
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(CmdError::Usage("bad flag".to_string()).exit_code(), 2);
        let failure = CmdError::from(anyhow::anyhow!("disk on fire"));
        assert_eq!(failure.exit_code(), 1);
    }
}
