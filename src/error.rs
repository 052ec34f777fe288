//! Error handling utilities.
//!
//! Errors coming out of command bodies (and out of argument parsing) are passed to the caller of
//! [`Cli::execute`][crate::Cli::execute] as they are, boxed into [`AnyError`]. The library's own
//! failures have concrete types ([`CliError`], [`MissingField`][crate::MissingField],
//! [`DuplicateCommand`][crate::command::DuplicateCommand]).

use std::error::Error;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::io::Error as IoError;

use err_context::prelude::*;
use log::{log, Level};

use crate::options::MissingField;

/// Whatever a command body (or the argument parser) fails with.
pub type AnyError = Box<dyn Error + Send + Sync>;

/// Failures of the lifecycle manager itself.
#[derive(Debug)]
#[non_exhaustive]
pub enum CliError {
    /// The options didn't pass validation.
    MissingField(MissingField),
    /// Subscribing to the termination signals failed.
    Signals(IoError),
    /// The application was already cleaned up.
    TornDown,
}

impl Display for CliError {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        match self {
            CliError::MissingField(e) => write!(fmt, "{}", e),
            CliError::Signals(_) => write!(fmt, "Failed to subscribe to termination signals"),
            CliError::TornDown => write!(fmt, "The application was already cleaned up"),
        }
    }
}

impl Error for CliError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CliError::MissingField(e) => Some(e),
            CliError::Signals(e) => Some(e),
            CliError::TornDown => None,
        }
    }
}

impl From<MissingField> for CliError {
    fn from(e: MissingField) -> Self {
        CliError::MissingField(e)
    }
}

/// Layout of an error with its causes in the log.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[non_exhaustive]
pub enum ErrorLogFormat {
    /// The error on one line, each of its causes on a `caused by:` line of its own.
    MultiLine,

    /// Everything on one line, separated by `; `.
    SingleLine,
}

/// Logs the error together with the chain of its causes.
pub fn log_error(level: Level, target: &str, e: &AnyError, format: ErrorLogFormat) {
    match format {
        ErrorLogFormat::MultiLine => {
            let mut chain = e.chain();
            if let Some(top) = chain.next() {
                log!(target: target, level, "{}", top);
            }
            for cause in chain {
                log!(target: target, level, "caused by: {}", cause);
            }
        }
        ErrorLogFormat::SingleLine => log!(target: target, level, "{}", e.display("; ")),
    }
}

/// Runs `f`, logging its error (if any) on the error level in the given target.
///
/// The result is handed back untouched.
pub fn log_errors<R, F>(target: &str, f: F) -> Result<R, AnyError>
where
    F: FnOnce() -> Result<R, AnyError>,
{
    f().map_err(|e| {
        log_error(Level::Error, target, &e, ErrorLogFormat::MultiLine);
        e
    })
}
