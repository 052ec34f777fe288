#![doc(test(attr(deny(warnings))))]
#![allow(clippy::type_complexity)]
#![forbid(unsafe_code)]

//! A helper to bootstrap well-behaved command line applications.
//!
//! Every command line tool needs the same boring plumbing around its actual functionality. It
//! parses the arguments and dispatches to the right subcommand. It sets up logging with the
//! verbosity the user asked for. It reacts to `SIGINT` and `SIGTERM` by telling the running code
//! to stop, and it releases its resources before the process exits. This crate glues that
//! together, so the application itself only provides the commands.
//!
//! # What the crate does and how
//!
//! The crate doesn't bring novel functionality. It takes other crates doing something useful and
//! composes them:
//!
//! * The arguments are parsed by [`clap`][structopt::clap]. The commands may be described either
//!   directly or by a [`StructOpt`][structopt::StructOpt] structure.
//! * Every command gets a [`Context`]. It carries values (the logger, a filesystem handle,
//!   anything the modifiers put in) and a cancellation signal.
//! * The termination signals are watched with [`signal-hook`][signal_hook] in a background thread
//!   and translated into cancelling the context. Long-running commands are expected to check
//!   [`Context::is_cancelled`] (or block on [`Context::wait`]) and wind down.
//! * The logs are formatted by [`fern`] and written to the error output, the level is selected
//!   by the number of `-v` flags.
//! * Structured data (configuration files, for example) can be decoded with the [`load`] module.
//!
//! The central piece is the [`Cli`] object. It is created from [`RootCommandOptions`], then the
//! commands are registered, it is executed and finally cleaned up.
//!
//! # Features
//!
//! The data formats for the [`load`] module can be turned off:
//!
//! * `json`
//! * `yaml`
//! * `toml-format`
//!
//! # Examples
//!
//! ```rust
//! use std::time::Duration;
//!
//! use cliboot::prelude::*;
//! use cliboot::logging;
//!
//! struct Greeting(&'static str);
//!
//! let options = RootCommandOptions::new("demo", "1.0.0")
//!     .description("Demonstrates the application lifecycle")
//!     .modifier(|ctx| ctx.with_value(Greeting("pong")))
//!     .cleanup(|| println!("Bye"));
//! let cli = Cli::new(options).unwrap();
//! cli.register_commands(vec![Command::new("ping")
//!     .about("Answers")
//!     .run(|ctx, _| {
//!         let greeting = ctx.get::<Greeting>().map(|g| g.0).unwrap_or("?");
//!         logging::from_context(ctx).warn(greeting);
//!         // Work until asked to stop, or until done.
//!         if ctx.wait_timeout(Duration::from_millis(10)) {
//!             logging::from_context(ctx).info("Interrupted");
//!         }
//!         Ok(())
//!     })]);
//! cli.execute_from(&["-v", "ping"]).unwrap();
//! cli.cleanup();
//! ```
//!
//! A real `main` would end with [`Cli::run_term`], which executes with the process arguments,
//! reports the errors, cleans up and exits with the right code.

pub mod cleanup;
mod cli;
pub mod command;
pub mod context;
pub mod error;
pub mod fileutils;
pub mod load;
pub mod logging;
mod options;
pub mod signals;
pub mod utils;

pub use crate::cli::Cli;
pub use crate::command::Command;
pub use crate::context::{CancelHandle, Context};
pub use crate::error::{AnyError, CliError};
pub use crate::options::{CleanupFn, MissingField, Modifier, RootCommandOptions};

pub mod prelude {
    pub use super::{AnyError, Cli, Command, Context, RootCommandOptions};
}
