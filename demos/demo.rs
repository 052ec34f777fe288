//! A small application showing the lifecycle.
//!
//! Try it out:
//!
//! * `demo --help` and `demo --version`.
//! * `demo -vv ping` to see more logging.
//! * `demo greet --config greeting.yaml` with a file containing `message: Hi`.
//! * `demo wait` and then press Ctrl+C. The command notices the cancellation, finishes and the
//!   cleanup runs.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use cliboot::fileutils::{self, DirFs};
use cliboot::prelude::*;
use cliboot::{load, logging};
use serde::Deserialize;
use structopt::StructOpt;

#[derive(Debug, Deserialize)]
struct Greeting {
    message: String,
}

/// Greets with a message from a configuration file.
#[derive(StructOpt)]
#[structopt(name = "greet")]
struct Greet {
    /// The configuration file (json, yaml or toml), relative to the current directory.
    #[structopt(short, long, parse(from_os_str))]
    config: PathBuf,
}

fn greet(ctx: &Context, opts: Greet) -> Result<(), AnyError> {
    let log = logging::from_context(ctx);
    log.debug(format_args!("Loading {}", opts.config.display()));
    let fs = fileutils::root_dir_from_context(ctx);
    let greeting: Greeting = load::from_path(&*fs, &opts.config)?;
    println!("{}", greeting.message);
    Ok(())
}

fn wait(ctx: &Context) -> Result<(), AnyError> {
    let log = logging::from_context(ctx);
    let mut ticks = 0;
    while !ctx.wait_timeout(Duration::from_secs(1)) {
        ticks += 1;
        log.info(format_args!("Still waiting ({}s)", ticks));
    }
    log.warn(format_args!("Interrupted after {}s", ticks));
    Ok(())
}

fn main() {
    let options = RootCommandOptions::new("demo", env!("CARGO_PKG_VERSION"))
        .description("Demonstrates the application lifecycle")
        .modifier(|ctx| fileutils::apply_root_dir(&ctx, Arc::new(DirFs::new("."))))
        .modifier(|ctx| {
            // Route the `log` macros (used by libraries) to the same place as the command logs.
            if let Some(logger) = logging::try_from_context(&ctx) {
                logger.install();
            }
            ctx
        })
        .cleanup(|| log::info!("Cleaned up"));
    let cli = match Cli::new(options) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(2);
        }
    };

    cli.register_commands(vec![
        Command::new("ping").about("Answers pong").run(|ctx, _| {
            logging::from_context(ctx).info("Pinged");
            println!("pong");
            Ok(())
        }),
        Command::from_structopt(greet),
        Command::new("wait")
            .about("Waits until interrupted")
            .run(|ctx, _| wait(ctx)),
    ]);
    cli.run_term();
}
