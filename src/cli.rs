//! The lifecycle manager.
//!
//! The [`Cli`] owns the root command, the signal-aware root context and the cleanup chain. Its
//! life goes like this:
//!
//! * It is created from [`RootCommandOptions`]. The options are validated first and only then the
//!   subscription to termination signals is set up (see [`SignalBridge`]).
//! * Commands are registered.
//! * It is executed, possibly several times (each time with different arguments). Before the
//!   selected command body runs, a fresh context is derived from the root one. It carries a
//!   [`Logger`][crate::logging::Logger] with the level selected by the `-v` flags and whatever the
//!   modifiers add.
//! * It is cleaned up. This first releases the signal subscription, then runs the caller's
//!   cleanup procedures. Cleanup happens only once, further calls do nothing. Dropping the [`Cli`]
//!   cleans up too.

use std::env;
use std::ffi::OsString;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::io::{self, Write};
use std::iter;
use std::process;
use std::ptr;
use std::sync::Arc;

use err_context::prelude::*;
use log::{debug, trace};
use parking_lot::{Mutex, RwLock};
use structopt::clap::{App, AppSettings, Arg, ErrorKind};

use crate::cleanup::CleanupChain;
use crate::command::{Command, DuplicateCommand};
use crate::context::Context;
use crate::error::{self, AnyError, CliError};
use crate::logging;
use crate::options::{Modifier, RootCommandOptions};
use crate::signals::SignalBridge;

const VERBOSE: &str = "verbose";
const VERSION: &str = "version";

type Sink = Arc<dyn Fn() -> Box<dyn Write + Send> + Send + Sync>;

fn stdout_sink() -> Sink {
    Arc::new(|| -> Box<dyn Write + Send> { Box::new(io::stdout()) })
}

fn stderr_sink() -> Sink {
    Arc::new(|| -> Box<dyn Write + Send> { Box::new(io::stderr()) })
}

fn sink<W: Write + Clone + Send + 'static>(w: W) -> Sink {
    let w = Mutex::new(w);
    Arc::new(move || -> Box<dyn Write + Send> { Box::new(w.lock().clone()) })
}

fn verbose_arg() -> Arg<'static, 'static> {
    Arg::with_name(VERBOSE)
        .short("v")
        .long(VERBOSE)
        .multiple(true)
        .help("Increase verbosity (up to -vvv)")
}

fn build_app(root: &Command) -> Result<App<'_, '_>, DuplicateCommand> {
    let app = root
        .to_app_with(&[verbose_arg()])?
        .setting(AppSettings::ColorNever)
        .setting(AppSettings::VersionlessSubcommands)
        .arg(
            Arg::with_name(VERSION)
                .short("V")
                .long(VERSION)
                .help("Prints version information"),
        );
    Ok(app)
}

/// Help of a nested command, with the whole path in the usage line.
fn write_nested_help<W: Write>(
    root: &Command,
    command: &Command,
    args: &[OsString],
    out: &mut W,
) -> Result<(), AnyError> {
    let argv = iter::once(OsString::from(root.name()))
        .chain(args.iter().cloned())
        .chain(iter::once(OsString::from("--help")));
    match build_app(root)?.get_matches_from_safe(argv) {
        Err(e) if e.kind == ErrorKind::HelpDisplayed => writeln!(out, "{}", e.message)?,
        // Trailing arguments swallowed the flag, fall back to the command alone.
        _ => command.write_help(out)?,
    }
    Ok(())
}

/// The command line application.
///
/// # Examples
///
/// ```rust
/// use cliboot::command::Command;
/// use cliboot::{logging, Cli, RootCommandOptions};
///
/// let cli = Cli::new(RootCommandOptions::new("demo", "1.0.0")).unwrap();
/// cli.register_commands(vec![Command::new("ping").run(|ctx, _| {
///     logging::from_context(ctx).info("pong");
///     Ok(())
/// })]);
/// cli.execute_from(&["ping"]).unwrap();
/// cli.cleanup();
/// ```
pub struct Cli {
    root: RwLock<Command>,
    version: String,
    modifiers: Vec<Modifier>,
    context: Context,
    bridge: Arc<SignalBridge>,
    cleanup: CleanupChain,
    out: Mutex<Sink>,
    err: Mutex<Sink>,
}

impl Cli {
    /// Validates the options and sets everything up.
    ///
    /// If the options are not valid, nothing is allocated and the validation error is returned
    /// (as [`CliError::MissingField`]).
    pub fn new(options: RootCommandOptions) -> Result<Self, CliError> {
        options.validate()?;
        let RootCommandOptions {
            name,
            version,
            description,
            modifiers,
            cleanup_funcs,
        } = options;

        debug!("Setting up {} {}", name, version);
        let (context, bridge) =
            SignalBridge::install(&Context::background()).map_err(CliError::Signals)?;
        let bridge = Arc::new(bridge);
        let bridge_teardown = Arc::clone(&bridge);
        let cleanup = CleanupChain::builder()
            .internal(move || bridge_teardown.shutdown())
            .callers(cleanup_funcs)
            .build();

        let mut root = Command::new(name);
        if !description.is_empty() {
            root = root.about(description);
        }

        Ok(Cli {
            root: RwLock::new(root),
            version,
            modifiers,
            context,
            bridge,
            cleanup,
            out: Mutex::new(stdout_sink()),
            err: Mutex::new(stderr_sink()),
        })
    }

    pub fn name(&self) -> String {
        self.root.read().name().to_owned()
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn description(&self) -> Option<String> {
        self.root.read().get_about().map(ToOwned::to_owned)
    }

    /// Names of the registered (top-level) commands, in registration order.
    pub fn commands(&self) -> Vec<String> {
        self.root
            .read()
            .subcommands()
            .iter()
            .map(|c| c.name().to_owned())
            .collect()
    }

    /// The root context.
    ///
    /// It is cancelled on `SIGINT`/`SIGTERM` and during cleanup. Every context handed to a
    /// command body is derived from it.
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Is the signal bridge still installed?
    pub fn is_watching_signals(&self) -> bool {
        self.bridge.is_running()
    }

    /// Sets where help and version texts are written (stdout by default).
    pub fn set_output<W: Write + Clone + Send + 'static>(&self, out: W) {
        *self.out.lock() = sink(out);
    }

    /// Sets where the logs are written (stderr by default).
    pub fn set_error_output<W: Write + Clone + Send + 'static>(&self, err: W) {
        *self.err.lock() = sink(err);
    }

    /// Appends commands under the root one.
    ///
    /// Name conflicts are not checked here, they are reported when executing. This can be called
    /// from within a running command body too, the new commands show up in the next execution.
    pub fn register_commands<I: IntoIterator<Item = Command>>(&self, commands: I) {
        self.root.write().push_subcommands(commands);
    }

    /// Parses the process arguments and runs the selected command.
    pub fn execute(&self) -> Result<(), AnyError> {
        self.execute_from(env::args_os().skip(1))
    }

    /// Parses the given arguments (without the program name) and runs the selected command.
    ///
    /// Errors from parsing and from the command body are returned as they are. Asking for help
    /// or version is not an error.
    pub fn execute_from<I, T>(&self, args: I) -> Result<(), AnyError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        if self.cleanup.has_run() {
            return Err(CliError::TornDown.into());
        }
        // Work on a snapshot, so the bodies are free to register more commands.
        let root = self.root.read().clone();
        let args = args.into_iter().map(Into::into).collect::<Vec<OsString>>();
        let mut out = (self.out.lock())();

        let mut app = build_app(&root)?;
        let argv = iter::once(OsString::from(root.name())).chain(args.iter().cloned());
        let matches = match app.get_matches_from_safe_borrow(argv) {
            Ok(matches) => matches,
            Err(e) if e.kind == ErrorKind::HelpDisplayed => {
                writeln!(out, "{}", e.message)?;
                out.flush()?;
                return Ok(());
            }
            Err(e) if e.kind == ErrorKind::VersionDisplayed => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        if matches.is_present(VERSION) {
            writeln!(out, "{} {}", root.name(), self.version)?;
            out.flush()?;
            return Ok(());
        }

        // Each level has its own -v flag, the counts add up.
        let mut command = &root;
        let mut leaf = &matches;
        let mut verbosity = matches.occurrences_of(VERBOSE);
        while let (name, Some(sub)) = leaf.subcommand() {
            command = match command.find(name) {
                Some(cmd) => cmd,
                None => break,
            };
            leaf = sub;
            verbosity += sub.occurrences_of(VERBOSE);
        }

        if !command.has_body() {
            trace!("Command {} has no body, printing help", command.name());
            if ptr::eq(command, &root) {
                app.write_help(&mut out)?;
                writeln!(out)?;
            } else {
                write_nested_help(&root, command, &args, &mut out)?;
            }
            out.flush()?;
            return Ok(());
        }

        let ctx = self.prepare(verbosity);
        debug!("Running command {}", command.name());
        let result = command.invoke(&ctx, leaf, &mut out);
        out.flush()?;
        result
    }

    /// The pre-run hook: derives the execution context for one command run.
    fn prepare(&self, verbosity: u64) -> Context {
        let level = logging::level_from_verbosity(verbosity);
        trace!("Verbosity {} selects level {}", verbosity, level);
        let logger = logging::new((self.err.lock())(), level);
        let ctx = logging::add_to_context(&self.context, logger);
        self.modifiers
            .iter()
            .fold(ctx, |ctx, modifier| modifier(ctx))
    }

    /// Runs the cleanup chain.
    ///
    /// The signal subscription is released first (and the watching thread is waited for), then
    /// the caller's procedures run in their order. Only the first call does anything.
    pub fn cleanup(&self) {
        self.cleanup.run();
    }

    /// Was the application cleaned up already?
    pub fn is_torn_down(&self) -> bool {
        self.cleanup.has_run()
    }

    /// Executes with the process arguments and terminates the process.
    ///
    /// This is the top-level helper for `main`. Errors are logged and written to the error
    /// output, the cleanup runs and the process exits with 0 on success and 1 on failure.
    pub fn run_term(self) -> ! {
        let result = error::log_errors("top-level", || self.execute());
        let code = match result {
            Ok(()) => 0,
            Err(e) => {
                let mut err = (self.err.lock())();
                let _ = writeln!(err, "{}: {}", self.name(), e.display(": "));
                1
            }
        };
        drop(self);
        process::exit(code);
    }
}

impl Drop for Cli {
    fn drop(&mut self) {
        self.cleanup();
    }
}

impl Debug for Cli {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        fmt.debug_struct("Cli")
            .field("root", &*self.root.read())
            .field("version", &self.version)
            .field("modifiers", &self.modifiers.len())
            .field("context", &self.context)
            .field("cleanup", &self.cleanup)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use log::LevelFilter;

    use super::*;
    use crate::utils::SharedBuffer;

    fn options() -> RootCommandOptions {
        RootCommandOptions::new("testcli", "1.0.0").description("A test CLI application")
    }

    fn captured(cli: &Cli) -> SharedBuffer {
        let buffer = SharedBuffer::new();
        cli.set_output(buffer.clone());
        cli.set_error_output(buffer.clone());
        buffer
    }

    #[test]
    fn new_sets_root() {
        let cli = Cli::new(options()).unwrap();
        assert_eq!("testcli", cli.name());
        assert_eq!("1.0.0", cli.version());
        assert_eq!(Some("A test CLI application".to_owned()), cli.description());
        assert!(cli.commands().is_empty());
        assert!(cli.is_watching_signals());
    }

    #[test]
    fn new_invalid() {
        for (name, version, field) in &[("", "1.0.0", "name"), ("testcli", "", "version")] {
            match Cli::new(RootCommandOptions::new(*name, *version)) {
                Err(CliError::MissingField(e)) => assert_eq!(*field, e.field()),
                other => panic!("Unexpected result {:?}", other),
            }
        }
    }

    #[test]
    fn register() {
        let cli = Cli::new(options()).unwrap();
        cli.register_commands(vec![Command::new("command1"), Command::new("command2")]);
        assert_eq!(vec!["command1", "command2"], cli.commands());
    }

    #[test]
    fn verbosity_levels() {
        let cases: &[(&[&str], LevelFilter)] = &[
            (&["test"], LevelFilter::Warn),
            (&["-v", "test"], LevelFilter::Info),
            (&["-vv", "test"], LevelFilter::Debug),
            (&["-vvv", "test"], LevelFilter::Trace),
            (&["-vvvvv", "test"], LevelFilter::Trace),
            (&["test", "-vv"], LevelFilter::Debug),
            (&["-v", "test", "-v"], LevelFilter::Debug),
            (&["--verbose", "test", "-vv"], LevelFilter::Trace),
        ];
        for (args, expected) in cases {
            let cli = Cli::new(options()).unwrap();
            let _buffer = captured(&cli);
            let level = Arc::new(Mutex::new(None));
            let level_body = Arc::clone(&level);
            cli.register_commands(vec![Command::new("test").run(move |ctx, _| {
                *level_body.lock() = Some(logging::from_context(ctx).level());
                Ok(())
            })]);
            cli.execute_from(*args).unwrap();
            assert_eq!(Some(*expected), *level.lock(), "Arguments {:?}", args);
            cli.cleanup();
        }
    }

    #[test]
    fn modifiers_applied_in_order() {
        struct Key1(&'static str);
        struct Key2(&'static str);
        struct Order(Vec<&'static str>);

        let options = options()
            .modifier(|ctx| ctx.with_value(Key1("value1")).with_value(Order(vec!["m1"])))
            .modifier(|ctx| {
                let mut order = ctx.get::<Order>().map(|o| o.0.clone()).unwrap_or_default();
                order.push("m2");
                ctx.with_value(Key2("value2")).with_value(Order(order))
            });
        let cli = Cli::new(options).unwrap();
        let _buffer = captured(&cli);
        let seen = Arc::new(AtomicBool::new(false));
        let seen_body = Arc::clone(&seen);
        cli.register_commands(vec![Command::new("test").run(move |ctx, _| {
            assert_eq!("value1", ctx.get::<Key1>().unwrap().0);
            assert_eq!("value2", ctx.get::<Key2>().unwrap().0);
            assert_eq!(vec!["m1", "m2"], ctx.get::<Order>().unwrap().0);
            assert!(logging::try_from_context(ctx).is_some());
            seen_body.store(true, Ordering::SeqCst);
            Ok(())
        })]);
        cli.execute_from(&["test"]).unwrap();
        assert!(seen.load(Ordering::SeqCst));
    }

    /// The hook runs on every execution, but the signal bridge stays the same one.
    #[test]
    fn repeated_execution() {
        let runs = Arc::new(AtomicUsize::new(0));
        let runs_mod = Arc::clone(&runs);
        let options = options().modifier(move |ctx| {
            runs_mod.fetch_add(1, Ordering::SeqCst);
            ctx
        });
        let cli = Cli::new(options).unwrap();
        let _buffer = captured(&cli);
        cli.register_commands(vec![Command::new("test").run(|ctx, _| {
            assert!(!ctx.is_cancelled());
            Ok(())
        })]);
        for _ in 0..3 {
            cli.execute_from(&["test"]).unwrap();
        }
        assert_eq!(3, runs.load(Ordering::SeqCst));
        assert!(cli.is_watching_signals());
    }

    #[test]
    fn help_and_version() {
        let cli = Cli::new(options()).unwrap();
        let buffer = captured(&cli);
        cli.register_commands(vec![Command::new("sub").about("Does sub things")]);

        cli.execute_from(&["--help"]).unwrap();
        let help = buffer.take();
        let help = String::from_utf8_lossy(&help);
        assert!(help.contains("A test CLI application"));
        assert!(help.contains("sub"));
        assert!(help.contains("--verbose"));

        cli.execute_from(&["--version"]).unwrap();
        assert_eq!("testcli 1.0.0\n", buffer.contents());
    }

    /// Root with no command selected prints help, just like a body-less group.
    #[test]
    fn bare_root_prints_help() {
        let cli = Cli::new(options()).unwrap();
        let buffer = captured(&cli);
        cli.register_commands(vec![
            Command::new("group").about("Groups things").subcommand(Command::new("inner"))
        ]);
        cli.execute_from(Vec::<String>::new()).unwrap();
        assert!(!buffer.take().is_empty());

        cli.execute_from(&["group"]).unwrap();
        let help = buffer.contents();
        assert!(help.contains("Groups things"));
        assert!(help.contains("inner"));
        assert!(help.contains("testcli group"), "{}", help);
    }

    #[test]
    fn default_outputs() {
        let cli = Cli::new(options()).unwrap();
        cli.execute_from(&["--version"]).unwrap();
        cli.execute_from(&["--help"]).unwrap();
    }

    /// The command tree isn't locked while a body runs.
    #[test]
    fn register_from_body() {
        let cli = Arc::new(Cli::new(options()).unwrap());
        let _buffer = captured(&cli);
        let cli_body = Arc::clone(&cli);
        cli.register_commands(vec![Command::new("grow").run(move |_, _| {
            cli_body.register_commands(vec![Command::new("late")]);
            Ok(())
        })]);
        cli.execute_from(&["grow"]).unwrap();
        assert_eq!(vec!["grow", "late"], cli.commands());
        cli.execute_from(&["late"]).unwrap();
        // The body holds the Cli, so it is not dropped on its own
        cli.cleanup();
    }

    #[test]
    fn errors_pass_through() {
        #[derive(Debug)]
        struct Boom;
        impl std::fmt::Display for Boom {
            fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
                write!(fmt, "Boom")
            }
        }
        impl std::error::Error for Boom {}

        let cli = Cli::new(options()).unwrap();
        let _buffer = captured(&cli);
        cli.register_commands(vec![Command::new("boom").run(|_, _| Err(Boom.into()))]);
        let err = cli.execute_from(&["boom"]).unwrap_err();
        assert!(err.downcast_ref::<Boom>().is_some());

        let err = cli.execute_from(&["no-such-command"]).unwrap_err();
        assert!(err.downcast_ref::<structopt::clap::Error>().is_some());
    }

    #[test]
    fn duplicate_reported_on_execute() {
        let cli = Cli::new(options()).unwrap();
        cli.register_commands(vec![Command::new("dup"), Command::new("dup")]);
        assert_eq!(2, cli.commands().len());
        let err = cli.execute_from(&["dup"]).unwrap_err();
        assert!(err
            .downcast_ref::<crate::command::DuplicateCommand>()
            .is_some());
    }

    #[test]
    fn cleanup_order_and_idempotence() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let (order1, order2) = (Arc::clone(&order), Arc::clone(&order));
        let cli = Cli::new(
            options()
                .cleanup(move || order1.lock().push("user1"))
                .cleanup(move || order2.lock().push("user2")),
        )
        .unwrap();

        cli.cleanup();
        cli.cleanup();
        assert_eq!(vec!["user1", "user2"], *order.lock());
        assert!(!cli.is_watching_signals());
        assert!(cli.context().is_cancelled());
        assert!(cli.is_torn_down());

        let err = cli.execute_from(&["--version"]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CliError>(),
            Some(CliError::TornDown)
        ));
    }

    /// The caller's procedures run only after the signal bridge is gone.
    #[test]
    fn caller_cleanup_sees_bridge_down() {
        let observed = Arc::new(Mutex::new(None));
        let observed_cleanup = Arc::clone(&observed);
        let slot = Arc::new(Mutex::new(None::<Context>));
        let slot_cleanup = Arc::clone(&slot);
        let cli = Cli::new(options().cleanup(move || {
            let ctx = slot_cleanup.lock().take().unwrap();
            *observed_cleanup.lock() = Some(ctx.is_cancelled());
        }))
        .unwrap();
        *slot.lock() = Some(cli.context().clone());
        drop(cli);
        assert_eq!(Some(true), *observed.lock());
    }
}
