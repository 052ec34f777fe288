//! Commands and subcommands.
//!
//! The parsing, help rendering and routing are done by [`clap`][structopt::clap]. A [`Command`]
//! is the description of one node of the command tree together with the body to run when that
//! node is selected. The clap definition is put together from the tree each time the application
//! executes.
//!
//! # Examples
//!
//! ```rust
//! use cliboot::command::Command;
//! use cliboot::logging;
//! use structopt::clap::Arg;
//!
//! let greet = Command::new("greet")
//!     .about("Greets someone")
//!     .arg(Arg::with_name("who").required(true))
//!     .run(|ctx, matches| {
//!         let who = matches.value_of("who").unwrap_or_default();
//!         logging::from_context(ctx).info(format_args!("Greeting {}", who));
//!         println!("Hello {}", who);
//!         Ok(())
//!     });
//! assert_eq!("greet", greet.name());
//! ```

use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter, Result as FmtResult};
use std::io::Write;
use std::sync::Arc;

use structopt::clap::{App, Arg, ArgMatches};
use structopt::StructOpt;

use crate::context::Context;
use crate::error::AnyError;

type Body = Arc<dyn Fn(&Context, &ArgMatches<'_>) -> Result<(), AnyError>>;
type Template = Arc<dyn Fn() -> App<'static, 'static>>;

/// Two sibling commands share the same name.
///
/// This is detected when the application executes, not when the commands are registered.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct DuplicateCommand(pub String);

impl Display for DuplicateCommand {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        write!(fmt, "Command {} is registered more than once", self.0)
    }
}

impl Error for DuplicateCommand {}

/// One node of the command tree.
///
/// A command without a body only groups its subcommands. When it is selected directly, its help
/// is printed.
///
/// Clones share the body and the structopt template.
#[derive(Clone)]
pub struct Command {
    name: String,
    about: Option<String>,
    aliases: Vec<String>,
    args: Vec<Arg<'static, 'static>>,
    template: Option<Template>,
    subcommands: Vec<Command>,
    body: Option<Body>,
}

impl Command {
    /// Creates a command with no arguments and no body.
    pub fn new<N: Into<String>>(name: N) -> Self {
        Command {
            name: name.into(),
            about: None,
            aliases: Vec::new(),
            args: Vec::new(),
            template: None,
            subcommands: Vec::new(),
            body: None,
        }
    }

    /// Creates a command from a [`StructOpt`] definition.
    ///
    /// The name, arguments and documentation are taken from the definition. The body gets the
    /// parsed structure.
    ///
    /// ```rust
    /// use cliboot::command::Command;
    /// use structopt::StructOpt;
    ///
    /// /// Counts to a number.
    /// #[derive(StructOpt)]
    /// #[structopt(name = "count")]
    /// struct Count {
    ///     /// Where to stop.
    ///     #[structopt(default_value = "10")]
    ///     to: u32,
    /// }
    ///
    /// let count = Command::from_structopt(|_ctx, opts: Count| {
    ///     (1..=opts.to).for_each(|i| println!("{}", i));
    ///     Ok(())
    /// });
    /// assert_eq!("count", count.name());
    /// ```
    pub fn from_structopt<T, F>(body: F) -> Self
    where
        T: StructOpt + 'static,
        F: Fn(&Context, T) -> Result<(), AnyError> + 'static,
    {
        let name = T::clap().get_name().to_owned();
        let mut cmd = Command::new(name);
        cmd.template = Some(Arc::new(|| T::clap()));
        cmd.body = Some(Arc::new(move |ctx: &Context, matches: &ArgMatches<'_>| {
            body(ctx, T::from_clap(matches))
        }));
        cmd
    }

    /// Sets the one-line description shown in help.
    pub fn about<A: Into<String>>(mut self, about: A) -> Self {
        self.about = Some(about.into());
        self
    }

    /// Adds an alternative name.
    pub fn alias<A: Into<String>>(mut self, alias: A) -> Self {
        self.aliases.push(alias.into());
        self
    }

    /// Adds an argument.
    pub fn arg(mut self, arg: Arg<'static, 'static>) -> Self {
        self.args.push(arg);
        self
    }

    /// Adds a nested command.
    pub fn subcommand(mut self, cmd: Command) -> Self {
        self.subcommands.push(cmd);
        self
    }

    /// Sets (replaces) the body.
    pub fn run<F>(mut self, body: F) -> Self
    where
        F: Fn(&Context, &ArgMatches<'_>) -> Result<(), AnyError> + 'static,
    {
        self.body = Some(Arc::new(body));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get_about(&self) -> Option<&str> {
        self.about.as_deref()
    }

    pub fn subcommands(&self) -> &[Command] {
        &self.subcommands
    }

    pub(crate) fn push_subcommands<I: IntoIterator<Item = Command>>(&mut self, commands: I) {
        self.subcommands.extend(commands);
    }

    pub(crate) fn find(&self, name: &str) -> Option<&Command> {
        self.subcommands.iter().find(|c| c.name == name)
    }

    /// Runs the body, or prints help if there's none.
    pub(crate) fn invoke<W: Write>(
        &self,
        ctx: &Context,
        matches: &ArgMatches<'_>,
        out: &mut W,
    ) -> Result<(), AnyError> {
        match &self.body {
            Some(body) => body(ctx, matches),
            None => self.write_help(out),
        }
    }

    /// Writes the help of this command alone (without the parents in the usage line).
    pub(crate) fn write_help<W: Write>(&self, out: &mut W) -> Result<(), AnyError> {
        self.to_app()?.write_help(out)?;
        writeln!(out)?;
        Ok(())
    }

    pub(crate) fn has_body(&self) -> bool {
        self.body.is_some()
    }

    /// Builds the clap definition of this command and everything below it.
    pub(crate) fn to_app(&self) -> Result<App<'_, '_>, DuplicateCommand> {
        self.to_app_with(&[])
    }

    /// Like [`to_app`][Command::to_app], but adds the `common` arguments on every level.
    pub(crate) fn to_app_with(
        &self,
        common: &[Arg<'static, 'static>],
    ) -> Result<App<'_, '_>, DuplicateCommand> {
        let mut app: App<'_, '_> = match &self.template {
            Some(template) => template().name(self.name.as_str()),
            None => App::new(self.name.as_str()),
        };
        if let Some(about) = &self.about {
            app = app.about(about.as_str());
        }
        for alias in &self.aliases {
            app = app.alias(alias.as_str());
        }
        for arg in self.args.iter().chain(common) {
            let arg: Arg<'_, '_> = arg.clone();
            app = app.arg(arg);
        }
        let mut seen = HashSet::new();
        for sub in &self.subcommands {
            if !seen.insert(sub.name.as_str()) {
                return Err(DuplicateCommand(sub.name.clone()));
            }
            app = app.subcommand(sub.to_app_with(common)?);
        }
        Ok(app)
    }
}

impl Debug for Command {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        fmt.debug_struct("Command")
            .field("name", &self.name)
            .field("about", &self.about)
            .field("subcommands", &self.subcommands)
            .field("has_body", &self.has_body())
            .finish()
    }
}
