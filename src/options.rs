//! Description of the root command.
//!
//! The [`RootCommandOptions`] is the only input of [`Cli::new`][crate::Cli::new]. It is consumed
//! by the constructor and nothing keeps referring to it afterwards.

use std::error::Error;
use std::fmt::{Debug, Display, Formatter, Result as FmtResult};

use crate::context::Context;

/// A function deriving a new execution context from an existing one.
///
/// Modifiers are expected to only *add* values. They run in registration order, once per
/// execution.
pub type Modifier = Box<dyn Fn(Context) -> Context + Send + Sync>;

/// A teardown procedure run once when the [`Cli`][crate::Cli] is cleaned up.
///
/// The procedures can't report errors. Anything that may fail needs to be handled inside.
pub type CleanupFn = Box<dyn FnOnce() + Send>;

/// A required field of [`RootCommandOptions`] was left empty.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct MissingField(&'static str);

impl MissingField {
    /// Name of the offending field (`name` or `version`).
    pub fn field(&self) -> &'static str {
        self.0
    }
}

impl Display for MissingField {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        write!(fmt, "root command must have {}", self.0)
    }
}

impl Error for MissingField {}

/// The options to create the root command with.
///
/// The fields are public and can be filled in directly, or through the chained methods.
///
/// # Examples
///
/// ```rust
/// use cliboot::RootCommandOptions;
///
/// let options = RootCommandOptions::new("demo", "1.0.0")
///     .description("A demo application")
///     .cleanup(|| println!("Bye"));
/// assert!(options.validate().is_ok());
/// ```
#[derive(Default)]
pub struct RootCommandOptions {
    /// Name of the root command, the namespace used to invoke the application.
    pub name: String,

    /// Version, printed by `--version`.
    pub version: String,

    /// Brief description shown in the help output. May be empty.
    pub description: String,

    /// Context modifiers, applied in order before each command body runs.
    pub modifiers: Vec<Modifier>,

    /// Caller supplied cleanup procedures, run in order after the internal teardown.
    pub cleanup_funcs: Vec<CleanupFn>,
}

impl RootCommandOptions {
    /// Creates options with the two required fields set.
    pub fn new<N: Into<String>, V: Into<String>>(name: N, version: V) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ..Self::default()
        }
    }

    /// Sets the description.
    pub fn description<D: Into<String>>(self, description: D) -> Self {
        Self {
            description: description.into(),
            ..self
        }
    }

    /// Appends a context modifier.
    pub fn modifier<F>(mut self, modifier: F) -> Self
    where
        F: Fn(Context) -> Context + Send + Sync + 'static,
    {
        self.modifiers.push(Box::new(modifier));
        self
    }

    /// Appends a cleanup procedure.
    pub fn cleanup<F: FnOnce() + Send + 'static>(mut self, cleanup: F) -> Self {
        self.cleanup_funcs.push(Box::new(cleanup));
        self
    }

    /// Checks the required fields are filled in.
    ///
    /// This has no side effects and can be used as a pre-flight check. The name is checked
    /// first.
    pub fn validate(&self) -> Result<(), MissingField> {
        if self.name.is_empty() {
            return Err(MissingField("name"));
        }
        if self.version.is_empty() {
            return Err(MissingField("version"));
        }
        Ok(())
    }
}

impl Debug for RootCommandOptions {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        fmt.debug_struct("RootCommandOptions")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("description", &self.description)
            .field("modifiers", &self.modifiers.len())
            .field("cleanup_funcs", &self.cleanup_funcs.len())
            .finish()
    }
}
