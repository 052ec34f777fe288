//! The per-execution logger.
//!
//! Before a command body runs, a [`Logger`] is built with the level selected by the number of
//! `-v` flags and bound to the error output of the application. It is stored in the execution
//! context, where the body can find it with [`from_context`].
//!
//! The lines look like this:
//!
//! ```text
//! @timestamp="2024-03-01 12:00:00" @level=warn  @message="Disk almost full"
//! ```

use std::fmt::{Debug, Display, Formatter, Result as FmtResult};
use std::io::Write;
use std::sync::Arc;

use chrono::Local;
use fern::Dispatch;
use log::{Level, LevelFilter, Log, Metadata, Record};

use crate::context::Context;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Maps the number of `-v` flags to the log level.
///
/// No flag means warnings and errors only, each flag adds one more level, up to trace. Anything
/// above three is the same as three.
pub fn level_from_verbosity(count: u64) -> LevelFilter {
    match count {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// A standalone logger writing into one sink.
///
/// It is cheap to clone, the clones share the sink. Apart from its own methods, it implements
/// [`Log`], so it can be passed to anything expecting a logger or installed as the global one
/// with [`install`][Logger::install].
#[derive(Clone)]
pub struct Logger {
    level: LevelFilter,
    inner: Arc<dyn Log>,
}

/// Creates a logger writing into the sink, filtering by the level.
pub fn new<W: Write + Send + 'static>(sink: W, level: LevelFilter) -> Logger {
    let (_, inner) = Dispatch::new()
        .level(level)
        .format(|out, message, record| {
            out.finish(format_args!(
                "@timestamp=\"{}\" @level={:<5} @message=\"{}\"",
                Local::now().format(TIMESTAMP_FORMAT),
                record.level().as_str().to_lowercase(),
                message,
            ))
        })
        .chain(Box::new(sink) as Box<dyn Write + Send>)
        .into_log();
    Logger {
        level,
        inner: Arc::from(inner),
    }
}

impl Logger {
    /// The level this logger lets through.
    pub fn level(&self) -> LevelFilter {
        self.level
    }

    /// Would a message on this level get written?
    pub fn is_enabled(&self, level: Level) -> bool {
        level <= self.level
    }

    /// Logs a message on the given level.
    pub fn log<M: Display>(&self, level: Level, msg: M) {
        self.inner.log(
            &Record::builder()
                .args(format_args!("{}", msg))
                .level(level)
                .target(module_path!())
                .build(),
        );
    }

    pub fn error<M: Display>(&self, msg: M) {
        self.log(Level::Error, msg);
    }

    pub fn warn<M: Display>(&self, msg: M) {
        self.log(Level::Warn, msg);
    }

    pub fn info<M: Display>(&self, msg: M) {
        self.log(Level::Info, msg);
    }

    pub fn debug<M: Display>(&self, msg: M) {
        self.log(Level::Debug, msg);
    }

    pub fn trace<M: Display>(&self, msg: M) {
        self.log(Level::Trace, msg);
    }

    /// Routes the global [`log`] macros into this logger.
    ///
    /// Can be called repeatedly, the last installed logger wins.
    pub fn install(&self) {
        let _ = log_reroute::init();
        log_reroute::reroute_boxed(Box::new(self.clone()));
        log::set_max_level(self.level);
    }
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.is_enabled(metadata.level()) && self.inner.enabled(metadata)
    }
    fn log(&self, record: &Record) {
        self.inner.log(record)
    }
    fn flush(&self) {
        self.inner.flush()
    }
}

impl Debug for Logger {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        fmt.debug_struct("Logger")
            .field("level", &self.level)
            .finish()
    }
}

/// Stores the logger in the context.
pub fn add_to_context(ctx: &Context, logger: Logger) -> Context {
    ctx.with_value(logger)
}

/// Retrieves the logger from the context, if there's one.
pub fn try_from_context(ctx: &Context) -> Option<&Logger> {
    ctx.get()
}

/// Retrieves the logger from the context.
///
/// # Panics
///
/// If there's no logger. Every context handed to a command body has one, so this means the
/// context was put together by hand and is missing a piece.
pub fn from_context(ctx: &Context) -> &Logger {
    match try_from_context(ctx) {
        Some(logger) => logger,
        None => panic!("No logger set in context"),
    }
}
