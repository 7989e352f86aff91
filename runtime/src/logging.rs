//! Per-subsystem logger injected into the execution context.
//!
//! Emission goes through `tracing`; this type only decides whether a given
//! subsystem is verbose enough to emit. The decision is a
//! [`tracing_subscriber::filter::Targets`] keyed by subsystem name, so
//! filters use the usual directive syntax (`"pipe=debug,exec=info"`) plus two
//! shell conveniences: `*=level` sets the default and a bare name enables
//! `debug` for that subsystem. Names match by prefix, so `cmd` covers
//! `cmd:string`.
//!
//! Clones share one filter: `debug enable pipe` in a running session changes
//! what every context created from that session logs.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::level_filters::LevelFilter;
use tracing::Level;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::EnvFilter;

use crate::error::{Result, ShellError};

/// Filter the binary installs when `RUST_LOG` is unset. Everything this
/// crate emits is already gated by [`Logger`], so it is let through here.
pub const DEFAULT_ENV_FILTER: &str = "warn,bshell=trace";

/// Cheaply clonable logger handle.
#[derive(Clone)]
pub struct Logger {
    targets: Rc<RefCell<Targets>>,
}

impl Default for Logger {
    fn default() -> Self {
        Self::from_targets(Targets::new().with_default(LevelFilter::WARN))
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Logger").field(&self.render()).finish()
    }
}

/// Rewrite shell filter syntax into `Targets` directives.
fn directives(filter: &str) -> String {
    filter
        .split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(|directive| match directive.split_once('=') {
            Some(("*", level)) => level.trim().to_string(),
            Some((name, level)) => format!("{}={}", name.trim(), level.trim()),
            None if directive == "*" => "debug".to_string(),
            None if directive.parse::<LevelFilter>().is_ok() => directive.to_string(),
            None => format!("{}=debug", directive),
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Parse a filter such as `"pipe=debug,*=warn"`.
pub fn parse_filter(filter: &str) -> Result<Targets> {
    let directives = directives(filter);
    if directives.is_empty() {
        return Ok(Targets::new());
    }
    directives
        .parse::<Targets>()
        .map_err(|e| ShellError::Config(format!("bad debug filter '{}': {}", filter, e)))
}

/// `EnvFilter` for the process-wide subscriber: `RUST_LOG` when given,
/// [`DEFAULT_ENV_FILTER`] otherwise.
pub fn env_filter(rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_ENV_FILTER))
}

impl Logger {
    /// Build a logger from a filter string. A filter that does not parse
    /// falls back to the default (`warn` everywhere) and says so.
    pub fn new(filter: &str) -> Self {
        match parse_filter(filter) {
            Ok(targets) => Self::from_targets(targets),
            Err(err) => {
                tracing::warn!("{}; using defaults", err);
                Self::default()
            }
        }
    }

    pub fn from_targets(targets: Targets) -> Self {
        Self {
            targets: Rc::new(RefCell::new(targets)),
        }
    }

    /// A logger that never emits.
    pub fn silent() -> Self {
        Self::from_targets(Targets::new().with_default(LevelFilter::OFF))
    }

    /// Replace the whole filter. On a parse error the current one is kept.
    pub fn set_filter(&self, filter: &str) -> Result<()> {
        let targets = parse_filter(filter)?;
        *self.targets.borrow_mut() = targets;
        Ok(())
    }

    /// Set one subsystem's level (`*` for the default), keeping the rest.
    pub fn set_level(&self, subsystem: &str, level: LevelFilter) {
        let mut targets = self.targets.borrow_mut();
        let current = std::mem::take(&mut *targets);
        *targets = if subsystem == "*" {
            current.with_default(level)
        } else {
            current.with_target(subsystem, level)
        };
    }

    /// The filter in the syntax [`Logger::new`] accepts, most specific
    /// subsystem first.
    pub fn render(&self) -> String {
        let targets = self.targets.borrow();
        let mut rules: Vec<(&str, LevelFilter)> = targets.iter().collect();
        rules.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then(a.0.cmp(b.0)));
        let mut parts: Vec<String> = rules
            .into_iter()
            .map(|(name, level)| format!("{}={}", name, level))
            .collect();
        if let Some(level) = targets.default_level() {
            parts.push(format!("*={}", level));
        }
        parts.join(",")
    }

    pub fn enabled(&self, subsystem: &str, level: Level) -> bool {
        self.targets.borrow().would_enable(subsystem, &level)
    }

    pub fn debug(&self, subsystem: &str, args: fmt::Arguments<'_>) {
        if self.enabled(subsystem, Level::DEBUG) {
            tracing::debug!(subsystem, "{}", args);
        }
    }

    pub fn info(&self, subsystem: &str, args: fmt::Arguments<'_>) {
        if self.enabled(subsystem, Level::INFO) {
            tracing::info!(subsystem, "{}", args);
        }
    }

    pub fn warn(&self, subsystem: &str, args: fmt::Arguments<'_>) {
        if self.enabled(subsystem, Level::WARN) {
            tracing::warn!(subsystem, "{}", args);
        }
    }
}
