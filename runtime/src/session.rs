//! Interactive session: the front-end side of the pipeline protocol.
//!
//! A session owns the local executor, the command registry and the history.
//! Each submitted line gets a fresh [`ExecEnv`]; its output is drained from
//! the last stage, capped at `output.max_buffer` lines and recorded.

use std::cell::{Ref, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::executor::{LocalPool, LocalSpawner};
use futures::task::LocalSpawnExt;
use futures_timer::Delay;

use crate::config::ShellConfig;
use crate::error::Result;
use crate::history::{FileHistory, HistoryEntry, HistoryStore, MemoryHistory};
use crate::host::{HostBridge, NullHost};
use crate::logging::Logger;
use crate::shell::{ExecEnv, Pipeline, Registry};

/// Marker appended to the output of an interrupted line.
pub const INTERRUPT_MARKER: &str = "^C";

/// Result of one submitted line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outcome {
    pub lines: Vec<String>,
    pub errors: Vec<String>,
    pub interrupted: bool,
    /// The line asked for the screen to be cleared.
    pub clear_screen: bool,
}

type Active = Rc<RefCell<Option<Rc<ExecEnv>>>>;

/// Interrupts whichever line is currently running.
#[derive(Clone)]
pub struct Interrupter {
    active: Active,
}

impl Interrupter {
    /// Soft on the first call for a line, hard on any later one.
    pub fn interrupt(&self) {
        let env = self.active.borrow().clone();
        if let Some(env) = env {
            env.interrupt();
        }
    }
}

pub struct Session {
    registry: Rc<Registry>,
    config: Rc<RefCell<ShellConfig>>,
    log: Logger,
    history: Rc<dyn HistoryStore>,
    host: Rc<dyn HostBridge>,
    pool: RefCell<LocalPool>,
    active: Active,
}

impl Session {
    /// Build a session from config. History is file-backed when
    /// `history.path` is set.
    pub fn new(config: ShellConfig) -> Result<Self> {
        let log = Logger::new(&config.debug.filter);
        let history: Rc<dyn HistoryStore> = match &config.history.path {
            Some(path) => Rc::new(FileHistory::open(path, config.history.max_size)?),
            None => Rc::new(MemoryHistory::new(config.history.max_size)),
        };
        Ok(Self {
            registry: Rc::new(Registry::builtin()),
            config: Rc::new(RefCell::new(config)),
            log,
            history,
            host: Rc::new(NullHost),
            pool: RefCell::new(LocalPool::new()),
            active: Rc::new(RefCell::new(None)),
        })
    }

    pub fn with_host(mut self, host: Rc<dyn HostBridge>) -> Self {
        self.host = host;
        self
    }

    pub fn with_history(mut self, history: Rc<dyn HistoryStore>) -> Self {
        self.history = history;
        self
    }

    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = Rc::new(registry);
        self
    }

    pub fn history(&self) -> &Rc<dyn HistoryStore> {
        &self.history
    }

    /// Current settings, including changes made by `settings` and `alias`.
    pub fn config(&self) -> Ref<'_, ShellConfig> {
        self.config.borrow()
    }

    pub fn log(&self) -> &Logger {
        &self.log
    }

    /// Spawner for the session's executor. Tasks spawned here run while a
    /// line is being processed.
    pub fn spawner(&self) -> LocalSpawner {
        self.pool.borrow().spawner()
    }

    pub fn interrupter(&self) -> Interrupter {
        Interrupter {
            active: Rc::clone(&self.active),
        }
    }

    pub fn interrupt(&self) {
        self.interrupter().interrupt();
    }

    /// Turn key presses counted on another thread (a Ctrl+C handler) into
    /// interrupts. Every `poll`, each press recorded in `presses` since the
    /// last check interrupts the running line once, so a second press
    /// escalates to a teardown. Presses while idle are dropped.
    pub fn watch_interrupts(&self, presses: Arc<AtomicUsize>, poll: Duration) -> Result<()> {
        let interrupter = self.interrupter();
        let log = self.log.clone();
        self.spawner().spawn_local(async move {
            loop {
                Delay::new(poll).await;
                let count = presses.swap(0, Ordering::SeqCst);
                if count == 0 {
                    continue;
                }
                log.debug("session", format_args!("{} interrupt key press(es)", count));
                for _ in 0..count {
                    interrupter.interrupt();
                }
            }
        })?;
        Ok(())
    }

    /// Run one line to completion.
    pub fn submit(&self, line: &str) -> Outcome {
        let line = line.trim();
        if line.is_empty() {
            return Outcome::default();
        }
        self.log.info("session", format_args!("submit: {}", line));

        let env = Rc::new(
            ExecEnv::new(Rc::clone(&self.registry), self.log.clone())
                .with_config(Rc::clone(&self.config))
                .with_history(Rc::clone(&self.history))
                .with_host(Rc::clone(&self.host)),
        );
        let mut pipeline = Pipeline::new(line);
        if let Err(errors) = pipeline.validate(&env) {
            let errors: Vec<String> = errors.iter().map(ToString::to_string).collect();
            let recorded = errors.iter().map(|e| format!("Error: {}", e)).collect();
            self.record(line, None, recorded);
            return Outcome {
                lines: Vec::new(),
                errors,
                ..Outcome::default()
            };
        }
        let head = pipeline.command_line().head().map(str::to_string);

        *self.active.borrow_mut() = Some(Rc::clone(&env));
        let lines = self.run(&env, &mut pipeline);
        self.active.borrow_mut().take();

        let interrupted = env.interrupted() > 0;
        let errors = env.take_errors();
        let mut lines: Vec<String> = lines.into();
        self.record(line, head.as_deref(), lines.clone());
        if interrupted {
            lines.push(INTERRUPT_MARKER.to_string());
        }
        Outcome {
            lines,
            errors,
            interrupted,
            clear_screen: env.clear_requested(),
        }
    }

    fn run(&self, env: &Rc<ExecEnv>, pipeline: &mut Pipeline) -> VecDeque<String> {
        let max_lines = self.config.borrow().output.max_buffer;
        let mut pool = self.pool.borrow_mut();
        let lines = match pipeline.execute(env, &pool.spawner()) {
            Ok(reader) => pool.run_until(async move {
                let mut lines = VecDeque::new();
                while let Some(item) = reader.read().await {
                    lines.push_back(item.to_string());
                    if lines.len() > max_lines {
                        lines.pop_front();
                    }
                }
                lines
            }),
            Err(err) => {
                self.log
                    .warn("session", format_args!("pipeline not started: {}", err));
                VecDeque::new()
            }
        };
        // Let upstream stages observe the closed pipes, then reclaim
        // whatever is still parked on a timer.
        pool.run_until_stalled();
        env.teardown();
        pool.run_until_stalled();
        lines
    }

    fn record(&self, line: &str, head: Option<&str>, output: Vec<String>) {
        let typed = line.split_whitespace().next().unwrap_or_default();
        let skipped = self
            .config
            .borrow()
            .history
            .skip
            .iter()
            .any(|s| s == typed || Some(s.as_str()) == head);
        if skipped {
            return;
        }
        if let Err(err) = self.history.push(HistoryEntry::new(line, output)) {
            self.log
                .warn("session", format_args!("history not recorded: {}", err));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(ShellConfig::default()).unwrap()
    }

    #[test]
    fn test_empty_line() {
        assert_eq!(session().submit("   "), Outcome::default());
    }

    #[test]
    fn test_unknown_command_recorded_as_error() {
        let s = session();
        let outcome = s.submit("frob | len");
        assert_eq!(outcome.errors, vec!["Unknown command: frob"]);
        assert!(outcome.lines.is_empty());
        let last = s.history().get(-1).unwrap();
        assert_eq!(last.output, vec!["Error: Unknown command: frob"]);
    }

    #[test]
    fn test_skip_list() {
        let s = session();
        s.submit("echo kept");
        s.submit("help len");
        s.submit("hist");
        assert_eq!(s.history().len(), 1);
        assert_eq!(s.history().get(-1).unwrap().command, "echo kept");
    }

    #[test]
    fn test_settings_persist_across_lines() {
        let s = session();
        s.submit("alias ll len");
        assert_eq!(s.submit("ll ab").lines, vec!["2"]);
        s.submit("set output.max_buffer:1");
        assert_eq!(s.config().output.max_buffer, 1);
        assert_eq!(s.submit("len a bb").lines, vec!["2"]);
        s.submit("debug enable exec");
        assert!(s.log().enabled("exec", tracing::Level::DEBUG));
        assert_eq!(s.config().debug.filter, "exec=debug,*=warn");
    }

    #[test]
    fn test_alias_line_not_recorded() {
        let s = session();
        s.submit("alias ll len");
        s.submit("ll abc");
        assert_eq!(s.history().len(), 1);
        // the head is canonicalised, so the skip list still applies
        s.submit("alias hh hist");
        s.submit("hh");
        assert_eq!(s.history().len(), 1);
    }

    #[test]
    fn test_clear_screen_flag() {
        let s = session();
        assert!(s.submit("clear").clear_screen);
        assert!(!s.submit("echo x").clear_screen);
    }

    #[test]
    fn test_output_buffer_cap() {
        let mut config = ShellConfig::default();
        config.output.max_buffer = 2;
        let s = Session::new(config).unwrap();
        let outcome = s.submit("echo a b c d | split \\s+");
        assert_eq!(outcome.lines, vec!["c", "d"]);
    }
}
