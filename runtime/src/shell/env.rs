//! Execution context shared by every stage of one submitted line.
//!
//! The context owns the command registry, the timer table, the two-level
//! interrupt counter, every pipe created for the run, the error sink and the
//! collaborator handles (history and host bridge). Stages receive it as an
//! `Rc<ExecEnv>`; nothing in here is borrowed across a suspension point,
//! which includes the `Ref`s handed out by `config()`.

use std::cell::{Cell, Ref, RefCell, RefMut};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use async_channel::{Receiver, Sender};

use super::commands::{CommandSpec, Registry};
use super::timers::{TimerEntry, TimerHandle, TimerId, TimerKind};
use super::value::Value;
use crate::config::ShellConfig;
use crate::history::{HistoryStore, MemoryHistory};
use crate::host::{HostBridge, NullHost};
use crate::io::{Pipe, SigPipe, Writer};
use crate::logging::Logger;

/// Interrupt level reached by a second `interrupt()` or by `interrupt_hard()`.
pub const HARD_INTERRUPT: u32 = 2;

pub struct ExecEnv {
    registry: Rc<Registry>,
    config: Rc<RefCell<ShellConfig>>,
    log: Logger,
    history: Rc<dyn HistoryStore>,
    host: Rc<dyn HostBridge>,
    interrupted: Cell<u32>,
    timers: RefCell<BTreeMap<TimerId, TimerEntry>>,
    next_timer: Cell<TimerId>,
    pipes: RefCell<Vec<Pipe<Value>>>,
    stderr_tx: Sender<String>,
    stderr_rx: Receiver<String>,
    sigpipes: Rc<RefCell<Vec<SigPipe>>>,
    clear_requested: Cell<bool>,
}

impl ExecEnv {
    /// A context over `registry` with default config, an in-memory history
    /// and no host bridge.
    pub fn new(registry: Rc<Registry>, log: Logger) -> Self {
        let config = ShellConfig::default();
        let history: Rc<dyn HistoryStore> =
            Rc::new(MemoryHistory::new(config.history.max_size));
        let config = Rc::new(RefCell::new(config));
        let (stderr_tx, stderr_rx) = async_channel::unbounded();
        Self {
            registry,
            config,
            log,
            history,
            host: Rc::new(NullHost),
            interrupted: Cell::new(0),
            timers: RefCell::new(BTreeMap::new()),
            next_timer: Cell::new(0),
            pipes: RefCell::new(Vec::new()),
            stderr_tx,
            stderr_rx,
            sigpipes: Rc::new(RefCell::new(Vec::new())),
            clear_requested: Cell::new(false),
        }
    }

    pub fn with_config(mut self, config: Rc<RefCell<ShellConfig>>) -> Self {
        self.config = config;
        self
    }

    pub fn with_history(mut self, history: Rc<dyn HistoryStore>) -> Self {
        self.history = history;
        self
    }

    pub fn with_host(mut self, host: Rc<dyn HostBridge>) -> Self {
        self.host = host;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Look a command up by name, built-in alias, then user alias.
    pub fn command(&self, name: &str) -> Option<&CommandSpec> {
        self.registry.lookup(name).or_else(|| {
            let target = self.config.borrow().aliases.get(name).cloned()?;
            self.registry.lookup(&target)
        })
    }

    /// Canonical name for `name`, see [`ExecEnv::command`].
    pub fn resolve(&self, name: &str) -> Option<&'static str> {
        self.command(name).map(|spec| spec.name)
    }

    pub fn config(&self) -> Ref<'_, ShellConfig> {
        self.config.borrow()
    }

    pub fn config_mut(&self) -> RefMut<'_, ShellConfig> {
        self.config.borrow_mut()
    }

    pub fn log(&self) -> &Logger {
        &self.log
    }

    pub fn history(&self) -> &Rc<dyn HistoryStore> {
        &self.history
    }

    pub fn host(&self) -> &Rc<dyn HostBridge> {
        &self.host
    }

    /// Ask the front end to clear its screen once this line is done.
    pub fn request_clear(&self) {
        self.clear_requested.set(true);
    }

    pub fn clear_requested(&self) -> bool {
        self.clear_requested.get()
    }

    // ---- pipes -------------------------------------------------------------

    /// Create a pipe for this run and register it for teardown.
    pub fn pipe(&self, label: &str) -> Pipe<Value> {
        let index = self.pipes.borrow().len() + 1;
        let sigpipes = Rc::clone(&self.sigpipes);
        let log = self.log.clone();
        let capacity = self.config.borrow().pipe.capacity;
        let pipe = Pipe::new(format!("pipe<{}.{}>", label, index), capacity, self.log.clone())
        .with_sigpipe(Rc::new(move |signal: &SigPipe| {
            log.debug("pipe", format_args!("SIGPIPE {}", signal.message));
            sigpipes.borrow_mut().push(signal.clone());
        }));
        self.pipes.borrow_mut().push(pipe.clone());
        pipe
    }

    pub fn pipes(&self) -> Vec<Pipe<Value>> {
        self.pipes.borrow().clone()
    }

    /// SIGPIPE signals raised by this run's pipes, oldest first.
    pub fn sigpipes(&self) -> Vec<SigPipe> {
        self.sigpipes.borrow().clone()
    }

    // ---- errors ------------------------------------------------------------

    /// Report a user-visible error line.
    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        self.log.info("exec", format_args!("error: {}", message));
        // Unbounded and the receiver lives as long as `self`.
        let _ = self.stderr_tx.try_send(message);
    }

    /// Drain the error lines reported so far.
    pub fn take_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        while let Ok(message) = self.stderr_rx.try_recv() {
            errors.push(message);
        }
        errors
    }

    // ---- timers ------------------------------------------------------------

    /// Register a timer. Cancelling it closes `close_on_cancel`'s pipe for
    /// writing so a reader blocked downstream is released.
    pub fn register_timer(
        &self,
        kind: TimerKind,
        handle: TimerHandle,
        close_on_cancel: Option<&Writer<Value>>,
    ) -> TimerId {
        let id = self.next_timer.get();
        self.next_timer.set(id + 1);
        self.log
            .debug("timer", format_args!("register {} #{}", kind, id));
        self.timers.borrow_mut().insert(
            id,
            TimerEntry {
                kind,
                handle,
                close_on_cancel: close_on_cancel.map(|w| w.pipe().clone()),
            },
        );
        id
    }

    /// Cancel a registered timer. Returns `false` if `id` is unknown.
    pub fn cancel_timer(&self, id: TimerId) -> bool {
        let Some(entry) = self.timers.borrow_mut().remove(&id) else {
            return false;
        };
        self.log
            .debug("timer", format_args!("cancel {} #{}", entry.kind, id));
        entry.handle.cancel();
        if let Some(pipe) = entry.close_on_cancel {
            pipe.close_write();
        }
        true
    }

    fn forget_timer(&self, id: TimerId) {
        self.timers.borrow_mut().remove(&id);
    }

    pub fn timer_count(&self) -> usize {
        self.timers.borrow().len()
    }

    /// Wait `ms` milliseconds. Resolves `false` if the wait was cancelled
    /// (or the run was already torn down), `true` once it elapsed.
    pub async fn sleep(&self, ms: u64, close_on_cancel: Option<&Writer<Value>>) -> bool {
        if self.interrupted() >= HARD_INTERRUPT {
            return false;
        }
        let handle = TimerHandle::new();
        let id = self.register_timer(TimerKind::Timeout, handle.clone(), close_on_cancel);
        let _entry = TimerGuard { env: self, id };
        handle.wait(Duration::from_millis(ms)).await
    }

    /// A repeating timer firing every `ms` milliseconds.
    pub fn interval(&self, ms: u64, close_on_cancel: Option<&Writer<Value>>) -> Interval<'_> {
        let handle = TimerHandle::new();
        if self.interrupted() >= HARD_INTERRUPT {
            handle.cancel();
        }
        let id = self.register_timer(TimerKind::Interval, handle.clone(), close_on_cancel);
        Interval {
            env: self,
            id,
            handle,
            period: Duration::from_millis(ms),
        }
    }

    // ---- interrupts --------------------------------------------------------

    /// 0 while running, 1 after a soft interrupt, 2 or more once torn down.
    pub fn interrupted(&self) -> u32 {
        self.interrupted.get()
    }

    /// The first call only raises the flag so stages can stop on their own;
    /// any later call cancels every timer and force-closes every pipe.
    pub fn interrupt(&self) {
        let level = self.interrupted.get();
        self.log.debug("exec", format_args!("interrupt: level={}", level));
        if level >= 1 {
            self.teardown();
        }
        self.interrupted.set(level + 1);
    }

    /// Tear down immediately, skipping the soft stage.
    pub fn interrupt_hard(&self) {
        let level = self.interrupted.get();
        self.log.debug("exec", format_args!("hard interrupt: level={}", level));
        self.teardown();
        self.interrupted.set((level + 1).max(HARD_INTERRUPT));
    }

    /// Cancel all timers and force-close all pipes of this run.
    pub fn teardown(&self) {
        let ids: Vec<TimerId> = self.timers.borrow().keys().copied().collect();
        let pipes = self.pipes();
        self.log.debug(
            "exec",
            format_args!("teardown: {} timer(s), {} pipe(s)", ids.len(), pipes.len()),
        );
        for id in ids {
            self.cancel_timer(id);
        }
        for pipe in pipes {
            pipe.force_close();
        }
    }
}

impl fmt::Debug for ExecEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecEnv")
            .field("interrupted", &self.interrupted.get())
            .field("timers", &self.timers.borrow().len())
            .field("pipes", &self.pipes.borrow().len())
            .finish()
    }
}

/// Removes a one-shot timer from the table once its wait ends or is dropped.
struct TimerGuard<'a> {
    env: &'a ExecEnv,
    id: TimerId,
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        self.env.forget_timer(self.id);
    }
}

/// Repeating timer registered with an [`ExecEnv`].
pub struct Interval<'a> {
    env: &'a ExecEnv,
    id: TimerId,
    handle: TimerHandle,
    period: Duration,
}

impl Interval<'_> {
    /// Wait one period. `false` once the interval has been cancelled.
    pub async fn tick(&mut self) -> bool {
        if self.handle.is_cancelled() {
            return false;
        }
        self.handle.wait(self.period).await
    }

    pub fn id(&self) -> TimerId {
        self.id
    }
}

impl Drop for Interval<'_> {
    fn drop(&mut self) {
        self.env.forget_timer(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_lite::future::{block_on, poll_once};

    fn env() -> ExecEnv {
        ExecEnv::new(Rc::new(Registry::builtin()), Logger::silent())
    }

    #[test]
    fn test_soft_then_hard_interrupt() {
        let env = env();
        let a = env.pipe("a");
        let b = env.pipe("b");
        let _w = a.writer();
        let _r = b.reader();
        let _timer = env.interval(10_000, None);

        env.interrupt();
        assert_eq!(env.interrupted(), 1);
        assert!(!a.is_write_closed());
        assert_eq!(env.timer_count(), 1);

        env.interrupt();
        assert_eq!(env.interrupted(), 2);
        for pipe in env.pipes() {
            assert!(pipe.is_read_closed());
            assert!(pipe.is_write_closed());
        }
        assert_eq!(env.timer_count(), 0);
    }

    #[test]
    fn test_interrupt_hard_from_running() {
        let env = env();
        let p = env.pipe("x");
        env.interrupt_hard();
        assert!(env.interrupted() >= HARD_INTERRUPT);
        assert!(p.is_write_closed());
    }

    #[test]
    fn test_sleep_fires_and_self_removes() {
        let env = env();
        assert!(block_on(env.sleep(1, None)));
        assert_eq!(env.timer_count(), 0);
    }

    #[test]
    fn test_cancel_timer_closes_linked_pipe() {
        let env = env();
        let pipe = env.pipe("timed");
        let stdout = pipe.writer();
        let reader = pipe.reader();
        block_on(async {
            let mut sleep = Box::pin(env.sleep(60_000, Some(&stdout)));
            assert!(poll_once(&mut sleep).await.is_none());
            assert_eq!(env.timer_count(), 1);
            assert!(env.cancel_timer(0));
            assert!(!sleep.await);
            assert_eq!(reader.read().await, None);
        });
        assert!(pipe.is_write_closed());
        assert!(!env.cancel_timer(0));
    }

    #[test]
    fn test_sleep_after_teardown_returns_immediately() {
        let env = env();
        env.interrupt_hard();
        assert!(!block_on(env.sleep(60_000, None)));
        assert_eq!(env.timer_count(), 0);
    }

    #[test]
    fn test_error_sink_keeps_order() {
        let env = env();
        env.error("one");
        env.error("two");
        assert_eq!(env.take_errors(), vec!["one", "two"]);
        assert!(env.take_errors().is_empty());
    }

    #[test]
    fn test_user_alias_resolves_after_builtins() {
        let env = env();
        assert_eq!(env.resolve("ll"), None);
        env.config_mut()
            .aliases
            .insert("ll".to_string(), "len".to_string());
        assert_eq!(env.resolve("ll"), Some("len"));
        // built-in names and aliases win
        env.config_mut()
            .aliases
            .insert("take".to_string(), "len".to_string());
        assert_eq!(env.resolve("take"), Some("head"));
        // a dangling alias resolves to nothing
        env.config_mut()
            .aliases
            .insert("gone".to_string(), "nope".to_string());
        assert_eq!(env.resolve("gone"), None);
    }

    #[test]
    fn test_pipe_capacity_from_live_config() {
        let env = env();
        env.config_mut().pipe.capacity = 1;
        let pipe = env.pipe("small");
        let w = pipe.writer();
        let _r = pipe.reader();
        assert!(w.try_write(Value::from("a")).is_ok());
        assert!(w.try_write(Value::from("b")).is_err());
    }

    #[test]
    fn test_sigpipe_recorded() {
        let env = env();
        let pipe = env.pipe("cut");
        let w = pipe.writer();
        drop(pipe.reader());
        assert!(w.try_write(Value::from("x")).unwrap_err().is_broken_pipe());
        let signals = env.sigpipes();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].pipe, "pipe<cut.1>");
    }
}
