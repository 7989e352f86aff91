//! Cancellable timers backing `sleep`, `interval` and the interrupt path.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use futures_timer::Delay;

use crate::io::Pipe;
use crate::shell::value::Value;

pub type TimerId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Timeout,
    Interval,
}

impl fmt::Display for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerKind::Timeout => f.write_str("timeout"),
            TimerKind::Interval => f.write_str("interval"),
        }
    }
}

#[derive(Default)]
struct CancelState {
    cancelled: Cell<bool>,
    waker: RefCell<Option<Waker>>,
}

/// Shared cancellation flag for one registered timer.
#[derive(Clone, Default)]
pub struct TimerHandle {
    state: Rc<CancelState>,
}

impl TimerHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the timer and wake whoever is waiting on it.
    pub fn cancel(&self) {
        if self.state.cancelled.replace(true) {
            return;
        }
        if let Some(waker) = self.state.waker.borrow_mut().take() {
            waker.wake();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.get()
    }

    /// One wait of `period` on this handle.
    pub fn wait(&self, period: Duration) -> Wait {
        Wait {
            delay: Delay::new(period),
            handle: self.clone(),
        }
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Resolves `true` when the delay elapses, `false` if cancelled first.
#[must_use = "futures do nothing unless polled"]
pub struct Wait {
    delay: Delay,
    handle: TimerHandle,
}

impl Future for Wait {
    type Output = bool;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<bool> {
        let this = self.get_mut();
        if this.handle.is_cancelled() {
            return Poll::Ready(false);
        }
        *this.handle.state.waker.borrow_mut() = Some(cx.waker().clone());
        match Pin::new(&mut this.delay).poll(cx) {
            Poll::Ready(()) => Poll::Ready(true),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Row of the context's timer table.
pub(crate) struct TimerEntry {
    pub kind: TimerKind,
    pub handle: TimerHandle,
    /// Write side closed when the timer is cancelled, so a reader blocked
    /// on the timed stage is released.
    pub close_on_cancel: Option<Pipe<Value>>,
}
