//! Bounded, closable, single-threaded channel connecting two pipeline stages.
//!
//! Each side is reference counted: every [`Reader`]/[`Writer`] handle opened
//! on the pipe bumps its side's count, and the side only closes once the
//! count drops back to zero. The two sides close independently:
//!
//! - write-closed: buffered items are still delivered, then every read
//!   resolves to `None` (EOF);
//! - read-closed: buffered items are dropped and every write fails with
//!   [`ShellError::BrokenPipe`] (SIGPIPE).
//!
//! Reads that find nothing buffered park in a FIFO of slots; a write hands
//! its item straight to the oldest slot. Writes that find the buffer at
//! capacity park until a reader makes room or a side closes.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use super::handles::{Reader, Writer};
use super::sigpipe::{SigPipe, SigPipeHook};
use crate::error::{Result, ShellError};
use crate::logging::Logger;

type Callback = Box<dyn FnOnce()>;

/// A parked read.
enum Slot<T> {
    Waiting(Waker),
    Filled(Option<T>),
    Done,
}

type SlotRef<T> = Rc<RefCell<Slot<T>>>;

struct Inner<T> {
    name: String,
    capacity: usize,
    writers: usize,
    readers: usize,
    read_closed: bool,
    write_closed: bool,
    buffer: VecDeque<T>,
    pending: VecDeque<SlotRef<T>>,
    blocked_writers: Vec<Waker>,
    on_close_read: Vec<Callback>,
    on_close_write: Vec<Callback>,
    log: Logger,
    sigpipe: Option<SigPipeHook>,
}

/// Outcome of offering one item to the pipe without suspending.
enum Offer<T> {
    Accepted,
    Full(T),
    Failed(ShellError),
}

/// Shared handle to a channel. Cloning shares the same channel; it does not
/// open a new reader or writer.
pub struct Pipe<T> {
    inner: Rc<RefCell<Inner<T>>>,
}

impl<T> Clone for Pipe<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Pipe<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Pipe")
            .field("name", &inner.name)
            .field("readers", &inner.readers)
            .field("writers", &inner.writers)
            .field("read_closed", &inner.read_closed)
            .field("write_closed", &inner.write_closed)
            .field("buffered", &inner.buffer.len())
            .finish()
    }
}

impl<T> Pipe<T> {
    /// Create a pipe buffering at most `capacity` items (at least one).
    pub fn new(name: impl Into<String>, capacity: usize, log: Logger) -> Self {
        let name = name.into();
        log.debug("pipe", format_args!("created #<{}> capacity={}", name, capacity));
        Self {
            inner: Rc::new(RefCell::new(Inner {
                name,
                capacity: capacity.max(1),
                writers: 0,
                readers: 0,
                read_closed: false,
                write_closed: false,
                buffer: VecDeque::new(),
                pending: VecDeque::new(),
                blocked_writers: Vec::new(),
                on_close_read: Vec::new(),
                on_close_write: Vec::new(),
                log,
                sigpipe: None,
            })),
        }
    }

    /// Install the hook notified whenever a write hits a read-closed pipe.
    pub fn with_sigpipe(self, hook: SigPipeHook) -> Self {
        self.inner.borrow_mut().sigpipe = Some(hook);
        self
    }

    pub fn name(&self) -> String {
        self.inner.borrow().name.clone()
    }

    /// Open a new reader handle.
    pub fn reader(&self) -> Reader<T> {
        Reader::open(self.clone())
    }

    /// Open a new writer handle.
    pub fn writer(&self) -> Writer<T> {
        Writer::open(self.clone())
    }

    pub(crate) fn open_read(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.readers += 1;
        inner.log.debug(
            "pipe",
            format_args!("#<{}> OPEN read (r={},w={})", inner.name, inner.readers, inner.writers),
        );
    }

    pub(crate) fn open_write(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.writers += 1;
        inner.log.debug(
            "pipe",
            format_args!("#<{}> OPEN write (r={},w={})", inner.name, inner.readers, inner.writers),
        );
    }

    pub fn readers(&self) -> usize {
        self.inner.borrow().readers
    }

    pub fn writers(&self) -> usize {
        self.inner.borrow().writers
    }

    pub fn is_read_closed(&self) -> bool {
        self.inner.borrow().read_closed
    }

    pub fn is_write_closed(&self) -> bool {
        self.inner.borrow().write_closed
    }

    /// Number of buffered items.
    pub fn len(&self) -> usize {
        self.inner.borrow().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write one item, suspending while the buffer is full.
    pub fn write(&self, item: T) -> Write<'_, T> {
        Write {
            pipe: self,
            item: Some(item),
            error: None,
        }
    }

    /// Write one item without suspending.
    pub fn try_write(&self, item: T) -> Result<()> {
        match self.offer(item, None) {
            Offer::Accepted => Ok(()),
            Offer::Full(_) => Err(ShellError::WouldBlock { pipe: self.name() }),
            Offer::Failed(err) => Err(err),
        }
    }

    /// Read one item; `None` means no more data.
    pub fn read(&self) -> Read<'_, T> {
        Read {
            pipe: self,
            slot: None,
        }
    }

    /// Read until end-of-data.
    pub async fn read_all(&self) -> Vec<T> {
        let mut items = Vec::new();
        while let Some(item) = self.read().await {
            items.push(item);
        }
        items
    }

    fn offer(&self, item: T, waker: Option<&Waker>) -> Offer<T> {
        let mut inner = self.inner.borrow_mut();
        if inner.read_closed {
            let signal = SigPipe::new(&inner.name, format!("pipe is read-closed '{}'", inner.name));
            let hook = inner.sigpipe.clone();
            let pipe = inner.name.clone();
            inner.log.debug("pipe", format_args!("#<{}> sending sigPipe", pipe));
            drop(inner);
            if let Some(hook) = hook {
                hook(&signal);
            }
            return Offer::Failed(ShellError::BrokenPipe { pipe });
        }
        if inner.write_closed {
            return Offer::Failed(ShellError::AlreadyWriteClosed {
                pipe: inner.name.clone(),
            });
        }
        if let Some(slot) = inner.pending.pop_front() {
            drop(inner);
            let previous = mem::replace(&mut *slot.borrow_mut(), Slot::Filled(Some(item)));
            if let Slot::Waiting(reader) = previous {
                reader.wake();
            }
            return Offer::Accepted;
        }
        if inner.buffer.len() < inner.capacity {
            inner.buffer.push_back(item);
            return Offer::Accepted;
        }
        if let Some(waker) = waker {
            if !inner.blocked_writers.iter().any(|w| w.will_wake(waker)) {
                inner.blocked_writers.push(waker.clone());
            }
        }
        Offer::Full(item)
    }

    /// Hand an item taken by an abandoned read back to the pipe.
    fn restore(&self, item: T) {
        let mut inner = self.inner.borrow_mut();
        if inner.read_closed {
            return;
        }
        if let Some(slot) = inner.pending.pop_front() {
            drop(inner);
            let previous = mem::replace(&mut *slot.borrow_mut(), Slot::Filled(Some(item)));
            if let Slot::Waiting(reader) = previous {
                reader.wake();
            }
        } else {
            inner.buffer.push_front(item);
        }
    }

    fn unpark(&self, slot: &SlotRef<T>) {
        self.inner
            .borrow_mut()
            .pending
            .retain(|parked| !Rc::ptr_eq(parked, slot));
    }

    /// Release one writer. Returns `true` if this call closed the write side.
    /// Closing an already-closed side is a no-op.
    pub fn close_write(&self) -> bool {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.writers == 0 {
                return false;
            }
            inner.writers -= 1;
            if inner.writers > 0 {
                return false;
            }
        }
        self.finish_write()
    }

    /// Release one reader. Returns `true` if this call closed the read side.
    pub fn close_read(&self) -> bool {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.readers == 0 {
                return false;
            }
            inner.readers -= 1;
            if inner.readers > 0 {
                return false;
            }
        }
        self.finish_read()
    }

    /// Close both sides regardless of how many handles remain open.
    pub fn force_close(&self) {
        {
            let mut inner = self.inner.borrow_mut();
            inner.writers = 0;
            inner.readers = 0;
        }
        self.finish_write();
        self.finish_read();
    }

    fn finish_write(&self) -> bool {
        let (parked, writers, callbacks) = {
            let mut inner = self.inner.borrow_mut();
            if inner.write_closed {
                return false;
            }
            inner.write_closed = true;
            inner.log.debug("pipe", format_args!("#<{}> write closed", inner.name));
            (
                mem::take(&mut inner.pending),
                mem::take(&mut inner.blocked_writers),
                mem::take(&mut inner.on_close_write),
            )
        };
        // Readers only park when the buffer is empty, so they all get EOF.
        resolve_eof(parked);
        writers.into_iter().for_each(Waker::wake);
        callbacks.into_iter().for_each(|cb| cb());
        true
    }

    fn finish_read(&self) -> bool {
        let (parked, writers, callbacks) = {
            let mut inner = self.inner.borrow_mut();
            if inner.read_closed {
                return false;
            }
            inner.read_closed = true;
            let dropped = inner.buffer.len();
            inner.buffer.clear();
            inner.log.debug(
                "pipe",
                format_args!("#<{}> read closed (dropped {})", inner.name, dropped),
            );
            (
                mem::take(&mut inner.pending),
                mem::take(&mut inner.blocked_writers),
                mem::take(&mut inner.on_close_read),
            )
        };
        resolve_eof(parked);
        writers.into_iter().for_each(Waker::wake);
        callbacks.into_iter().for_each(|cb| cb());
        true
    }

    /// Run `callback` once the write side closes, or now if it already has.
    pub fn on_close_write(&self, callback: impl FnOnce() + 'static) {
        let mut inner = self.inner.borrow_mut();
        if inner.write_closed {
            drop(inner);
            callback();
        } else {
            inner.on_close_write.push(Box::new(callback));
        }
    }

    /// Run `callback` once the read side closes, or now if it already has.
    pub fn on_close_read(&self, callback: impl FnOnce() + 'static) {
        let mut inner = self.inner.borrow_mut();
        if inner.read_closed {
            drop(inner);
            callback();
        } else {
            inner.on_close_read.push(Box::new(callback));
        }
    }
}

fn resolve_eof<T>(parked: VecDeque<SlotRef<T>>) {
    for slot in parked {
        let previous = mem::replace(&mut *slot.borrow_mut(), Slot::Filled(None));
        if let Slot::Waiting(reader) = previous {
            reader.wake();
        }
    }
}

/// Future returned by [`Pipe::write`].
#[must_use = "futures do nothing unless polled"]
pub struct Write<'a, T> {
    pipe: &'a Pipe<T>,
    item: Option<T>,
    error: Option<ShellError>,
}

impl<'a, T> Write<'a, T> {
    /// A write that fails immediately, used by closed handles.
    pub(crate) fn failed(pipe: &'a Pipe<T>, error: ShellError) -> Self {
        Self {
            pipe,
            item: None,
            error: Some(error),
        }
    }
}

// The item is moved in and out by value and never pinned.
impl<T> Unpin for Write<'_, T> {}

impl<T> Future for Write<'_, T> {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Some(err) = this.error.take() {
            return Poll::Ready(Err(err));
        }
        let Some(item) = this.item.take() else {
            return Poll::Ready(Ok(()));
        };
        match this.pipe.offer(item, Some(cx.waker())) {
            Offer::Accepted => Poll::Ready(Ok(())),
            Offer::Failed(err) => Poll::Ready(Err(err)),
            Offer::Full(item) => {
                this.item = Some(item);
                Poll::Pending
            }
        }
    }
}

/// Future returned by [`Pipe::read`].
#[must_use = "futures do nothing unless polled"]
pub struct Read<'a, T> {
    pipe: &'a Pipe<T>,
    slot: Option<SlotRef<T>>,
}

impl<'a, T> Read<'a, T> {
    /// A read that resolves to end-of-data, used by closed handles.
    pub(crate) fn finished(pipe: &'a Pipe<T>) -> Self {
        Self {
            pipe,
            slot: Some(Rc::new(RefCell::new(Slot::Done))),
        }
    }
}

impl<T> Future for Read<'_, T> {
    type Output = Option<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if let Some(slot) = &this.slot {
            let mut state = slot.borrow_mut();
            return match mem::replace(&mut *state, Slot::Done) {
                Slot::Filled(item) => Poll::Ready(item),
                Slot::Done => Poll::Ready(None),
                Slot::Waiting(_) => {
                    *state = Slot::Waiting(cx.waker().clone());
                    Poll::Pending
                }
            };
        }

        let mut inner = this.pipe.inner.borrow_mut();
        if inner.read_closed {
            return Poll::Ready(None);
        }
        if let Some(item) = inner.buffer.pop_front() {
            let writers = mem::take(&mut inner.blocked_writers);
            drop(inner);
            writers.into_iter().for_each(Waker::wake);
            return Poll::Ready(Some(item));
        }
        if inner.write_closed {
            return Poll::Ready(None);
        }
        let slot = Rc::new(RefCell::new(Slot::Waiting(cx.waker().clone())));
        inner.pending.push_back(Rc::clone(&slot));
        this.slot = Some(slot);
        Poll::Pending
    }
}

impl<T> Drop for Read<'_, T> {
    fn drop(&mut self) {
        let Some(slot) = self.slot.take() else {
            return;
        };
        let state = mem::replace(&mut *slot.borrow_mut(), Slot::Done);
        match state {
            Slot::Waiting(_) => self.pipe.unpark(&slot),
            Slot::Filled(Some(item)) => self.pipe.restore(item),
            Slot::Filled(None) | Slot::Done => {}
        }
    }
}
