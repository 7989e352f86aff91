//! Reader and writer handles: one-directional views over a [`Pipe`].
//!
//! Opening a handle counts it against its side of the pipe; closing it (or
//! dropping it) releases that count exactly once.

use std::cell::Cell;
use std::fmt;

use super::pipe::{Pipe, Read, Write};
use crate::error::{Result, ShellError};

/// Read side of a pipe.
pub struct Reader<T> {
    pipe: Pipe<T>,
    closed: Cell<bool>,
}

impl<T> Reader<T> {
    pub(crate) fn open(pipe: Pipe<T>) -> Self {
        pipe.open_read();
        Self {
            pipe,
            closed: Cell::new(false),
        }
    }

    /// Read one item; `None` once the writers are done or this side closed.
    pub fn read(&self) -> Read<'_, T> {
        if self.closed.get() {
            Read::finished(&self.pipe)
        } else {
            self.pipe.read()
        }
    }

    pub async fn read_all(&self) -> Vec<T> {
        if self.closed.get() {
            return Vec::new();
        }
        self.pipe.read_all().await
    }

    pub fn is_closed(&self) -> bool {
        self.closed.get() || self.pipe.is_read_closed()
    }

    /// Release this handle. Returns `true` if it was the last reader.
    pub fn close(&self) -> bool {
        if self.closed.replace(true) {
            return false;
        }
        self.pipe.close_read()
    }

    pub fn on_close(&self, callback: impl FnOnce() + 'static) {
        self.pipe.on_close_read(callback);
    }

    pub fn pipe(&self) -> &Pipe<T> {
        &self.pipe
    }
}

impl<T> Clone for Reader<T> {
    /// Opens another reader on the same pipe.
    fn clone(&self) -> Self {
        Reader::open(self.pipe.clone())
    }
}

impl<T> Drop for Reader<T> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<T> fmt::Debug for Reader<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reader")
            .field("pipe", &self.pipe)
            .field("closed", &self.closed.get())
            .finish()
    }
}

/// Write side of a pipe.
pub struct Writer<T> {
    pipe: Pipe<T>,
    closed: Cell<bool>,
}

impl<T> Writer<T> {
    pub(crate) fn open(pipe: Pipe<T>) -> Self {
        pipe.open_write();
        Self {
            pipe,
            closed: Cell::new(false),
        }
    }

    /// Write one item, suspending while the pipe is full.
    pub fn write(&self, item: T) -> Write<'_, T> {
        if self.closed.get() {
            Write::failed(
                &self.pipe,
                ShellError::AlreadyWriteClosed {
                    pipe: self.pipe.name(),
                },
            )
        } else {
            self.pipe.write(item)
        }
    }

    pub fn try_write(&self, item: T) -> Result<()> {
        if self.closed.get() {
            return Err(ShellError::AlreadyWriteClosed {
                pipe: self.pipe.name(),
            });
        }
        self.pipe.try_write(item)
    }

    /// Write every item in order, stopping at the first failure.
    pub async fn write_all(&self, items: impl IntoIterator<Item = T>) -> Result<()> {
        for item in items {
            self.write(item).await?;
        }
        Ok(())
    }

    /// Closed here, closed for writing by every writer, or abandoned by
    /// every reader.
    pub fn is_closed(&self) -> bool {
        self.closed.get() || self.pipe.is_write_closed() || self.pipe.is_read_closed()
    }

    /// Release this handle. Returns `true` if it was the last writer.
    pub fn close(&self) -> bool {
        if self.closed.replace(true) {
            return false;
        }
        self.pipe.close_write()
    }

    pub fn on_close(&self, callback: impl FnOnce() + 'static) {
        self.pipe.on_close_write(callback);
    }

    pub fn pipe(&self) -> &Pipe<T> {
        &self.pipe
    }
}

impl<T> Clone for Writer<T> {
    /// Opens another writer on the same pipe.
    fn clone(&self) -> Self {
        Writer::open(self.pipe.clone())
    }
}

impl<T> Drop for Writer<T> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<T> fmt::Debug for Writer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Writer")
            .field("pipe", &self.pipe)
            .field("closed", &self.closed.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::Logger;
    use futures_lite::future::block_on;

    #[test]
    fn test_drop_closes_handles() {
        let p: Pipe<&str> = Pipe::new("drop", 4, Logger::silent());
        {
            let _w = p.writer();
            let _r = p.reader();
            assert_eq!(p.writers(), 1);
            assert_eq!(p.readers(), 1);
        }
        assert!(p.is_write_closed());
        assert!(p.is_read_closed());
    }

    #[test]
    fn test_closed_handle_behaviour() {
        let p: Pipe<&str> = Pipe::new("closed", 4, Logger::silent());
        let w = p.writer();
        let r = p.reader();
        let _other = r.clone();
        w.try_write("a").unwrap();
        r.close();
        // The other reader keeps the side open.
        assert!(!p.is_read_closed());
        assert!(r.is_closed());
        assert_eq!(block_on(r.read()), None);
        assert!(!r.close());

        w.close();
        assert!(w.is_closed());
        let err = block_on(w.write("b")).unwrap_err();
        assert!(matches!(err, ShellError::AlreadyWriteClosed { .. }));
    }

    #[test]
    fn test_writer_sees_reader_gone() {
        let p: Pipe<u8> = Pipe::new("gone", 4, Logger::silent());
        let w = p.writer();
        drop(p.reader());
        assert!(w.is_closed());
        assert!(block_on(w.write_all([1, 2])).unwrap_err().is_broken_pipe());
    }
}
