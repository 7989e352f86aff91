//! Pipe primitives connecting pipeline stages.

mod handles;
mod pipe;
mod sigpipe;

pub use handles::{Reader, Writer};
pub use pipe::{Pipe, Read, Write};
pub use sigpipe::{SigPipe, SigPipeHook};

/// Default number of items a pipe buffers before writers suspend.
pub const DEFAULT_CAPACITY: usize = 64;
