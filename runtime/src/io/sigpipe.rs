//! SIGPIPE diagnostics.
//!
//! A write to a read-closed pipe fails with `BrokenPipe` in the producing
//! stage; in addition the pipe emits a [`SigPipe`] record to whoever
//! installed a hook, so the session can see which pipes were cut short.

use std::rc::Rc;

use chrono::{DateTime, Utc};

/// One broken-pipe event.
#[derive(Debug, Clone, PartialEq)]
pub struct SigPipe {
    pub pipe: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl SigPipe {
    pub fn new(pipe: &str, message: impl Into<String>) -> Self {
        Self {
            pipe: pipe.to_string(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Receiver of SIGPIPE records.
pub type SigPipeHook = Rc<dyn Fn(&SigPipe)>;
