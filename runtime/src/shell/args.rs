//! Uniform input for commands: literal argument text first, then upstream.
//!
//! A command like `grep` takes its pattern from the argument text and its
//! data from the previous stage, while `echo a b | grep b` and
//! `grep b a b` should both work. [`ArgsOrStdin`] queues the tokenized
//! argument text ahead of the upstream reader so commands read both through
//! one interface.

use std::collections::{BTreeSet, VecDeque};
use std::rc::Rc;

use itertools::Itertools;
use regex::Regex;

use super::env::ExecEnv;
use super::value::{flatten, Value};
use crate::error::{Result, ShellError};
use crate::io::Reader;

/// Options for [`ArgsOrStdin`].
#[derive(Debug, Clone, Default)]
pub struct ArgOptions {
    /// Positional arguments `read_required` tries to read.
    pub required_args: usize,
    /// Recognized single-character flags, e.g. `"gGi"`.
    pub flags: Option<String>,
    /// Token separator; whitespace when unset.
    pub separator: Option<Regex>,
    /// Re-split text read from upstream with the separator.
    pub split_stdin: bool,
    /// Flatten lists one level in `read_all`.
    pub flatten: bool,
    /// Command name used in error messages.
    pub name: String,
}

impl ArgOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn required(mut self, n: usize) -> Self {
        self.required_args = n;
        self
    }

    pub fn flags(mut self, flags: &str) -> Self {
        self.flags = Some(flags.to_string());
        self
    }

    pub fn separator(mut self, separator: Regex) -> Self {
        self.separator = Some(separator);
        self
    }

    pub fn split_stdin(mut self) -> Self {
        self.split_stdin = true;
        self
    }

    pub fn flatten(mut self) -> Self {
        self.flatten = true;
        self
    }
}

pub struct ArgsOrStdin {
    env: Rc<ExecEnv>,
    stdin: Option<Reader<Value>>,
    queue: VecDeque<Value>,
    opts: ArgOptions,
    seen: BTreeSet<char>,
}

impl ArgsOrStdin {
    /// Tokenize `args` once into the queue; blank text queues nothing.
    pub fn new(
        env: Rc<ExecEnv>,
        stdin: Option<Reader<Value>>,
        args: Option<&str>,
        opts: ArgOptions,
    ) -> Self {
        let queue = args
            .map(|text| split_text(opts.separator.as_ref(), text))
            .unwrap_or_default();
        Self::from_values(env, stdin, queue, opts)
    }

    /// Queue already-split argument values as-is.
    pub fn from_values(
        env: Rc<ExecEnv>,
        stdin: Option<Reader<Value>>,
        values: impl IntoIterator<Item = Value>,
        opts: ArgOptions,
    ) -> Self {
        let queue: VecDeque<Value> = values.into_iter().collect();
        env.log().debug(
            "args",
            format_args!(
                "{}: queued {} arg(s), stdin={}",
                opts.name,
                queue.len(),
                stdin.is_some()
            ),
        );
        Self {
            env,
            stdin,
            queue,
            opts,
            seen: BTreeSet::new(),
        }
    }

    /// Next item, or `None` once arguments and upstream are exhausted or
    /// the run has been interrupted.
    pub async fn read(&mut self) -> Option<Value> {
        if self.env.interrupted() > 0 {
            return None;
        }
        if let Some(item) = self.queue.pop_front() {
            return Some(item);
        }
        let stdin = self.stdin.as_ref()?;
        if stdin.is_closed() {
            return None;
        }
        let item = stdin.read().await?;
        Some(self.resplit(item))
    }

    /// Everything left: queued arguments followed by all of upstream.
    pub async fn read_all(&mut self) -> Vec<Value> {
        let mut items: Vec<Value> = self.queue.drain(..).collect();
        if let Some(stdin) = &self.stdin {
            let upstream = stdin.read_all().await;
            items.extend(upstream.into_iter().map(|item| self.resplit(item)));
        }
        if self.opts.flatten {
            flatten(items)
        } else {
            items
        }
    }

    /// Up to `n` items; fewer when input runs out.
    pub async fn read_n(&mut self, n: usize) -> Vec<Value> {
        let mut items = Vec::with_capacity(n);
        while items.len() < n {
            match self.read().await {
                Some(item) => items.push(item),
                None => break,
            }
        }
        items
    }

    /// Consume leading `-xyz` items made only of recognized flags.
    ///
    /// The first item that is not a flag group is pushed back. A dash item
    /// with an unrecognized character is pushed back too, and reported.
    pub async fn read_flags(&mut self) -> Result<()> {
        let Some(allowed) = self.opts.flags.clone() else {
            return Ok(());
        };
        while let Some(item) = self.read().await {
            let chars: Vec<char> = match item.as_str() {
                Some(text) if text.len() > 1 && text.starts_with('-') => {
                    text.trim_start_matches('-').chars().collect()
                }
                _ => {
                    self.queue.push_front(item);
                    return Ok(());
                }
            };
            let unknown = chars
                .iter()
                .filter(|c| !allowed.contains(**c))
                .sorted()
                .join(",");
            if !unknown.is_empty() {
                self.queue.push_front(item);
                return Err(ShellError::InvalidArgument(format!(
                    "unrecognized flags: {}",
                    unknown
                )));
            }
            self.env
                .log()
                .debug("args", format_args!("{}: flags {:?}", self.opts.name, chars));
            self.seen.extend(chars);
        }
        Ok(())
    }

    /// Flags, then up to `required_args` positional items. A short result
    /// means arguments are missing; see [`ArgsOrStdin::require`].
    pub async fn read_required(&mut self) -> Result<Vec<Value>> {
        self.read_flags().await?;
        Ok(self.read_n(self.opts.required_args).await)
    }

    /// Like [`ArgsOrStdin::read_required`] but a shortfall is an error.
    pub async fn require(&mut self) -> Result<Vec<Value>> {
        let got = self.read_required().await?;
        if got.len() < self.opts.required_args {
            return Err(ShellError::missing(
                self.opts.name.clone(),
                self.opts.required_args,
                got.len(),
            ));
        }
        Ok(got)
    }

    pub fn flag(&self, flag: char) -> bool {
        self.seen.contains(&flag)
    }

    /// No queued arguments and nothing left upstream.
    pub fn is_closed(&self) -> bool {
        self.queue.is_empty()
            && self.stdin.as_ref().map_or(true, |stdin| {
                stdin.is_closed() || (stdin.pipe().is_write_closed() && stdin.pipe().is_empty())
            })
    }

    fn resplit(&self, item: Value) -> Value {
        match item {
            Value::Text(text) if self.opts.split_stdin => {
                Value::List(split_text(self.opts.separator.as_ref(), &text).into())
            }
            other => other,
        }
    }
}

fn split_text(separator: Option<&Regex>, text: &str) -> VecDeque<Value> {
    let text = text.trim();
    if text.is_empty() {
        return VecDeque::new();
    }
    match separator {
        Some(re) => re.split(text).map(Value::from).collect(),
        None => text.split_whitespace().map(Value::from).collect(),
    }
}
