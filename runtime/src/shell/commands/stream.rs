//! Stream commands: len, sum, wc, join, split, chunk, head, tail, drop,
//! wait, uniq, sort, reverse

use std::collections::HashSet;
use std::rc::Rc;

use bshell_macros::shell_commands;
use futures_lite::future::BoxedLocal;
use regex::Regex;

use super::super::args::{ArgOptions, ArgsOrStdin};
use super::super::env::ExecEnv;
use super::super::value::Value;
use super::{parse_count, CommandSpec};
use crate::error::Result;
use crate::io::{Reader, Writer};

/// Registered without an implementation, so it forwards its input.
pub(super) const PAUSE: CommandSpec = CommandSpec {
    name: "pause",
    usage: "pause",
    description: "Pause stream (passes input through)",
    help: &[],
    aliases: &[],
    run: None,
};

/// Stream commands - reshape sequences of items.
pub struct StreamCommands;

#[shell_commands]
impl StreamCommands {
    #[shell_command(
        name = "len",
        usage = "len [ITEM]...",
        description = "Compute length of inputs"
    )]
    fn cmd_len(
        env: Rc<ExecEnv>,
        stdin: Option<Reader<Value>>,
        stdout: Writer<Value>,
        args: Option<String>,
    ) -> BoxedLocal<Result<()>> {
        Box::pin(async move {
            let mut input = ArgsOrStdin::new(env, stdin, args.as_deref(), ArgOptions::new("len"));
            while let Some(item) = input.read().await {
                stdout.write(Value::from(item.len())).await?;
            }
            Ok(())
        })
    }

    #[shell_command(name = "sum", usage = "sum [NUMBER]...", description = "Sum inputs")]
    fn cmd_sum(
        env: Rc<ExecEnv>,
        stdin: Option<Reader<Value>>,
        stdout: Writer<Value>,
        args: Option<String>,
    ) -> BoxedLocal<Result<()>> {
        Box::pin(async move {
            let mut input =
                ArgsOrStdin::new(Rc::clone(&env), stdin, args.as_deref(), ArgOptions::new("sum"));
            let mut total = 0.0;
            for item in input.read_all().await {
                match item.as_number() {
                    Some(n) => total += n,
                    None => env.error(format!("sum: skipped {}", item)),
                }
            }
            stdout.write(Value::from(total)).await
        })
    }

    #[shell_command(
        name = "wc",
        usage = "wc [-lwc] [TEXT]...",
        description = "Count lines, words or chars for each input",
        help = "wc [-lwc] - count by lines, words or chars",
        help = "  Flags: l => lines(default), w => words, c => chars"
    )]
    fn cmd_wc(
        env: Rc<ExecEnv>,
        stdin: Option<Reader<Value>>,
        stdout: Writer<Value>,
        args: Option<String>,
    ) -> BoxedLocal<Result<()>> {
        Box::pin(async move {
            let mut input = ArgsOrStdin::new(
                Rc::clone(&env),
                stdin,
                args.as_deref(),
                ArgOptions::new("wc").flags("lwc"),
            );
            input.read_flags().await?;
            // l wins over w, w over c
            let mode = ['l', 'w', 'c']
                .into_iter()
                .find(|f| input.flag(*f))
                .unwrap_or('l');
            while let Some(item) = input.read().await {
                let count = item.as_str().map(|text| match mode {
                    'w' => text.split_whitespace().count(),
                    'c' => text.chars().count(),
                    _ => text.split('\n').count(),
                });
                match count {
                    Some(count) => stdout.write(Value::from(count)).await?,
                    None => env.error(format!("wc: skipped {}", item)),
                }
            }
            Ok(())
        })
    }

    #[shell_command(
        name = "join",
        usage = "join [SEP]",
        description = "Join inputs",
        help = "join [sep=\\n] - join inputs with SEP"
    )]
    fn cmd_join(
        env: Rc<ExecEnv>,
        stdin: Option<Reader<Value>>,
        stdout: Writer<Value>,
        args: Option<String>,
    ) -> BoxedLocal<Result<()>> {
        Box::pin(async move {
            let separator = args.unwrap_or_else(|| "\n".to_string());
            let mut input = ArgsOrStdin::new(env, stdin, None, ArgOptions::new("join"));
            let items = input.read_all().await;
            let joined = itertools::join(items.iter(), &separator);
            stdout.write(Value::from(joined)).await
        })
    }

    #[shell_command(
        name = "split",
        usage = "split [REGEX]",
        description = "Split inputs",
        help = "split [sep=\\s*\\n+\\s*] - split inputs by SEP"
    )]
    fn cmd_split(
        env: Rc<ExecEnv>,
        stdin: Option<Reader<Value>>,
        stdout: Writer<Value>,
        args: Option<String>,
    ) -> BoxedLocal<Result<()>> {
        Box::pin(async move {
            let separator = match args.as_deref() {
                Some(pattern) => Regex::new(pattern)?,
                None => Regex::new(r"\s*\n+\s*")?,
            };
            let mut input = ArgsOrStdin::new(env, stdin, None, ArgOptions::new("split"));
            while let Some(item) = input.read().await {
                match item {
                    Value::Text(text) => {
                        for part in separator.split(&text) {
                            stdout.write(Value::from(part)).await?;
                        }
                    }
                    other => stdout.write(other).await?,
                }
            }
            Ok(())
        })
    }

    #[shell_command(
        name = "chunk",
        usage = "chunk [n=5]",
        description = "Accumulate inputs into chunks of size [n=5]"
    )]
    fn cmd_chunk(
        env: Rc<ExecEnv>,
        stdin: Option<Reader<Value>>,
        stdout: Writer<Value>,
        args: Option<String>,
    ) -> BoxedLocal<Result<()>> {
        Box::pin(async move {
            let n = parse_count(args.as_deref(), 5);
            let mut input = ArgsOrStdin::new(env, stdin, None, ArgOptions::new("chunk"));
            loop {
                let chunk = input.read_n(n).await;
                if chunk.is_empty() {
                    return Ok(());
                }
                stdout.write(Value::List(chunk)).await?;
            }
        })
    }

    #[shell_command(
        name = "head",
        usage = "head [n=5]",
        description = "Keep the first [n=5] elements",
        aliases = "take"
    )]
    fn cmd_head(
        env: Rc<ExecEnv>,
        stdin: Option<Reader<Value>>,
        stdout: Writer<Value>,
        args: Option<String>,
    ) -> BoxedLocal<Result<()>> {
        Box::pin(async move {
            let n = parse_count(args.as_deref(), 5);
            let mut input = ArgsOrStdin::new(env, stdin, None, ArgOptions::new("head"));
            for _ in 0..n {
                match input.read().await {
                    Some(item) => stdout.write(item).await?,
                    None => break,
                }
            }
            Ok(())
        })
    }

    #[shell_command(
        name = "tail",
        usage = "tail [n=5]",
        description = "Keep the last [n=5] elements",
        aliases = "last"
    )]
    fn cmd_tail(
        env: Rc<ExecEnv>,
        stdin: Option<Reader<Value>>,
        stdout: Writer<Value>,
        args: Option<String>,
    ) -> BoxedLocal<Result<()>> {
        Box::pin(async move {
            let n = parse_count(args.as_deref(), 5);
            let mut input = ArgsOrStdin::new(env, stdin, None, ArgOptions::new("tail"));
            let mut items = input.read_all().await;
            let skip = items.len().saturating_sub(n);
            stdout.write_all(items.drain(skip..)).await
        })
    }

    #[shell_command(
        name = "drop",
        usage = "drop [n=5]",
        description = "Drop the first [n=5] elements"
    )]
    fn cmd_drop(
        env: Rc<ExecEnv>,
        stdin: Option<Reader<Value>>,
        stdout: Writer<Value>,
        args: Option<String>,
    ) -> BoxedLocal<Result<()>> {
        Box::pin(async move {
            let mut remaining = parse_count(args.as_deref(), 5);
            let mut input = ArgsOrStdin::new(env, stdin, None, ArgOptions::new("drop"));
            while let Some(item) = input.read().await {
                if remaining > 0 {
                    remaining -= 1;
                } else {
                    stdout.write(item).await?;
                }
            }
            Ok(())
        })
    }

    #[shell_command(
        name = "wait",
        usage = "wait [ms=2000]",
        description = "Wait for [ms=2000] before passing input on"
    )]
    fn cmd_wait(
        env: Rc<ExecEnv>,
        stdin: Option<Reader<Value>>,
        stdout: Writer<Value>,
        args: Option<String>,
    ) -> BoxedLocal<Result<()>> {
        Box::pin(async move {
            let ms = parse_count(args.as_deref(), 2000) as u64;
            env.log().debug("cmd:stream", format_args!("wait: {}ms", ms));
            if !env.sleep(ms, Some(&stdout)).await {
                return Ok(());
            }
            let mut input = ArgsOrStdin::new(env, stdin, None, ArgOptions::new("wait"));
            while let Some(item) = input.read().await {
                stdout.write(item).await?;
            }
            Ok(())
        })
    }

    #[shell_command(
        name = "uniq",
        usage = "uniq [ITEM]...",
        description = "Remove duplicates, keeping the first occurrence"
    )]
    fn cmd_uniq(
        env: Rc<ExecEnv>,
        stdin: Option<Reader<Value>>,
        stdout: Writer<Value>,
        args: Option<String>,
    ) -> BoxedLocal<Result<()>> {
        Box::pin(async move {
            let mut input = ArgsOrStdin::new(env, stdin, args.as_deref(), ArgOptions::new("uniq"));
            let mut seen = HashSet::new();
            while let Some(item) = input.read().await {
                if seen.insert(item.to_string()) {
                    stdout.write(item).await?;
                }
            }
            Ok(())
        })
    }

    #[shell_command(name = "sort", usage = "sort [ITEM]...", description = "Sort inputs")]
    fn cmd_sort(
        env: Rc<ExecEnv>,
        stdin: Option<Reader<Value>>,
        stdout: Writer<Value>,
        args: Option<String>,
    ) -> BoxedLocal<Result<()>> {
        Box::pin(async move {
            let mut input = ArgsOrStdin::new(env, stdin, args.as_deref(), ArgOptions::new("sort"));
            let mut items = input.read_all().await;
            // Compared by display text.
            items.sort_by_cached_key(Value::to_string);
            stdout.write_all(items).await
        })
    }

    #[shell_command(
        name = "reverse",
        usage = "reverse [ITEM]...",
        description = "Reverse inputs"
    )]
    fn cmd_reverse(
        env: Rc<ExecEnv>,
        stdin: Option<Reader<Value>>,
        stdout: Writer<Value>,
        args: Option<String>,
    ) -> BoxedLocal<Result<()>> {
        Box::pin(async move {
            let mut input =
                ArgsOrStdin::new(env, stdin, args.as_deref(), ArgOptions::new("reverse"));
            let items = input.read_all().await;
            stdout.write_all(items.into_iter().rev()).await
        })
    }
}
