//! Interval commands: tick, yes

use std::rc::Rc;

use bshell_macros::shell_commands;
use futures_lite::future::BoxedLocal;

use super::super::env::ExecEnv;
use super::super::value::Value;
use super::parse_count;
use crate::error::Result;
use crate::io::{Reader, Writer};

/// Interval commands - timed emission.
pub struct IntervalCommands;

#[shell_commands]
impl IntervalCommands {
    #[shell_command(
        name = "tick",
        usage = "tick [ms=400]",
        description = "Read at intervals",
        help = "tick [ms=400] - pass one item on every MS millisecs"
    )]
    fn cmd_tick(
        env: Rc<ExecEnv>,
        stdin: Option<Reader<Value>>,
        stdout: Writer<Value>,
        args: Option<String>,
    ) -> BoxedLocal<Result<()>> {
        Box::pin(async move {
            let Some(stdin) = stdin else {
                return Ok(());
            };
            let ms = parse_count(args.as_deref(), 400) as u64;
            while env.interrupted() == 0 {
                let Some(item) = stdin.read().await else {
                    break;
                };
                stdout.write(item).await?;
                if !env.sleep(ms, Some(&stdout)).await {
                    break;
                }
            }
            Ok(())
        })
    }

    #[shell_command(
        name = "yes",
        usage = "yes [ms] [TEXT=y]",
        description = "Emit text until stopped",
        help = "yes [text=y] - emit TEXT as fast as it is consumed",
        help = "yes ms [text=y] - emit TEXT every MS millisecs",
        help = "  With input, upstream items are emitted instead of TEXT until it runs out"
    )]
    fn cmd_yes(
        env: Rc<ExecEnv>,
        stdin: Option<Reader<Value>>,
        stdout: Writer<Value>,
        args: Option<String>,
    ) -> BoxedLocal<Result<()>> {
        Box::pin(async move {
            let (ms, text) = parse_yes_args(args.as_deref());
            let mut interval = ms.map(|ms| env.interval(ms, Some(&stdout)));
            let mut upstream = stdin;

            while env.interrupted() == 0 && !stdout.is_closed() {
                let from_upstream = match &upstream {
                    Some(reader) => reader.read().await,
                    None => None,
                };
                let item = match from_upstream {
                    Some(item) => item,
                    None => {
                        // exhausted: release it and fall back to the text
                        upstream = None;
                        Value::from(text.as_str())
                    }
                };
                stdout.write(item).await?;
                if let Some(interval) = interval.as_mut() {
                    if !interval.tick().await {
                        break;
                    }
                }
            }
            Ok(())
        })
    }
}

/// `yes [ms] [text]`: a leading number is the interval.
fn parse_yes_args(args: Option<&str>) -> (Option<u64>, String) {
    let args = args.unwrap_or("").trim();
    let (first, rest) = args
        .split_once(char::is_whitespace)
        .map(|(a, b)| (a, b.trim_start()))
        .unwrap_or((args, ""));
    match first.parse::<u64>() {
        Ok(ms) if rest.is_empty() => (Some(ms), "y".to_string()),
        Ok(ms) => (Some(ms), rest.to_string()),
        Err(_) if args.is_empty() => (None, "y".to_string()),
        Err(_) => (None, args.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_yes_args() {
        assert_eq!(parse_yes_args(None), (None, "y".to_string()));
        assert_eq!(parse_yes_args(Some("hi")), (None, "hi".to_string()));
        assert_eq!(parse_yes_args(Some("hi there")), (None, "hi there".to_string()));
        assert_eq!(parse_yes_args(Some("200")), (Some(200), "y".to_string()));
        assert_eq!(parse_yes_args(Some("200 hi")), (Some(200), "hi".to_string()));
    }
}
