//! Command line parsing and validation.
//!
//! A line is a `|`-separated list of stages; each stage is a command name
//! followed by free-form argument text, which the command tokenizes itself.
//! A `|` inside quotes still separates stages.

use std::fmt;

use crate::error::ShellError;

/// One stage of a command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    /// Command name; canonical once the line is validated.
    pub command: String,
    /// Everything after the first whitespace run, if anything.
    pub args: Option<String>,
}

impl Stage {
    pub fn new(command: impl Into<String>, args: Option<&str>) -> Self {
        Self {
            command: command.into(),
            args: args.map(str::to_string),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.args {
            Some(args) => write!(f, "{} {}", self.command, args),
            None => f.write_str(&self.command),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Unparsed,
    Parsed,
    Validated,
    Running,
    Finished,
}

/// Split a line into stages without consulting any registry.
pub fn parse_line(line: &str) -> Vec<Stage> {
    line.trim()
        .split('|')
        .map(str::trim)
        .map(|segment| match segment.split_once(char::is_whitespace) {
            Some((head, rest)) => Stage::new(head, Some(rest.trim_start())),
            None => Stage::new(segment, None),
        })
        .collect()
}

/// A submitted line moving through parse and validation.
#[derive(Debug, Clone)]
pub struct CommandLine {
    line: String,
    stages: Vec<Stage>,
    errors: Vec<ShellError>,
    state: PipelineState,
}

impl CommandLine {
    pub fn new(line: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            stages: Vec::new(),
            errors: Vec::new(),
            state: PipelineState::Unparsed,
        }
    }

    pub fn line(&self) -> &str {
        &self.line
    }

    /// Parse once; later calls return the cached stages.
    pub fn parse(&mut self) -> &[Stage] {
        if self.state == PipelineState::Unparsed {
            self.stages = parse_line(&self.line);
            self.state = PipelineState::Parsed;
        }
        &self.stages
    }

    /// Replace each command with the canonical name `resolve` gives it and
    /// collect the ones it does not know. Returns whether the line may run.
    pub fn validate(&mut self, resolve: impl Fn(&str) -> Option<&'static str>) -> bool {
        self.parse();
        if self.state != PipelineState::Parsed {
            return self.errors.is_empty();
        }
        self.errors.clear();
        for stage in &mut self.stages {
            match resolve(&stage.command) {
                Some(canonical) => stage.command = canonical.to_string(),
                None => self
                    .errors
                    .push(ShellError::UnknownCommand(stage.command.clone())),
            }
        }
        if self.errors.is_empty() {
            self.state = PipelineState::Validated;
        }
        self.errors.is_empty()
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn errors(&self) -> &[ShellError] {
        &self.errors
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Name of the first command, as typed or resolved.
    pub fn head(&self) -> Option<&str> {
        self.stages.first().map(|stage| stage.command.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::commands::Registry;

    fn builtin(registry: &Registry) -> impl Fn(&str) -> Option<&'static str> + '_ {
        |name: &str| registry.lookup(name).map(|spec| spec.name)
    }

    #[test]
    fn test_parse_segments() {
        let stages = parse_line("  echo a b |grep   b| len ");
        assert_eq!(
            stages,
            vec![
                Stage::new("echo", Some("a b")),
                Stage::new("grep", Some("b")),
                Stage::new("len", None),
            ]
        );
    }

    #[test]
    fn test_parse_keeps_inner_spacing() {
        let stages = parse_line("gsub x   y  z");
        assert_eq!(stages[0].args.as_deref(), Some("x   y  z"));
    }

    #[test]
    fn test_quoted_bar_still_splits() {
        let stages = parse_line("echo 'a|b'");
        assert_eq!(stages.len(), 2);
        assert_eq!(stages[1].command, "b'");
    }

    #[test]
    fn test_parse_is_cached() {
        let mut line = CommandLine::new("echo x");
        line.parse();
        assert_eq!(line.state(), PipelineState::Parsed);
        assert_eq!(line.parse().len(), 1);
    }

    #[test]
    fn test_validate_resolves_aliases() {
        let registry = Registry::builtin();
        let mut line = CommandLine::new("echo a | take 1 | chomp");
        assert!(line.validate(builtin(&registry)));
        let names: Vec<_> = line.stages().iter().map(|s| s.command.as_str()).collect();
        assert_eq!(names, vec!["echo", "head", "trim"]);
        assert_eq!(line.state(), PipelineState::Validated);
    }

    #[test]
    fn test_validate_uses_resolver() {
        let mut line = CommandLine::new("ll x | len");
        let resolve = |name: &str| match name {
            "ll" | "len" => Some("len"),
            _ => None,
        };
        assert!(line.validate(resolve));
        assert_eq!(line.head(), Some("len"));
    }

    #[test]
    fn test_validate_accumulates_unknown() {
        let registry = Registry::builtin();
        let mut line = CommandLine::new("frob | echo | blorp x");
        assert!(!line.validate(builtin(&registry)));
        let messages: Vec<String> = line.errors().iter().map(|e| e.to_string()).collect();
        assert_eq!(
            messages,
            vec!["Unknown command: frob", "Unknown command: blorp"]
        );
        assert_eq!(line.state(), PipelineState::Parsed);
    }
}
