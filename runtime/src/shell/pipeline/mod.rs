//! Pipeline wiring: one pipe per stage boundary, one task per stage.
//!
//! Stage `i` writes into pipe `i` and reads from pipe `i - 1`. The wiring
//! loop never awaits a stage; it spawns each one on the local executor and
//! hands back a reader on the last pipe. The pipeline is finished once that
//! pipe's write side closes.

use std::cell::Cell;
use std::rc::Rc;

use futures::executor::LocalPool;
use futures::task::{LocalSpawn, LocalSpawnExt};

use super::commands::{forward, CommandSpec};
use super::env::{ExecEnv, HARD_INTERRUPT};
use super::parser::{CommandLine, PipelineState, Stage};
use super::value::Value;
use crate::error::{Result, ShellError};
use crate::io::{Reader, Writer};

/// A command line on its way from text to a running set of stages.
#[derive(Debug)]
pub struct Pipeline {
    line: CommandLine,
    state: Rc<Cell<PipelineState>>,
}

impl Pipeline {
    pub fn new(line: impl Into<String>) -> Self {
        Self {
            line: CommandLine::new(line),
            state: Rc::new(Cell::new(PipelineState::Unparsed)),
        }
    }

    pub fn command_line(&self) -> &CommandLine {
        &self.line
    }

    pub fn stages(&self) -> &[Stage] {
        self.line.stages()
    }

    pub fn state(&self) -> PipelineState {
        self.state.get()
    }

    pub fn is_finished(&self) -> bool {
        self.state() == PipelineState::Finished
    }

    /// Validate against the context's registry and user aliases. On failure
    /// every unknown command is reported and nothing has been started.
    pub fn validate(&mut self, env: &ExecEnv) -> std::result::Result<(), Vec<ShellError>> {
        let valid = self.line.validate(|name| env.resolve(name));
        self.state.set(self.line.state());
        if valid {
            Ok(())
        } else {
            Err(self.line.errors().to_vec())
        }
    }

    /// Start every stage on `spawner` and return a reader on the last pipe.
    ///
    /// If a stage cannot be started the remaining ones are skipped and the
    /// context is hard-interrupted so the pipes already created are closed.
    pub fn execute(
        &mut self,
        env: &Rc<ExecEnv>,
        spawner: &impl LocalSpawn,
    ) -> Result<Reader<Value>> {
        if self.state() != PipelineState::Validated {
            self.validate(env).map_err(|mut errors| errors.remove(0))?;
        }
        let stages = self.line.stages().to_vec();
        env.log().debug(
            "exec",
            format_args!("executing {} stage(s): {}", stages.len(), self.line.line()),
        );
        self.state.set(PipelineState::Running);

        let mut previous: Option<Reader<Value>> = None;
        let mut last = None;
        for stage in &stages {
            let spec = *env
                .command(&stage.command)
                .ok_or_else(|| ShellError::UnknownCommand(stage.command.clone()))?;
            let pipe = env.pipe(spec.name);
            let task = run_stage(
                Rc::clone(env),
                spec,
                previous.take(),
                pipe.writer(),
                stage.args.clone(),
            );
            if let Err(err) = spawner.spawn_local(task) {
                let err = ShellError::from(err);
                env.error(err.to_string());
                env.interrupt_hard();
                return Err(err);
            }
            previous = Some(pipe.reader());
            last = Some(pipe);
        }

        let (Some(reader), Some(pipe)) = (previous, last) else {
            self.state.set(PipelineState::Finished);
            return Err(ShellError::InvalidArgument("empty pipeline".to_string()));
        };
        let state = Rc::clone(&self.state);
        let log = env.log().clone();
        pipe.on_close_write(move || {
            log.debug("exec", format_args!("pipeline finished"));
            state.set(PipelineState::Finished);
        });
        Ok(reader)
    }
}

/// Run one stage to completion, reporting its error to the context.
async fn run_stage(
    env: Rc<ExecEnv>,
    spec: CommandSpec,
    stdin: Option<Reader<Value>>,
    stdout: Writer<Value>,
    args: Option<String>,
) {
    env.log()
        .debug("exec", format_args!("start {} args={:?}", spec.name, args));
    let result = match spec.run {
        Some(run) => run(Rc::clone(&env), stdin, stdout, args).await,
        None => forward(stdin, stdout).await,
    };
    match result {
        Ok(()) => env.log().debug("exec", format_args!("{} done", spec.name)),
        Err(err) if err.is_broken_pipe() || env.interrupted() >= HARD_INTERRUPT => {
            env.log()
                .debug("exec", format_args!("{} stopped: {}", spec.name, err));
        }
        Err(err) => {
            env.log()
                .warn("exec", format_args!("{} failed: {}", spec.name, err));
            env.error(err.to_string());
        }
    }
}

/// Output and errors of a line run by [`run_line`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunResult {
    pub output: Vec<Value>,
    pub errors: Vec<String>,
}

/// Validate and run `line` on a private executor until every stage is done.
pub fn run_line(env: &Rc<ExecEnv>, line: &str) -> RunResult {
    let mut pipeline = Pipeline::new(line);
    if let Err(errors) = pipeline.validate(env) {
        return RunResult {
            output: Vec::new(),
            errors: errors.iter().map(ToString::to_string).collect(),
        };
    }
    let mut pool = LocalPool::new();
    let output = match pipeline.execute(env, &pool.spawner()) {
        Ok(reader) => pool.run_until(async move { reader.read_all().await }),
        Err(_) => Vec::new(),
    };
    pool.run_until_stalled();
    env.teardown();
    pool.run_until_stalled();
    RunResult {
        output,
        errors: env.take_errors(),
    }
}
