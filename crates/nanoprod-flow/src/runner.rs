//! External tool invocation seam.
//!
//! Every external engine (conversion, merge, filter) goes through the
//! [`ToolRunner`] trait, so the pipeline's control flow can be exercised in
//! tests without spawning any real subprocess. [`ProcessRunner`] is the
//! production implementation; [`ScriptedRunner`] is the in-memory test
//! double that records invocations and runs caller-provided handlers.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{Error, Result};

/// Maximum stderr bytes kept when reporting a failed invocation.
const STDERR_TAIL_BYTES: usize = 4096;

/// One external command: program, arguments, and optional working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    /// Program name or path.
    pub program: String,
    /// Arguments in order.
    pub args: Vec<String>,
    /// Working directory for the command, if any.
    pub current_dir: Option<PathBuf>,
}

impl ToolInvocation {
    /// Creates an invocation of `program` with no arguments.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends a sequence of arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the working directory.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Renders the command line for logging.
    #[must_use]
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    /// Returns the value following `flag`, if present.
    #[must_use]
    pub fn flag_value(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|arg| arg == flag)
            .and_then(|idx| self.args.get(idx + 1))
            .map(String::as_str)
    }

    /// Returns true if the argument list contains `flag`.
    #[must_use]
    pub fn has_flag(&self, flag: &str) -> bool {
        self.args.iter().any(|arg| arg == flag)
    }
}

/// Trait for external tool execution.
///
/// Implementations run the invocation to completion and map a non-zero exit
/// to [`Error::Subprocess`]. There is no internal retry.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Runs one invocation to completion.
    ///
    /// # Errors
    /// Returns `Subprocess` if the tool exits non-zero, `Io` if it cannot be
    /// spawned.
    async fn run(&self, invocation: &ToolInvocation) -> Result<()>;
}

/// Production runner backed by real subprocesses.
///
/// Children are killed if their future is dropped, so a fail-fast driver
/// does not leave stray engines running.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(&self, invocation: &ToolInvocation) -> Result<()> {
        tracing::info!(command = %invocation.command_line(), "running external tool");

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &invocation.current_dir {
            command.current_dir(dir);
        }

        let output = command.output().await?;
        if output.status.success() {
            tracing::debug!(
                program = %invocation.program,
                stdout_bytes = output.stdout.len(),
                "external tool finished"
            );
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail_start = stderr.len().saturating_sub(STDERR_TAIL_BYTES);
        // Keep the tail: engines print the actual failure last.
        let tail = stderr
            .char_indices()
            .map(|(idx, _)| idx)
            .find(|idx| *idx >= tail_start)
            .map_or("", |idx| &stderr[idx..]);
        Err(Error::subprocess(
            &invocation.program,
            output.status.code(),
            tail.trim_end(),
        ))
    }
}

/// Handler invoked by [`ScriptedRunner`] for one program.
pub type ScriptedHandler = dyn Fn(&ToolInvocation) -> Result<()> + Send + Sync;

/// In-memory runner for testing and development.
///
/// Records every invocation in order and dispatches to per-program handlers
/// registered with [`ScriptedRunner::on`]. Programs without a handler
/// succeed without side effects.
#[derive(Default)]
pub struct ScriptedRunner {
    invocations: Mutex<Vec<ToolInvocation>>,
    handlers: Mutex<HashMap<String, Box<ScriptedHandler>>>,
}

impl ScriptedRunner {
    /// Creates a runner with no handlers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for the given program name.
    ///
    /// A later registration for the same program replaces the earlier one.
    ///
    /// # Panics
    /// Panics if the handler table lock is poisoned.
    pub fn on<F>(&self, program: impl Into<String>, handler: F)
    where
        F: Fn(&ToolInvocation) -> Result<()> + Send + Sync + 'static,
    {
        self.handlers
            .lock()
            .expect("handler lock poisoned")
            .insert(program.into(), Box::new(handler));
    }

    /// Returns every recorded invocation, in execution order.
    ///
    /// # Panics
    /// Panics if the invocation log lock is poisoned.
    #[must_use]
    pub fn invocations(&self) -> Vec<ToolInvocation> {
        self.invocations
            .lock()
            .expect("invocation lock poisoned")
            .clone()
    }

    /// Returns the recorded invocations of one program, in execution order.
    #[must_use]
    pub fn invocations_of(&self, program: &str) -> Vec<ToolInvocation> {
        self.invocations()
            .into_iter()
            .filter(|invocation| invocation.program == program)
            .collect()
    }
}

impl std::fmt::Debug for ScriptedRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedRunner")
            .field("invocations", &self.invocations)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ToolRunner for ScriptedRunner {
    async fn run(&self, invocation: &ToolInvocation) -> Result<()> {
        self.invocations
            .lock()
            .expect("invocation lock poisoned")
            .push(invocation.clone());

        let handlers = self.handlers.lock().expect("handler lock poisoned");
        match handlers.get(&invocation.program) {
            Some(handler) => handler(invocation),
            None => Ok(()),
        }
    }
}
