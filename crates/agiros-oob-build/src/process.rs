//! Subprocess execution with streamed output and prompt answering

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use agiros_oob_config::Config;
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{BuildError, Result};

/// A program invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program name or path
    pub program: String,
    /// Arguments
    pub args: Vec<String>,
    /// Working directory
    pub cwd: PathBuf,
    /// Variables added to the inherited environment
    pub env: BTreeMap<String, String>,
}

impl CommandSpec {
    /// Command without arguments
    pub fn new(program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self { program: program.into(), args: Vec::new(), cwd: cwd.into(), env: BTreeMap::new() }
    }

    /// Split a base command line such as `python3 -m bloom.commands.generate`
    /// into program and leading arguments
    pub fn from_command_line(line: &str, cwd: impl Into<PathBuf>) -> Option<Self> {
        let mut words = line.split_whitespace().map(str::to_string);
        let program = words.next()?;
        Some(Self::new(program, cwd).args(words))
    }

    /// Append one argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Shell-like rendering for display
    pub fn command_line(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|word| quote(word))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word.chars().all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%{}".contains(c));
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

/// Result of a finished invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    /// Exit code, `-1` when terminated by a signal
    pub exit_code: i32,
    /// Output lines, kept only for non-zero exits
    pub captured: Option<Vec<String>>,
}

impl Invocation {
    /// Zero exit
    pub fn success() -> Self {
        Self { exit_code: 0, captured: None }
    }

    /// Non-zero exit with its output
    pub fn failure(exit_code: i32, captured: Vec<String>) -> Self {
        Self { exit_code, captured: Some(captured) }
    }

    /// Whether the exit code is zero
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }

    /// Captured lines containing `marker`
    pub fn lines_containing(&self, marker: &str) -> Vec<String> {
        self.captured
            .iter()
            .flatten()
            .filter(|line| line.contains(marker))
            .cloned()
            .collect()
    }
}

/// Receives subprocess output as it is produced
pub trait OutputObserver: Send + Sync {
    /// A command is about to run, or would run in dry-run mode
    fn on_command(&self, spec: &CommandSpec, dry_run: bool);

    /// One line of stdout or stderr
    fn on_line(&self, line: &str);
}

/// Inspects output lines and may answer on stdin
pub trait LineHook: Send + Sync {
    /// Text to write to stdin in reaction to `line`
    fn respond(&self, line: &str) -> Option<String>;
}

/// Answers confirmation prompts with a fixed response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptResponder {
    marker: String,
    response: String,
}

impl PromptResponder {
    /// Respond with `response` to lines containing `marker`
    pub fn new(marker: impl Into<String>, response: impl Into<String>) -> Self {
        Self { marker: marker.into(), response: response.into() }
    }

    /// Marker and response from configuration
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.prompt_marker.clone(), config.prompt_response.clone())
    }
}

impl LineHook for PromptResponder {
    fn respond(&self, line: &str) -> Option<String> {
        if !self.marker.is_empty() && line.contains(&self.marker) {
            Some(format!("{}\n", self.response))
        } else {
            None
        }
    }
}

/// Runs commands to completion
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run one command, streaming its output to `observer`
    ///
    /// A non-zero exit is not an error; failing to start the program is.
    async fn invoke(&self, spec: &CommandSpec, observer: &dyn OutputObserver)
        -> Result<Invocation>;
}

/// Runs real subprocesses through tokio
#[derive(Clone)]
pub struct SystemRunner {
    hook: Option<Arc<dyn LineHook>>,
    dry_run: bool,
}

impl SystemRunner {
    /// Runner without a line hook
    pub fn new(dry_run: bool) -> Self {
        Self { hook: None, dry_run }
    }

    /// Runner answering prompts as configured
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.dry_run).with_hook(Arc::new(PromptResponder::from_config(config)))
    }

    /// Attach a line hook
    pub fn with_hook(mut self, hook: Arc<dyn LineHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Whether commands are only echoed
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }
}

impl std::fmt::Debug for SystemRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemRunner")
            .field("hook", &self.hook.is_some())
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

/// Forward lines of one stream into the shared channel
///
/// Reads raw bytes so that non UTF-8 output never stalls the pipe.
fn forward_lines<R>(reader: R, tx: mpsc::UnboundedSender<String>) -> tokio::task::JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    let line = line.trim_end_matches(|c| c == '\n' || c == '\r');
                    if tx.send(line.to_string()).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!("Output stream closed: {}", e);
                    break;
                }
            }
        }
    })
}

fn check_cwd(cwd: &Path) -> Result<()> {
    if cwd.is_dir() {
        Ok(())
    } else {
        Err(BuildError::environment(format!("working directory {} does not exist", cwd.display())))
    }
}

#[async_trait]
impl ProcessRunner for SystemRunner {
    async fn invoke(
        &self,
        spec: &CommandSpec,
        observer: &dyn OutputObserver,
    ) -> Result<Invocation> {
        observer.on_command(spec, self.dry_run);
        if self.dry_run {
            return Ok(Invocation::success());
        }
        check_cwd(&spec.cwd)?;
        debug!("Spawning {} in {}", spec.command_line(), spec.cwd.display());

        let mut child = Command::new(&spec.program)
            .args(&spec.args)
            .current_dir(&spec.cwd)
            .envs(&spec.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| BuildError::Spawn { program: spec.program.clone(), source })?;

        let mut stdin = child.stdin.take();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(forward_lines(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(forward_lines(stderr, tx.clone()));
        }
        drop(tx);

        let mut captured = Vec::new();
        while let Some(line) = rx.recv().await {
            observer.on_line(&line);
            if let (Some(hook), Some(pipe)) = (self.hook.as_ref(), stdin.as_mut()) {
                if let Some(answer) = hook.respond(&line) {
                    debug!("Answering prompt with {:?}", answer.trim_end());
                    let written = pipe.write_all(answer.as_bytes()).await;
                    if let Err(e) = written.and(pipe.flush().await) {
                        warn!("Cannot answer prompt of {}: {}", spec.program, e);
                    }
                }
            }
            captured.push(line);
        }
        drop(stdin);
        for reader in readers {
            if let Err(e) = reader.await {
                warn!("Output reader of {} ended abnormally: {}", spec.program, e);
            }
        }

        let status = child.wait().await?;
        let exit_code = status.code().unwrap_or(-1);
        debug!("{} exited with {}", spec.program, exit_code);
        if exit_code == 0 {
            Ok(Invocation::success())
        } else {
            Ok(Invocation::failure(exit_code, captured))
        }
    }
}
