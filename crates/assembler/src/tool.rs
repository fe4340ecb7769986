//! External tool execution.
//!
//! Every prober, extractor and transcoder invocation goes through a
//! [`CommandRunner`], always as an argument vector with no shell in between.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

use crate::config::ToolsConfig;

/// Number of trailing stderr lines kept in error messages.
const STDERR_TAIL_LINES: usize = 12;

/// Output captured from a finished external process.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    /// Exit code, `None` if the process was terminated by a signal.
    pub code: Option<i32>,
    /// Captured standard output.
    pub stdout: Vec<u8>,
    /// Captured standard error (lossy UTF-8).
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Last few lines of stderr, which is where ffmpeg puts the actual reason.
    pub fn stderr_tail(&self) -> String {
        let lines: Vec<&str> = self
            .stderr
            .lines()
            .filter(|l| !l.trim().is_empty())
            .collect();
        let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
        lines[start..].join("\n")
    }
}

/// Runs a fully built command to completion.
pub trait CommandRunner: Send + Sync {
    fn run(&self, cmd: &mut Command) -> io::Result<ToolOutput>;
}

/// Spawns real processes with stdin closed and output captured.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, cmd: &mut Command) -> io::Result<ToolOutput> {
        let output = cmd.stdin(Stdio::null()).output()?;
        Ok(ToolOutput {
            code: output.status.code(),
            stdout: output.stdout,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Program locations plus the runner that executes them.
#[derive(Clone)]
pub struct Toolchain {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    runner: Arc<dyn CommandRunner>,
}

impl std::fmt::Debug for Toolchain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Toolchain")
            .field("ffmpeg", &self.ffmpeg)
            .field("ffprobe", &self.ffprobe)
            .finish_non_exhaustive()
    }
}

impl Toolchain {
    /// Toolchain backed by real processes.
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self::with_runner(ffmpeg, ffprobe, Arc::new(SystemRunner))
    }

    pub fn with_runner(
        ffmpeg: impl Into<PathBuf>,
        ffprobe: impl Into<PathBuf>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
            runner,
        }
    }

    pub fn from_config(tools: &ToolsConfig) -> Self {
        Self::new(&tools.ffmpeg, &tools.ffprobe)
    }

    /// Fresh ffmpeg command with the flags every invocation shares.
    pub fn ffmpeg_command(&self) -> Command {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-hide_banner", "-nostdin", "-y"]);
        cmd
    }

    pub fn ffprobe_command(&self) -> Command {
        Command::new(&self.ffprobe)
    }

    pub fn run(&self, cmd: &mut Command) -> io::Result<ToolOutput> {
        self.runner.run(cmd)
    }
}

/// Display helper for log lines mentioning a path.
pub(crate) fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
