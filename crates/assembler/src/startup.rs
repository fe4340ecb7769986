//! Startup checks for the M4B assembler
//!
//! Verifies that the configured ffmpeg and ffprobe binaries run before any
//! job is started, so a missing toolchain fails once instead of per job.

use thiserror::Error;
use tracing::info;

use crate::tool::Toolchain;

/// Error types for startup checks
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("ffmpeg not available: {0}")]
    FfmpegUnavailable(String),

    #[error("ffprobe not available: {0}")]
    FfprobeUnavailable(String),
}

/// Parse the major version from `<tool> -version` output.
///
/// Handles plain ("ffmpeg version 6.1.1 ...") and n-prefixed
/// ("ffmpeg version n7.0-...") release strings. Git builds
/// ("N-112345-g...") have no major version and yield `None`.
pub fn parse_tool_version(version_output: &str, tool: &str) -> Option<u32> {
    let needle = format!("{} version", tool);
    let version_line = version_output
        .lines()
        .map(str::to_lowercase)
        .find(|line| line.contains(&needle))?;

    let version_part = version_line
        .split(needle.as_str())
        .nth(1)?
        .split_whitespace()
        .next()?
        .to_string();

    let version_str = version_part.strip_prefix('n').unwrap_or(version_part.as_str());
    let major_str = version_str.split(|c| c == '.' || c == '-').next()?;

    major_str.parse().ok()
}

pub fn parse_ffmpeg_version(version_output: &str) -> Option<u32> {
    parse_tool_version(version_output, "ffmpeg")
}

/// Run `<tool> -version` and return its first output line.
fn probe_version(
    tools: &Toolchain,
    mut cmd: std::process::Command,
    program: &str,
) -> Result<String, String> {
    cmd.arg("-version");
    let output = tools
        .run(&mut cmd)
        .map_err(|e| format!("{} -version failed; is it installed and in PATH? Error: {}", program, e))?;

    if !output.success() {
        return Err(format!(
            "{} -version exited with {:?}",
            program, output.code
        ));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout.lines().next().unwrap_or("").trim().to_string())
}

/// Check that ffmpeg runs, returning its version banner.
pub fn check_ffmpeg_available(tools: &Toolchain) -> Result<String, StartupError> {
    let program = tools.ffmpeg.display().to_string();
    let banner = probe_version(tools, std::process::Command::new(&tools.ffmpeg), &program)
        .map_err(StartupError::FfmpegUnavailable)?;
    if let Some(major) = parse_ffmpeg_version(&banner) {
        info!(major, "ffmpeg found");
    }
    Ok(banner)
}

/// Check that ffprobe runs, returning its version banner.
pub fn check_ffprobe_available(tools: &Toolchain) -> Result<String, StartupError> {
    let program = tools.ffprobe.display().to_string();
    probe_version(tools, tools.ffprobe_command(), &program).map_err(StartupError::FfprobeUnavailable)
}

/// Run all startup checks in order
///
/// 1. ffmpeg availability
/// 2. ffprobe availability
pub fn run_startup_checks(tools: &Toolchain) -> Result<(), StartupError> {
    check_ffmpeg_available(tools)?;
    check_ffprobe_available(tools)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::testing::{failed, ok, toolchain, FakeRunner};
    use proptest::prelude::*;

    #[test]
    fn test_parse_standard_version() {
        let output = "ffmpeg version 6.1.1 Copyright (c) 2000-2023 the FFmpeg developers\nbuilt with gcc 13";
        assert_eq!(parse_ffmpeg_version(output), Some(6));
    }

    #[test]
    fn test_parse_n_prefixed_version() {
        let output = "ffmpeg version n7.0-2-gabcdef Copyright (c) 2000-2024";
        assert_eq!(parse_ffmpeg_version(output), Some(7));
    }

    #[test]
    fn test_parse_git_build_has_no_major() {
        let output = "ffmpeg version N-112345-g1234567 Copyright (c) 2000-2024";
        assert_eq!(parse_ffmpeg_version(output), None);
    }

    #[test]
    fn test_parse_ffprobe_version() {
        let output = "ffprobe version 5.1.4-0+deb12u1 Copyright (c) 2007-2023";
        assert_eq!(parse_tool_version(output, "ffprobe"), Some(5));
        assert_eq!(parse_ffmpeg_version(output), None);
    }

    #[test]
    fn test_parse_garbage() {
        assert_eq!(parse_ffmpeg_version(""), None);
        assert_eq!(parse_ffmpeg_version("command not found"), None);
    }

    #[test]
    fn test_startup_checks_pass() {
        let runner = FakeRunner::new(|program, _| {
            ok(&format!("{} version 6.1 Copyright", program))
        });
        let tools = toolchain(runner.clone());

        run_startup_checks(&tools).unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], ("ffmpeg".to_string(), vec!["-version".to_string()]));
        assert_eq!(calls[1], ("ffprobe".to_string(), vec!["-version".to_string()]));
        assert_eq!(
            check_ffmpeg_available(&tools).unwrap(),
            "ffmpeg version 6.1 Copyright"
        );
    }

    #[test]
    fn test_missing_ffprobe_is_reported() {
        let tools = toolchain(FakeRunner::new(|program, _| {
            if program == "ffprobe" {
                failed(127, "not found")
            } else {
                ok("ffmpeg version 6.1")
            }
        }));

        let err = run_startup_checks(&tools).unwrap_err();
        assert!(matches!(err, StartupError::FfprobeUnavailable(_)));
    }

    #[test]
    fn test_missing_binary_is_reported() {
        let tools = Toolchain::new("/nonexistent/ffmpeg-binary", "/nonexistent/ffprobe-binary");
        let err = check_ffmpeg_available(&tools).unwrap_err();
        match err {
            StartupError::FfmpegUnavailable(msg) => assert!(msg.contains("/nonexistent/ffmpeg-binary")),
            other => panic!("unexpected error: {}", other),
        }
    }

    // Any release version string, with or without the `n` prefix, parses to
    // its major number.
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_version_parsing(
            major in 0u32..100,
            minor in 0u32..100,
            n_prefix in any::<bool>(),
            suffix in "[a-z0-9+~]{0,12}",
        ) {
            let prefix = if n_prefix { "n" } else { "" };
            let output = format!(
                "ffmpeg version {}{}.{}-{} Copyright (c) 2000-2024\nconfiguration: --enable-gpl",
                prefix, major, minor, suffix
            );
            prop_assert_eq!(parse_ffmpeg_version(&output), Some(major));
        }
    }
}
