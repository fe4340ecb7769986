//! Transcoder invocation for the final audiobook container.

pub mod ffmpeg;

pub use ffmpeg::{build_mux_command, run_mux, AudioMode, MuxError, MuxParams};
