pub mod reader;
pub mod session;

pub use session::{RenderSink, Session};

use std::collections::HashMap;

use portable_pty::{native_pty_system, CommandBuilder, PtySize};

use crate::error::{Error, Result};

/// Result of opening a PTY and spawning the child: the session plus the
/// reader half, which must be handed to [`Session::start`].
pub struct SpawnResult {
    pub session: Session,
    pub reader: Box<dyn std::io::Read + Send>,
}

/// How to start the child process.
#[derive(Debug, Clone)]
pub struct SpawnOptions {
    pub command: String,
    pub args: Vec<String>,
    pub cwd: Option<String>,
    pub env: HashMap<String, String>,
    pub rows: u16,
    pub cols: u16,
    pub pixel_width: u16,
    pub pixel_height: u16,
}

impl SpawnOptions {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            cwd: None,
            env: HashMap::new(),
            rows: 24,
            cols: 80,
            pixel_width: 0,
            pixel_height: 0,
        }
    }
}

/// Open a PTY, spawn the child attached to its slave side, and build a
/// session around the master side.
pub fn spawn(options: &SpawnOptions) -> Result<SpawnResult> {
    let pty_system = native_pty_system();
    let pair = pty_system
        .openpty(PtySize {
            rows: options.rows,
            cols: options.cols,
            pixel_width: options.pixel_width,
            pixel_height: options.pixel_height,
        })
        .map_err(|e| Error::Pty(e.to_string()))?;

    let mut cmd = CommandBuilder::new(&options.command);
    for arg in &options.args {
        cmd.arg(arg);
    }
    if let Some(dir) = &options.cwd {
        cmd.cwd(dir);
    }
    cmd.env("TERM", "xterm-256color");
    cmd.env("COLORTERM", "truecolor");
    for (key, value) in &options.env {
        let key = key.trim();
        if !key.is_empty() {
            cmd.env(key, value);
        }
    }

    let child = pair
        .slave
        .spawn_command(cmd)
        .map_err(|e| Error::Spawn(e.to_string()))?;
    let reader = pair
        .master
        .try_clone_reader()
        .map_err(|e| Error::Pty(e.to_string()))?;
    let writer = pair
        .master
        .take_writer()
        .map_err(|e| Error::Pty(e.to_string()))?;

    let session = Session::new(
        pair.master,
        child,
        writer,
        options.rows,
        options.cols,
        options.pixel_width,
        options.pixel_height,
    );
    Ok(SpawnResult { session, reader })
}
