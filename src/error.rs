use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("PTY error: {0}")]
    Pty(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to spawn child process: {0}")]
    Spawn(String),

    #[error("session already closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, Error>;
