//! PTY process channel
//!
//! Spawns a child process behind a pseudoterminal and pumps its output to a
//! callback from a background reader thread. The [`PtyChannel`] trait is the
//! platform-independent surface; `unix` implements it over POSIX ptys and
//! `windows` over ConPTY.

#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

#[cfg(unix)]
pub use unix::UnixPtyChannel;
#[cfg(windows)]
pub use windows::ConptyChannel;

/// The backend for the current platform.
#[cfg(unix)]
pub type PlatformPtyChannel = UnixPtyChannel;
#[cfg(windows)]
pub type PlatformPtyChannel = ConptyChannel;

/// Bytes the child process wrote to its terminal.
pub type StdoutCallback = Box<dyn FnMut(&[u8]) + Send>;
/// The channel shut down: child exit, I/O failure, or explicit terminate.
/// Guaranteed to fire at most once per spawn.
pub type TerminatedCallback = Box<dyn FnMut() + Send>;

/// Error type for PTY operations
#[derive(Debug, thiserror::Error)]
pub enum PtyError {
    #[cfg(unix)]
    #[error("Failed to open PTY master: {0}")]
    OpenMaster(#[source] nix::Error),

    #[cfg(unix)]
    #[error("Failed to grant PTY access: {0}")]
    GrantPty(#[source] nix::Error),

    #[cfg(unix)]
    #[error("Failed to unlock PTY: {0}")]
    UnlockPty(#[source] nix::Error),

    #[cfg(unix)]
    #[error("Failed to get PTY slave name: {0}")]
    PtsName(#[source] nix::Error),

    #[cfg(unix)]
    #[error("Failed to fork: {0}")]
    Fork(#[source] nix::Error),

    #[cfg(unix)]
    #[error("Failed to set window size: {0}")]
    SetWinsize(#[source] nix::Error),

    #[cfg(unix)]
    #[error("Failed to write to PTY: {0}")]
    Write(#[source] nix::Error),

    #[cfg(unix)]
    #[error("Failed to set non-blocking mode: {0}")]
    SetNonBlocking(#[source] nix::Error),

    #[error("Empty command line")]
    EmptyCommand,

    #[error("Channel already spawned")]
    AlreadySpawned,

    #[error("Failed to spawn child process: {0}")]
    Spawn(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for PTY operations
pub type PtyResult<T> = Result<T, PtyError>;

/// Window size for PTY
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSize {
    pub rows: u16,
    pub cols: u16,
    pub pixel_width: u16,
    pub pixel_height: u16,
}

impl WindowSize {
    /// Create a new window size with just rows and columns
    pub fn new(cols: u16, rows: u16) -> Self {
        Self {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        }
    }
}

impl Default for WindowSize {
    fn default() -> Self {
        Self::new(80, 24)
    }
}

/// A pty-backed child process with callback-driven I/O.
///
/// Lifecycle: construct, register callbacks, `spawn`, then `write`/`resize`
/// until the terminated callback fires. `write` and `resize` never return
/// errors; a failing channel marks itself not running and fires the
/// terminated callback instead.
pub trait PtyChannel: Send + Sync {
    /// Start the child process and the background reader thread.
    fn spawn(&self) -> PtyResult<()>;

    /// Send bytes to the child's stdin. No-op when not running.
    fn write(&self, bytes: &[u8]);

    /// Propagate a new terminal size to the child.
    fn resize(&self, cols: u16, rows: u16);

    /// Request shutdown: graceful first, forceful after a grace period.
    /// Idempotent.
    fn terminate(&self);

    /// Whether the channel considers itself operational.
    fn is_running(&self) -> bool;

    /// Poll the child process state directly.
    fn is_alive(&self) -> bool;

    fn on_stdout(&self, cb: StdoutCallback);

    fn on_terminated(&self, cb: TerminatedCallback);
}
