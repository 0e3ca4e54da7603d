//! Terminal session
//!
//! Wires a [`ScreenBuffer`] to a [`PtyChannel`]: child output drives the
//! screen model, and responses the model emits (cursor reports, keyboard
//! input) flow back to the child's stdin. This is the main integration
//! point between the platform backends and the platform-independent state.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::buffer::{RenderSnapshot, ScreenBuffer, ScrollCallback, TitleCallback};
use crate::pty::{PlatformPtyChannel, PtyChannel, PtyResult, TerminatedCallback};

/// A live terminal: screen model plus child process.
///
/// The screen buffer is shared behind a mutex; callbacks from the pty
/// reader thread and calls from the owning thread both take the same lock,
/// so every byte stream mutation is serialized.
pub struct TerminalSession {
    buffer: Arc<Mutex<ScreenBuffer>>,
    channel: PlatformPtyChannel,
}

impl TerminalSession {
    /// Create a session for `cmd` with the given viewport size. The child
    /// is not started until [`spawn`](Self::spawn).
    pub fn new(cmd: impl Into<String>, cols: u16, rows: u16) -> Self {
        let buffer = Arc::new(Mutex::new(ScreenBuffer::new(cols as usize, rows as usize)));
        let channel = PlatformPtyChannel::new(cmd, cols, rows);

        // Responses the screen model produces (e.g. cursor position
        // reports) go straight to the child.
        let stdin_channel = channel.clone();
        buffer
            .lock()
            .on_stdin(Box::new(move |bytes| stdin_channel.write(bytes)));

        // Geometry changes propagate to the child as well.
        let resize_channel = channel.clone();
        buffer.lock().on_resize(Box::new(move |cols, rows| {
            resize_channel.resize(cols.min(u16::MAX as usize) as u16, rows.min(u16::MAX as usize) as u16);
        }));

        Self { buffer, channel }
    }

    /// Start the child process. Child output begins flowing into the
    /// screen buffer from the reader thread.
    pub fn spawn(&self) -> PtyResult<()> {
        let buffer = Arc::clone(&self.buffer);
        self.channel
            .on_stdout(Box::new(move |bytes| buffer.lock().stdout(bytes)));
        self.channel.spawn()
    }

    /// Send user input (key presses, pastes) to the child.
    pub fn input(&self, bytes: &[u8]) {
        self.channel.write(bytes);
    }

    /// Resize the viewport; the new size reaches the child through the
    /// buffer's resize callback.
    pub fn resize(&self, cols: u16, rows: u16) {
        self.buffer.lock().resize(cols as usize, rows as usize);
    }

    /// Capture the current viewport.
    pub fn snapshot(&self) -> RenderSnapshot {
        self.buffer.lock().snapshot()
    }

    /// Scroll the viewport up (towards history) by `lines`.
    pub fn scroll_up(&self, lines: usize) {
        self.buffer.lock().scroll_up(lines);
    }

    /// Scroll the viewport down (towards the live rows) by `lines`.
    pub fn scroll_down(&self, lines: usize) {
        self.buffer.lock().scroll_down(lines);
    }

    /// Register a callback for window title changes (OSC 0/1/2).
    pub fn on_title(&self, cb: TitleCallback) {
        self.buffer.lock().on_title(cb);
    }

    /// Register a callback for viewport scroll changes.
    pub fn on_scroll(&self, cb: ScrollCallback) {
        self.buffer.lock().on_scroll(cb);
    }

    /// Register a callback for channel shutdown. Fires at most once.
    pub fn on_terminated(&self, cb: TerminatedCallback) {
        self.channel.on_terminated(cb);
    }

    /// Whether the channel is still pumping output.
    pub fn is_running(&self) -> bool {
        self.channel.is_running()
    }

    /// Request child shutdown. Graceful first, forceful after a grace
    /// period.
    pub fn terminate(&self) {
        self.channel.terminate();
    }

    /// Direct access to the screen buffer, for callers that need more
    /// than snapshots.
    pub fn buffer(&self) -> &Arc<Mutex<ScreenBuffer>> {
        &self.buffer
    }
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn wait_until(deadline: Duration, mut cond: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        false
    }

    #[test]
    fn test_session_echo_reaches_screen() {
        let session = TerminalSession::new("/bin/cat", 40, 10);
        session.spawn().expect("spawn failed");

        session.input(b"hello session\n");
        assert!(
            wait_until(Duration::from_secs(2), || {
                session.snapshot().to_text().contains("hello session")
            }),
            "child output never reached the screen"
        );

        session.terminate();
        assert!(!session.is_running());
    }

    #[test]
    fn test_session_terminated_callback() {
        let session = TerminalSession::new("/bin/echo done", 40, 10);
        let fired: Arc<Mutex<bool>> = Default::default();
        let sink = fired.clone();
        session.on_terminated(Box::new(move || *sink.lock() = true));
        session.spawn().expect("spawn failed");

        assert!(
            wait_until(Duration::from_secs(3), || *fired.lock()),
            "terminated callback did not fire"
        );
    }

    #[test]
    fn test_session_resize_updates_buffer() {
        let session = TerminalSession::new("/bin/cat", 40, 10);
        session.spawn().expect("spawn failed");
        session.resize(60, 20);
        let snap = session.snapshot();
        assert_eq!(snap.cols, 60);
        assert_eq!(snap.viewport_rows, 20);
        session.terminate();
    }
}
