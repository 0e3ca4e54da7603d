//! POSIX PTY backend
//!
//! Implements PTY creation and child process management using POSIX APIs.
//! The low-level [`Pty`] owns the master fd and the child pid; the
//! [`UnixPtyChannel`] wraps it with a poll-driven reader thread, callback
//! delivery, and graceful termination.

use std::ffi::CString;
use std::os::fd::BorrowedFd;
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nix::errno::Errno;
use nix::fcntl::{fcntl, open, FcntlArg, OFlag};
use nix::libc::{self, STDERR_FILENO, STDIN_FILENO, STDOUT_FILENO};
use nix::poll::{poll, PollFd, PollFlags};
use nix::pty::{grantpt, posix_openpt, ptsname, unlockpt, PtyMaster};
use nix::sys::signal::{kill, Signal};
use nix::sys::stat::Mode;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{close, dup2, execvp, fork, read, setsid, write, ForkResult, Pid};
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::{PtyChannel, PtyError, PtyResult, StdoutCallback, TerminatedCallback, WindowSize};

/// Poll interval of the reader thread.
const POLL_TIMEOUT_MS: i32 = 50;
/// Read chunk size for the reader thread.
const READ_CHUNK: usize = 1032;
/// Time a child gets to exit after SIGTERM before SIGKILL.
const TERM_GRACE: Duration = Duration::from_secs(3);

/// A pseudoterminal with a spawned child process
pub struct Pty {
    /// The PTY master file descriptor
    master: PtyMaster,
    /// The child process ID
    child_pid: Pid,
}

impl Pty {
    /// Spawn `cmd` (split on whitespace) behind a new pty of the given size.
    ///
    /// The child gets `COLUMNS`/`LINES` matching the size, a `TERM` of
    /// `xterm-256color` unless one is already set, and a UTF-8 locale.
    pub fn spawn(cmd: &str, size: WindowSize) -> PtyResult<Self> {
        let mut parts = cmd.split_whitespace();
        let program = parts.next().ok_or(PtyError::EmptyCommand)?;
        let args: Vec<&str> = parts.collect();

        // Open PTY master
        let master = posix_openpt(OFlag::O_RDWR | OFlag::O_NOCTTY).map_err(PtyError::OpenMaster)?;

        // Grant access to slave
        grantpt(&master).map_err(PtyError::GrantPty)?;

        // Unlock slave
        unlockpt(&master).map_err(PtyError::UnlockPty)?;

        // Get slave name
        // SAFETY: ptsname is not thread-safe, but we're calling it immediately
        // after unlockpt and before any other thread could interfere
        let slave_name = unsafe { ptsname(&master) }.map_err(PtyError::PtsName)?;

        // Set initial window size
        set_window_size(master.as_raw_fd(), size)?;

        // SAFETY: fork is safe as long as we're careful in the child
        match unsafe { fork() }.map_err(PtyError::Fork)? {
            ForkResult::Child => {
                // Child process: the master fd is not ours to keep.
                drop(master);

                if setsid().is_err() {
                    std::process::exit(126);
                }

                // Open slave - this becomes the controlling terminal
                let slave_fd = match open(slave_name.as_str(), OFlag::O_RDWR, Mode::empty()) {
                    Ok(fd) => fd,
                    Err(_) => std::process::exit(126),
                };

                // SAFETY: TIOCSCTTY is a valid ioctl for setting the
                // controlling terminal; failure is non-fatal on some systems
                unsafe {
                    libc::ioctl(slave_fd, libc::TIOCSCTTY as _, 0);
                }

                // Duplicate slave to stdin/stdout/stderr
                if dup2(slave_fd, STDIN_FILENO).is_err()
                    || dup2(slave_fd, STDOUT_FILENO).is_err()
                    || dup2(slave_fd, STDERR_FILENO).is_err()
                {
                    std::process::exit(126);
                }

                if slave_fd > STDERR_FILENO {
                    let _ = close(slave_fd);
                }

                // Environment contract for the child
                std::env::set_var("COLUMNS", size.cols.to_string());
                std::env::set_var("LINES", size.rows.to_string());
                if std::env::var_os("TERM").is_none() {
                    std::env::set_var("TERM", "xterm-256color");
                }
                if std::env::var_os("LANG").is_none() {
                    std::env::set_var("LANG", "en_US.UTF-8");
                }
                if std::env::var_os("LC_CTYPE").is_none() {
                    std::env::set_var("LC_CTYPE", "en_US.UTF-8");
                }

                let Ok(program_cstr) = CString::new(program) else {
                    std::process::exit(126);
                };
                let mut argv: Vec<CString> = Vec::with_capacity(args.len() + 1);
                argv.push(program_cstr.clone());
                for arg in &args {
                    match CString::new(*arg) {
                        Ok(a) => argv.push(a),
                        Err(_) => std::process::exit(126),
                    }
                }

                // execvp only returns on error
                let _ = execvp(&program_cstr, &argv);
                std::process::exit(127);
            }
            ForkResult::Parent { child } => {
                // Set master to non-blocking
                let flags = fcntl(master.as_raw_fd(), FcntlArg::F_GETFL)
                    .map_err(PtyError::SetNonBlocking)?;
                let flags = OFlag::from_bits_truncate(flags);
                fcntl(
                    master.as_raw_fd(),
                    FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK),
                )
                .map_err(PtyError::SetNonBlocking)?;

                Ok(Pty {
                    master,
                    child_pid: child,
                })
            }
        }
    }

    /// Get the raw file descriptor of the PTY master
    pub fn master_fd(&self) -> RawFd {
        self.master.as_raw_fd()
    }

    /// Get the child process ID
    pub fn child_pid(&self) -> Pid {
        self.child_pid
    }

    /// Read from the PTY master (non-blocking)
    ///
    /// Returns the number of bytes read, or 0 if no data is available.
    #[allow(dead_code)]
    pub fn read(&self, buf: &mut [u8]) -> PtyResult<usize> {
        match read(self.master.as_raw_fd(), buf) {
            Ok(n) => Ok(n),
            Err(Errno::EAGAIN) => Ok(0),
            Err(e) => Err(PtyError::Io(std::io::Error::from(e))),
        }
    }

    /// Write all data to the PTY master
    pub fn write_all(&self, mut data: &[u8]) -> PtyResult<()> {
        while !data.is_empty() {
            match write(self.master.as_raw_fd(), data) {
                Ok(n) => data = &data[n..],
                Err(Errno::EAGAIN) | Err(Errno::EINTR) => continue,
                Err(e) => return Err(PtyError::Write(e)),
            }
        }
        Ok(())
    }

    /// Poll for data available to read
    #[allow(dead_code)]
    pub fn poll_read(&self, timeout_ms: i32) -> PtyResult<bool> {
        // SAFETY: the master fd is valid for the lifetime of this Pty
        let borrowed_fd = unsafe { BorrowedFd::borrow_raw(self.master.as_raw_fd()) };
        let mut fds = [PollFd::new(&borrowed_fd, PollFlags::POLLIN)];
        let n = poll(&mut fds, timeout_ms).map_err(|e| PtyError::Io(std::io::Error::from(e)))?;
        Ok(n > 0
            && fds[0]
                .revents()
                .is_some_and(|r| r.contains(PollFlags::POLLIN)))
    }

    /// Resize the PTY
    pub fn resize(&self, size: WindowSize) -> PtyResult<()> {
        set_window_size(self.master.as_raw_fd(), size)
    }

    /// Send a signal to the child process
    pub fn signal(&self, signal: Signal) -> PtyResult<()> {
        kill(self.child_pid, signal).map_err(|e| PtyError::Io(std::io::Error::from(e)))
    }
}

impl Drop for Pty {
    fn drop(&mut self) {
        // Try to reap the child process
        let _ = waitpid(self.child_pid, Some(WaitPidFlag::WNOHANG));
    }
}

/// Set the window size on a PTY file descriptor
fn set_window_size(fd: RawFd, size: WindowSize) -> PtyResult<()> {
    let winsize = libc::winsize {
        ws_row: size.rows,
        ws_col: size.cols,
        ws_xpixel: size.pixel_width,
        ws_ypixel: size.pixel_height,
    };

    // SAFETY: TIOCSWINSZ is a valid ioctl for setting window size
    let result = unsafe { libc::ioctl(fd, libc::TIOCSWINSZ, &winsize) };

    if result < 0 {
        Err(PtyError::SetWinsize(Errno::last()))
    } else {
        Ok(())
    }
}

/// Get the window size from a PTY file descriptor
#[allow(dead_code)]
pub fn get_window_size(fd: RawFd) -> PtyResult<WindowSize> {
    let mut winsize = libc::winsize {
        ws_row: 0,
        ws_col: 0,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };

    // SAFETY: TIOCGWINSZ is a valid ioctl for getting window size
    let result = unsafe { libc::ioctl(fd, libc::TIOCGWINSZ, &mut winsize) };

    if result < 0 {
        Err(PtyError::SetWinsize(Errno::last()))
    } else {
        Ok(WindowSize {
            rows: winsize.ws_row,
            cols: winsize.ws_col,
            pixel_width: winsize.ws_xpixel,
            pixel_height: winsize.ws_ypixel,
        })
    }
}

struct Inner {
    cmd: String,
    /// Current geometry as `(cols, rows)`.
    geometry: Mutex<(u16, u16)>,
    pty: Mutex<Option<Pty>>,
    running: AtomicBool,
    terminated_fired: AtomicBool,
    stdout_cb: Mutex<Option<StdoutCallback>>,
    terminated_cb: Mutex<Option<TerminatedCallback>>,
}

impl Inner {
    /// Deliver the terminated callback at most once.
    fn fire_terminated(&self) {
        if self.terminated_fired.swap(true, Ordering::AcqRel) {
            return;
        }
        self.running.store(false, Ordering::Release);
        if let Some(cb) = self.terminated_cb.lock().as_mut() {
            cb();
        }
    }

    fn mark_dead(&self) {
        self.running.store(false, Ordering::Release);
        self.fire_terminated();
    }
}

/// POSIX [`PtyChannel`] backend.
///
/// Cheap to clone; clones share the channel. Callbacks run on the reader
/// thread (stdout) or on whichever thread observed the shutdown
/// (terminated).
#[derive(Clone)]
pub struct UnixPtyChannel {
    inner: Arc<Inner>,
}

impl UnixPtyChannel {
    pub fn new(cmd: impl Into<String>, cols: u16, rows: u16) -> Self {
        Self {
            inner: Arc::new(Inner {
                cmd: cmd.into(),
                geometry: Mutex::new((cols, rows)),
                pty: Mutex::new(None),
                running: AtomicBool::new(false),
                terminated_fired: AtomicBool::new(false),
                stdout_cb: Mutex::new(None),
                terminated_cb: Mutex::new(None),
            }),
        }
    }
}

impl PtyChannel for UnixPtyChannel {
    fn spawn(&self) -> PtyResult<()> {
        if self.inner.pty.lock().is_some() {
            return Err(PtyError::AlreadySpawned);
        }
        let (cols, rows) = *self.inner.geometry.lock();
        let pty = match Pty::spawn(&self.inner.cmd, WindowSize::new(cols, rows)) {
            Ok(pty) => pty,
            Err(e) => {
                warn!("pty spawn failed: {e}");
                self.inner.mark_dead();
                return Err(e);
            }
        };
        debug!(
            cmd = %self.inner.cmd,
            pid = pty.child_pid().as_raw(),
            "pty channel spawned"
        );

        let fd = pty.master_fd();
        *self.inner.pty.lock() = Some(pty);
        self.inner.running.store(true, Ordering::Release);

        let inner = Arc::clone(&self.inner);
        std::thread::Builder::new()
            .name("pty-reader".into())
            .spawn(move || reader_loop(inner, fd))
            .map_err(PtyError::Io)?;
        Ok(())
    }

    fn write(&self, bytes: &[u8]) {
        if !self.inner.running.load(Ordering::Acquire) {
            return;
        }
        let failed = {
            let guard = self.inner.pty.lock();
            match guard.as_ref() {
                Some(pty) => pty.write_all(bytes).is_err(),
                None => return,
            }
        };
        if failed {
            warn!("pty write failed, closing channel");
            self.inner.mark_dead();
        }
    }

    fn resize(&self, cols: u16, rows: u16) {
        *self.inner.geometry.lock() = (cols, rows);
        if !self.inner.running.load(Ordering::Acquire) {
            return;
        }
        let failed = {
            let guard = self.inner.pty.lock();
            match guard.as_ref() {
                Some(pty) => {
                    if pty.resize(WindowSize::new(cols, rows)).is_err() {
                        true
                    } else {
                        // Politely tell the child its world changed.
                        let _ = pty.signal(Signal::SIGWINCH);
                        false
                    }
                }
                None => return,
            }
        };
        if failed {
            warn!("pty resize failed, closing channel");
            self.inner.mark_dead();
        }
    }

    fn terminate(&self) {
        if !self.inner.running.swap(false, Ordering::AcqRel) {
            return;
        }
        let pid = self.inner.pty.lock().as_ref().map(Pty::child_pid);
        if let Some(pid) = pid {
            let _ = kill(pid, Signal::SIGTERM);
            // Escalate to SIGKILL if the child ignores SIGTERM.
            std::thread::spawn(move || {
                std::thread::sleep(TERM_GRACE);
                if matches!(
                    waitpid(pid, Some(WaitPidFlag::WNOHANG)),
                    Ok(WaitStatus::StillAlive)
                ) {
                    warn!(pid = pid.as_raw(), "child ignored SIGTERM, sending SIGKILL");
                    let _ = kill(pid, Signal::SIGKILL);
                    let _ = waitpid(pid, None);
                }
            });
        }
        self.inner.fire_terminated();
    }

    fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    fn is_alive(&self) -> bool {
        let pid = match self.inner.pty.lock().as_ref() {
            Some(pty) => pty.child_pid(),
            None => return false,
        };
        match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => true,
            _ => {
                self.inner.running.store(false, Ordering::Release);
                false
            }
        }
    }

    fn on_stdout(&self, cb: StdoutCallback) {
        *self.inner.stdout_cb.lock() = Some(cb);
    }

    fn on_terminated(&self, cb: TerminatedCallback) {
        *self.inner.terminated_cb.lock() = Some(cb);
    }
}

/// Pump child output to the stdout callback until EOF or shutdown.
fn reader_loop(inner: Arc<Inner>, fd: RawFd) {
    let mut buf = [0u8; READ_CHUNK];
    loop {
        if !inner.running.load(Ordering::Acquire) {
            break;
        }

        // SAFETY: the master fd stays open for as long as Inner holds the
        // Pty, which outlives this thread's use of it.
        let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
        let mut fds = [PollFd::new(&borrowed, PollFlags::POLLIN)];
        match poll(&mut fds, POLL_TIMEOUT_MS) {
            Ok(0) => continue,
            Ok(_) => {}
            Err(Errno::EINTR) => continue,
            Err(e) => {
                debug!("pty poll failed: {e}");
                break;
            }
        }

        match read(fd, &mut buf) {
            Ok(0) => break, // EOF: child closed its side
            Ok(n) => {
                if let Some(cb) = inner.stdout_cb.lock().as_mut() {
                    cb(&buf[..n]);
                }
            }
            Err(Errno::EAGAIN) | Err(Errno::EINTR) => continue,
            Err(e) => {
                debug!("pty read failed: {e}");
                break;
            }
        }
    }

    // Reap the child if it already exited, then report shutdown.
    if let Some(pty) = inner.pty.lock().as_ref() {
        let _ = waitpid(pty.child_pid(), Some(WaitPidFlag::WNOHANG));
    }
    inner.fire_terminated();
}
