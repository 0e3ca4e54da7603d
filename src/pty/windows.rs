//! Windows ConPTY backend
//!
//! Implements the pty channel over the Windows pseudoconsole API: two
//! anonymous pipes feed a `HPCON`, and the child is started with the
//! pseudoconsole attached through a proc-thread attribute list. Reads are
//! blocking on a dedicated thread; closing the pseudoconsole unblocks the
//! reader when the channel shuts down.

use std::ffi::c_void;
use std::mem::size_of;
use std::os::windows::ffi::OsStrExt;
use std::ptr::{null, null_mut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use windows_sys::Win32::Foundation::{
    CloseHandle, GetLastError, FALSE, HANDLE, S_OK, WAIT_TIMEOUT,
};
use windows_sys::Win32::Storage::FileSystem::{ReadFile, WriteFile};
use windows_sys::Win32::System::Console::{
    ClosePseudoConsole, CreatePseudoConsole, ResizePseudoConsole, COORD, HPCON,
};
use windows_sys::Win32::System::Pipes::CreatePipe;
use windows_sys::Win32::System::Threading::{
    CreateProcessW, DeleteProcThreadAttributeList, InitializeProcThreadAttributeList,
    TerminateProcess, UpdateProcThreadAttribute, WaitForSingleObject,
    CREATE_UNICODE_ENVIRONMENT, EXTENDED_STARTUPINFO_PRESENT, LPPROC_THREAD_ATTRIBUTE_LIST,
    PROCESS_INFORMATION, STARTUPINFOEXW, STARTUPINFOW,
};

use super::{PtyChannel, PtyError, PtyResult, StdoutCallback, TerminatedCallback, WindowSize};

/// Read chunk size for the reader thread.
const READ_CHUNK: usize = 1032;
/// Time a child gets to exit after the console closes before TerminateProcess.
const TERM_GRACE_MS: u32 = 3000;

/// Attribute key for attaching a pseudoconsole to a child process.
/// Defined in consoleapi.h as ProcThreadAttributePseudoConsole (22) with
/// the input flag bit set.
const PROC_THREAD_ATTRIBUTE_PSEUDOCONSOLE: usize = 0x20016;

/// Raw handles for one spawned pseudoconsole.
///
/// `read` is our end of the child's output pipe, `write` our end of its
/// input pipe. The child-side pipe ends are closed right after spawn.
struct Conpty {
    hpc: HPCON,
    read: HANDLE,
    write: HANDLE,
    process: HANDLE,
}

// SAFETY: the handles are only used through synchronized methods; the
// win32 calls involved are thread-safe on distinct handles.
unsafe impl Send for Conpty {}
unsafe impl Sync for Conpty {}

impl Conpty {
    fn spawn(cmd: &str, size: WindowSize) -> PtyResult<Self> {
        if cmd.split_whitespace().next().is_none() {
            return Err(PtyError::EmptyCommand);
        }

        let mut in_read: HANDLE = null_mut();
        let mut in_write: HANDLE = null_mut();
        let mut out_read: HANDLE = null_mut();
        let mut out_write: HANDLE = null_mut();

        // SAFETY: the out-pointers are valid; on failure nothing is leaked.
        unsafe {
            if CreatePipe(&mut in_read, &mut in_write, null(), 0) == FALSE {
                return Err(last_error("CreatePipe (stdin)"));
            }
            if CreatePipe(&mut out_read, &mut out_write, null(), 0) == FALSE {
                CloseHandle(in_read);
                CloseHandle(in_write);
                return Err(last_error("CreatePipe (stdout)"));
            }
        }

        let coord = COORD {
            X: size.cols as i16,
            Y: size.rows as i16,
        };
        let mut hpc: HPCON = null_mut();
        // SAFETY: both pipe ends are valid handles from CreatePipe.
        let hr = unsafe { CreatePseudoConsole(coord, in_read, out_write, 0, &mut hpc) };
        // The pseudoconsole duplicates the child-side ends internally.
        unsafe {
            CloseHandle(in_read);
            CloseHandle(out_write);
        }
        if hr != S_OK {
            unsafe {
                CloseHandle(in_write);
                CloseHandle(out_read);
            }
            return Err(PtyError::Spawn(format!(
                "CreatePseudoConsole failed: HRESULT {hr:#x}"
            )));
        }

        match spawn_child(cmd, hpc, size) {
            Ok(process) => Ok(Self {
                hpc,
                read: out_read,
                write: in_write,
                process,
            }),
            Err(e) => {
                unsafe {
                    ClosePseudoConsole(hpc);
                    CloseHandle(in_write);
                    CloseHandle(out_read);
                }
                Err(e)
            }
        }
    }

    fn write_all(&self, mut data: &[u8]) -> PtyResult<()> {
        while !data.is_empty() {
            let mut written: u32 = 0;
            // SAFETY: buffer pointer and length describe a valid slice.
            let ok = unsafe {
                WriteFile(
                    self.write,
                    data.as_ptr(),
                    data.len() as u32,
                    &mut written,
                    null_mut(),
                )
            };
            if ok == FALSE {
                return Err(last_error("WriteFile"));
            }
            data = &data[written as usize..];
        }
        Ok(())
    }

    fn resize(&self, size: WindowSize) -> PtyResult<()> {
        let coord = COORD {
            X: size.cols as i16,
            Y: size.rows as i16,
        };
        // SAFETY: hpc is a live pseudoconsole handle.
        let hr = unsafe { ResizePseudoConsole(self.hpc, coord) };
        if hr != S_OK {
            return Err(PtyError::Spawn(format!(
                "ResizePseudoConsole failed: HRESULT {hr:#x}"
            )));
        }
        Ok(())
    }

    fn is_alive(&self) -> bool {
        // SAFETY: process handle is valid until Drop.
        unsafe { WaitForSingleObject(self.process, 0) == WAIT_TIMEOUT }
    }

    /// Close the console and give the child a grace period before killing.
    fn shutdown(&self) {
        // SAFETY: closing the console also breaks the output pipe, which
        // unblocks the reader thread's ReadFile.
        unsafe {
            ClosePseudoConsole(self.hpc);
            if WaitForSingleObject(self.process, TERM_GRACE_MS) == WAIT_TIMEOUT {
                warn!("child ignored console close, terminating process");
                TerminateProcess(self.process, 1);
                WaitForSingleObject(self.process, TERM_GRACE_MS);
            }
        }
    }
}

impl Drop for Conpty {
    fn drop(&mut self) {
        // SAFETY: handles are owned by this struct and closed exactly once.
        unsafe {
            CloseHandle(self.read);
            CloseHandle(self.write);
            CloseHandle(self.process);
        }
    }
}

fn last_error(what: &str) -> PtyError {
    // SAFETY: GetLastError has no preconditions.
    let code = unsafe { GetLastError() };
    PtyError::Spawn(format!("{what} failed: error {code}"))
}

fn wide(s: &str) -> Vec<u16> {
    std::ffi::OsStr::new(s).encode_wide().chain(Some(0)).collect()
}

/// Build a UTF-16 environment block for the child: the parent environment
/// with `COLUMNS`/`LINES` forced to the console geometry, and `TERM` plus
/// a UTF-8 locale defaulted when the parent does not set them.
fn environment_block(size: WindowSize) -> Vec<u16> {
    let mut vars: Vec<(String, String)> = std::env::vars_os()
        .map(|(k, v)| {
            (
                k.to_string_lossy().into_owned(),
                v.to_string_lossy().into_owned(),
            )
        })
        .collect();

    fn put(vars: &mut Vec<(String, String)>, key: &str, value: String, force: bool) {
        match vars.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(key)) {
            Some(slot) => {
                if force {
                    slot.1 = value;
                }
            }
            None => vars.push((key.to_string(), value)),
        }
    }
    put(&mut vars, "COLUMNS", size.cols.to_string(), true);
    put(&mut vars, "LINES", size.rows.to_string(), true);
    put(&mut vars, "TERM", "xterm-256color".to_string(), false);
    put(&mut vars, "LANG", "en_US.UTF-8".to_string(), false);
    put(&mut vars, "LC_CTYPE", "en_US.UTF-8".to_string(), false);

    // The block must be sorted case-insensitively by name.
    vars.sort_by(|a, b| a.0.to_uppercase().cmp(&b.0.to_uppercase()));

    let mut block: Vec<u16> = Vec::new();
    for (key, value) in &vars {
        block.extend(format!("{key}={value}").encode_utf16());
        block.push(0);
    }
    block.push(0);
    block
}

/// Start the child with the pseudoconsole attached via the extended
/// startup info attribute list.
fn spawn_child(cmd: &str, hpc: HPCON, size: WindowSize) -> PtyResult<HANDLE> {
    let mut attr_size: usize = 0;
    // First call fails by contract and reports the needed buffer size.
    // SAFETY: passing a null list with count 1 to query the size.
    unsafe {
        InitializeProcThreadAttributeList(null_mut(), 1, 0, &mut attr_size);
    }
    let mut attr_buf = vec![0u8; attr_size];
    let attr_list = attr_buf.as_mut_ptr() as LPPROC_THREAD_ATTRIBUTE_LIST;

    // SAFETY: attr_buf is sized per the query above and outlives the list.
    unsafe {
        if InitializeProcThreadAttributeList(attr_list, 1, 0, &mut attr_size) == FALSE {
            return Err(last_error("InitializeProcThreadAttributeList"));
        }
        if UpdateProcThreadAttribute(
            attr_list,
            0,
            PROC_THREAD_ATTRIBUTE_PSEUDOCONSOLE,
            hpc as *const c_void,
            size_of::<HPCON>(),
            null_mut(),
            null_mut(),
        ) == FALSE
        {
            DeleteProcThreadAttributeList(attr_list);
            return Err(last_error("UpdateProcThreadAttribute"));
        }
    }

    let mut si: STARTUPINFOEXW = unsafe { std::mem::zeroed() };
    si.StartupInfo.cb = size_of::<STARTUPINFOEXW>() as u32;
    si.lpAttributeList = attr_list;
    let mut pi: PROCESS_INFORMATION = unsafe { std::mem::zeroed() };

    let mut cmd_wide = wide(cmd);
    let env = environment_block(size);

    // SAFETY: command line buffer is mutable and NUL terminated; startup
    // info carries the attribute list initialized above; the environment
    // block is double-NUL terminated UTF-16.
    let ok = unsafe {
        CreateProcessW(
            null(),
            cmd_wide.as_mut_ptr(),
            null(),
            null(),
            FALSE,
            EXTENDED_STARTUPINFO_PRESENT | CREATE_UNICODE_ENVIRONMENT,
            env.as_ptr() as *const c_void,
            null(),
            &mut si as *mut STARTUPINFOEXW as *mut STARTUPINFOW,
            &mut pi,
        )
    };

    // SAFETY: list was initialized above; delete before returning.
    unsafe {
        DeleteProcThreadAttributeList(attr_list);
    }

    if ok == FALSE {
        return Err(last_error("CreateProcessW"));
    }

    // SAFETY: the thread handle is not needed.
    unsafe {
        CloseHandle(pi.hThread);
    }
    Ok(pi.hProcess)
}

struct Inner {
    cmd: String,
    /// Current geometry as `(cols, rows)`.
    geometry: Mutex<(u16, u16)>,
    conpty: Mutex<Option<Arc<Conpty>>>,
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

/// ConPTY [`PtyChannel`] backend.
///
/// Cheap to clone; clones share the channel. The stdout callback runs on
/// the reader thread.
#[derive(Clone)]
pub struct ConptyChannel {
    inner: Arc<Inner>,
}

impl ConptyChannel {
    pub fn new(cmd: impl Into<String>, cols: u16, rows: u16) -> Self {
        Self {
            inner: Arc::new(Inner {
                cmd: cmd.into(),
                geometry: Mutex::new((cols, rows)),
                conpty: Mutex::new(None),
                running: AtomicBool::new(false),
                terminated_fired: AtomicBool::new(false),
                stdout_cb: Mutex::new(None),
                terminated_cb: Mutex::new(None),
            }),
        }
    }
}

impl PtyChannel for ConptyChannel {
    fn spawn(&self) -> PtyResult<()> {
        if self.inner.conpty.lock().is_some() {
            return Err(PtyError::AlreadySpawned);
        }
        let (cols, rows) = *self.inner.geometry.lock();
        let conpty = match Conpty::spawn(&self.inner.cmd, WindowSize::new(cols, rows)) {
            Ok(c) => Arc::new(c),
            Err(e) => {
                warn!("conpty spawn failed: {e}");
                self.inner.mark_dead();
                return Err(e);
            }
        };
        debug!(cmd = %self.inner.cmd, "conpty channel spawned");

        *self.inner.conpty.lock() = Some(Arc::clone(&conpty));
        self.inner.running.store(true, Ordering::Release);

        let inner = Arc::clone(&self.inner);
        std::thread::Builder::new()
            .name("conpty-reader".into())
            .spawn(move || reader_loop(inner, conpty))
            .map_err(PtyError::Io)?;
        Ok(())
    }

    fn write(&self, bytes: &[u8]) {
        if !self.inner.running.load(Ordering::Acquire) {
            return;
        }
        let failed = {
            let guard = self.inner.conpty.lock();
            match guard.as_ref() {
                Some(conpty) => conpty.write_all(bytes).is_err(),
                None => return,
            }
        };
        if failed {
            warn!("conpty write failed, closing channel");
            self.inner.mark_dead();
        }
    }

    fn resize(&self, cols: u16, rows: u16) {
        *self.inner.geometry.lock() = (cols, rows);
        if !self.inner.running.load(Ordering::Acquire) {
            return;
        }
        let failed = {
            let guard = self.inner.conpty.lock();
            match guard.as_ref() {
                Some(conpty) => conpty.resize(WindowSize::new(cols, rows)).is_err(),
                None => return,
            }
        };
        if failed {
            warn!("conpty resize failed, closing channel");
            self.inner.mark_dead();
        }
    }

    fn terminate(&self) {
        if !self.inner.running.swap(false, Ordering::AcqRel) {
            return;
        }
        let conpty = self.inner.conpty.lock().as_ref().map(Arc::clone);
        if let Some(conpty) = conpty {
            // Shutdown on a helper thread so terminate() never blocks the
            // caller for the grace period.
            std::thread::spawn(move || conpty.shutdown());
        }
        self.inner.fire_terminated();
    }

    fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    fn is_alive(&self) -> bool {
        let alive = match self.inner.conpty.lock().as_ref() {
            Some(conpty) => conpty.is_alive(),
            None => false,
        };
        if !alive {
            self.inner.running.store(false, Ordering::Release);
        }
        alive
    }

    fn on_stdout(&self, cb: StdoutCallback) {
        *self.inner.stdout_cb.lock() = Some(cb);
    }

    fn on_terminated(&self, cb: TerminatedCallback) {
        *self.inner.terminated_cb.lock() = Some(cb);
    }
}

/// Pump child output to the stdout callback until the pipe breaks.
fn reader_loop(inner: Arc<Inner>, conpty: Arc<Conpty>) {
    let mut buf = [0u8; READ_CHUNK];
    loop {
        if !inner.running.load(Ordering::Acquire) {
            break;
        }
        let mut n: u32 = 0;
        // SAFETY: buffer pointer and length describe a valid slice; the
        // read handle stays open for the lifetime of `conpty`.
        let ok = unsafe {
            ReadFile(
                conpty.read,
                buf.as_mut_ptr(),
                buf.len() as u32,
                &mut n,
                null_mut(),
            )
        };
        if ok == FALSE || n == 0 {
            // Broken pipe: child exited or the console was closed.
            break;
        }
        if let Some(cb) = inner.stdout_cb.lock().as_mut() {
            cb(&buf[..n as usize]);
        }
    }
    inner.fire_terminated();
}

#[cfg(test)]
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
    fn test_channel_round_trip() {
        let channel = ConptyChannel::new("cmd.exe", 80, 24);
        let output: Arc<Mutex<Vec<u8>>> = Default::default();
        let sink = output.clone();
        channel.on_stdout(Box::new(move |bytes| {
            sink.lock().extend_from_slice(bytes)
        }));
        channel.spawn().expect("spawn failed");
        assert!(channel.is_running());

        channel.write(b"echo roundtrip\r\n");
        assert!(
            wait_until(Duration::from_secs(5), || {
                String::from_utf8_lossy(&output.lock()).contains("roundtrip")
            }),
            "no echo from cmd.exe"
        );

        channel.terminate();
        assert!(!channel.is_running());
    }

    #[test]
    fn test_terminated_fires_exactly_once() {
        let channel = ConptyChannel::new("cmd.exe", 80, 24);
        let fired: Arc<Mutex<usize>> = Default::default();
        let sink = fired.clone();
        channel.on_terminated(Box::new(move || *sink.lock() += 1));
        channel.spawn().expect("spawn failed");

        channel.terminate();
        channel.terminate();
        std::thread::sleep(Duration::from_millis(500));
        assert_eq!(*fired.lock(), 1);
    }

    #[test]
    fn test_environment_block_carries_terminal_contract() {
        let block = environment_block(WindowSize::new(120, 40));
        assert_eq!(block[block.len() - 2..], [0, 0]);

        let entries: Vec<String> = String::from_utf16(&block[..block.len() - 2])
            .expect("block is not valid UTF-16")
            .split('\0')
            .map(str::to_string)
            .collect();
        assert!(entries.iter().any(|e| e == "COLUMNS=120"));
        assert!(entries.iter().any(|e| e == "LINES=40"));
        assert!(entries.iter().any(|e| e.starts_with("TERM=")));
        assert!(entries.iter().any(|e| e.starts_with("LANG=")));
        assert!(entries.iter().any(|e| e.starts_with("LC_CTYPE=")));
    }

    #[test]
    fn test_environment_block_geometry_overrides_parent() {
        std::env::set_var("COLUMNS", "9999");
        let block = environment_block(WindowSize::new(80, 24));
        let text = String::from_utf16(&block).expect("block is not valid UTF-16");
        assert!(text.contains("COLUMNS=80\0"));
        assert!(!text.contains("COLUMNS=9999\0"));
    }

    #[test]
    fn test_empty_command_rejected() {
        let channel = ConptyChannel::new("   ", 80, 24);
        assert!(matches!(channel.spawn(), Err(PtyError::EmptyCommand)));
    }
}
