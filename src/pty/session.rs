use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::SyncSender;
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use portable_pty::{Child, MasterPty, PtySize};

use crate::error::{Error, Result};
use crate::render::RenderFrame;
use crate::terminal::Screen;

use super::reader::spawn_io_threads;

/// Shared writer handle: both the session (user input) and the I/O
/// thread (report responses) write to the PTY.
pub type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

/// Exit code slot filled by the I/O thread when it observes EOF.
pub type SharedExitCode = Arc<Mutex<Option<i32>>>;

/// Shared child handle so the I/O thread can reap the process.
pub type SharedChild = Arc<Mutex<Box<dyn Child + Send + Sync>>>;

/// The renderer-facing half of a session. Frames are immutable
/// snapshots; `on_closed` fires exactly once when the session reaches
/// its terminal state.
pub trait RenderSink: Send + 'static {
    fn on_frame(&mut self, frame: RenderFrame);
    fn on_closed(&mut self, exit_code: Option<i32>);
}

/// A live terminal session tying together the PTY, the screen, and the
/// I/O and render-pump threads.
pub struct Session {
    /// Master PTY handle; dropped on kill so the blocked reader sees EOF.
    master: Option<Box<dyn MasterPty + Send>>,
    child: SharedChild,
    writer: SharedWriter,
    screen: Arc<Mutex<Screen>>,
    running: Arc<AtomicBool>,
    /// Input mailbox: producers enqueue encoded bytes, drained in FIFO
    /// order under the writer lock.
    input_tx: Sender<Vec<u8>>,
    input_rx: Receiver<Vec<u8>>,
    render_waker: Option<SyncSender<()>>,
    io_handle: Option<std::thread::JoinHandle<()>>,
    render_handle: Option<std::thread::JoinHandle<()>>,
    exit_code: SharedExitCode,
}

impl Session {
    pub(crate) fn new(
        master: Box<dyn MasterPty + Send>,
        child: Box<dyn Child + Send + Sync>,
        writer: Box<dyn Write + Send>,
        rows: u16,
        cols: u16,
        pixel_width: u16,
        pixel_height: u16,
    ) -> Self {
        let mut screen = Screen::new(rows, cols);
        screen.resize(rows, cols, pixel_width, pixel_height);
        let (input_tx, input_rx) = unbounded();

        Self {
            master: Some(master),
            child: Arc::new(Mutex::new(child)),
            writer: Arc::new(Mutex::new(writer)),
            screen: Arc::new(Mutex::new(screen)),
            running: Arc::new(AtomicBool::new(true)),
            input_tx,
            input_rx,
            render_waker: None,
            io_handle: None,
            render_handle: None,
            exit_code: Arc::new(Mutex::new(None)),
        }
    }

    /// Start the I/O and render-pump threads. `reader` is the PTY reader
    /// returned by [`super::spawn`]; `sink` receives frames and the
    /// closed notification.
    pub fn start(&mut self, reader: Box<dyn std::io::Read + Send>, sink: Box<dyn RenderSink>) {
        let handles = spawn_io_threads(
            reader,
            Arc::clone(&self.screen),
            Arc::clone(&self.writer),
            self.input_rx.clone(),
            Arc::clone(&self.child),
            Arc::clone(&self.exit_code),
            Arc::clone(&self.running),
            sink,
        );
        self.io_handle = Some(handles.io);
        self.render_handle = Some(handles.render_pump);
        self.render_waker = Some(handles.render_waker);
    }

    /// Shared screen handle, for hosts that read state directly
    /// (selection, search, scrollback position).
    pub fn screen(&self) -> Arc<Mutex<Screen>> {
        Arc::clone(&self.screen)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Exit code of the child, once the session closed.
    pub fn exit_code(&self) -> Option<i32> {
        *self.exit_code.lock()
    }

    /// Wake the render pump; call after mutating the screen directly.
    pub fn notify_render(&self) {
        if let Some(waker) = &self.render_waker {
            let _ = waker.try_send(());
        }
    }

    /// Enqueue encoded input bytes and flush the mailbox to the PTY.
    /// FIFO order is preserved by draining under the writer lock; bytes
    /// never interleave with a partially processed output chunk because
    /// the screen lock is not held here.
    pub fn send_input(&self, bytes: Vec<u8>) -> Result<()> {
        if !self.is_running() {
            return Err(Error::Closed);
        }
        if bytes.is_empty() {
            return Ok(());
        }
        let _ = self.input_tx.send(bytes);
        self.flush_input()
    }

    fn flush_input(&self) -> Result<()> {
        let mut writer = self.writer.lock();
        while let Ok(chunk) = self.input_rx.try_recv() {
            writer.write_all(&chunk)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Resize the terminal. The grid resizes before the PTY, under the
    /// screen lock, so the I/O thread never interprets bytes against
    /// stale dimensions.
    pub fn resize(&self, rows: u16, cols: u16, pixel_width: u16, pixel_height: u16) -> Result<()> {
        let mut screen = self.screen.lock();
        screen.resize(rows, cols, pixel_width, pixel_height);
        self.master
            .as_ref()
            .ok_or(Error::Closed)?
            .resize(PtySize {
                rows,
                cols,
                pixel_width,
                pixel_height,
            })
            .map_err(|e| Error::Pty(e.to_string()))?;
        drop(screen);
        self.notify_render();
        Ok(())
    }

    /// Terminate the session: signal the child, close the PTY so the
    /// blocked reader unblocks, and join both threads. In-flight PTY
    /// writes are abandoned.
    pub fn kill(&mut self) {
        self.running.store(false, Ordering::Release);
        self.notify_render();

        {
            let mut child = self.child.lock();
            let pid = child.process_id();

            // SIGHUP first, then escalate after a short grace period.
            let _ = child.kill();
            let deadline = std::time::Instant::now() + std::time::Duration::from_millis(200);
            let mut exited = false;
            while std::time::Instant::now() < deadline {
                if let Ok(Some(_)) = child.try_wait() {
                    exited = true;
                    break;
                }
                std::thread::sleep(std::time::Duration::from_millis(10));
            }

            if !exited {
                if let Some(raw_pid) = pid {
                    #[cfg(unix)]
                    unsafe {
                        // Kill the process group, then the process itself
                        // in case it moved to another group.
                        libc::kill(-(raw_pid as i32), libc::SIGKILL);
                        libc::kill(raw_pid as i32, libc::SIGKILL);
                    }
                }
                let _ = child.try_wait();
            }
        }

        // Closing the master fd makes the I/O thread's read return EOF.
        drop(self.master.take());

        if let Some(handle) = self.io_handle.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.render_handle.take() {
            let _ = handle.join();
        }
        self.render_waker = None;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.kill();
    }
}
