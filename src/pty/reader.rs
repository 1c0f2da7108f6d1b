use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, SyncSender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use parking_lot::Mutex;

use crate::parser::Parser;
use crate::terminal::Screen;

use super::session::{RenderSink, SharedChild, SharedExitCode, SharedWriter};

/// Handles for the I/O and render-pump threads.
pub(crate) struct IoThreadHandles {
    pub io: std::thread::JoinHandle<()>,
    pub render_pump: std::thread::JoinHandle<()>,
    pub render_waker: SyncSender<()>,
}

/// Spawn the two session threads.
///
/// - I/O thread: blocking PTY reads drive the parser and mutate the
///   screen under the screen lock; the input mailbox and queued report
///   responses are flushed at loop boundaries, never mid-dispatch.
/// - Render pump: coalesces wakeups and hands at most ~60 frames/s to
///   the sink, each taken under the lock and released before delivery.
#[allow(clippy::too_many_arguments)]
pub(crate) fn spawn_io_threads(
    mut reader: Box<dyn Read + Send>,
    screen: Arc<Mutex<Screen>>,
    writer: SharedWriter,
    input_rx: Receiver<Vec<u8>>,
    child: SharedChild,
    exit_code: SharedExitCode,
    running: Arc<AtomicBool>,
    mut sink: Box<dyn RenderSink>,
) -> IoThreadHandles {
    fn notify(waker: &SyncSender<()>) {
        let _ = waker.try_send(());
    }

    let (render_waker, render_rx) = sync_channel::<()>(1);

    let io_screen = Arc::clone(&screen);
    let io_writer = Arc::clone(&writer);
    let io_child = Arc::clone(&child);
    let io_exit_code = Arc::clone(&exit_code);
    let io_running = Arc::clone(&running);
    let io_waker = render_waker.clone();

    let io = std::thread::Builder::new()
        .name("pty-io".to_string())
        .spawn(move || {
            let mut parser = Parser::new();
            let mut buf = [0u8; 4096];

            while io_running.load(Ordering::Acquire) {
                match reader.read(&mut buf) {
                    Ok(0) => {
                        // EOF: the child went away; reap it for the code.
                        if let Ok(Some(status)) = io_child.lock().try_wait() {
                            *io_exit_code.lock() = Some(status.exit_code() as i32);
                        }
                        tracing::info!("PTY reader reached EOF");
                        io_running.store(false, Ordering::Release);
                        notify(&io_waker);
                        break;
                    }
                    Ok(n) => {
                        let mut screen = io_screen.lock();
                        parser.advance(&mut *screen, &buf[..n]);
                        let responses = screen.take_pending_responses();
                        drop(screen);

                        // Loop boundary: flush report responses, then the
                        // input mailbox, in order.
                        let mut w = io_writer.lock();
                        for response in &responses {
                            let _ = w.write_all(response);
                        }
                        let mut flushed = !responses.is_empty();
                        while let Ok(chunk) = input_rx.try_recv() {
                            let _ = w.write_all(&chunk);
                            flushed = true;
                        }
                        if flushed {
                            let _ = w.flush();
                        }
                        drop(w);

                        notify(&io_waker);
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted
                        || e.kind() == std::io::ErrorKind::WouldBlock =>
                    {
                        continue;
                    }
                    Err(e) => {
                        if io_running.load(Ordering::Acquire) {
                            tracing::error!("PTY read failed: {e}");
                        }
                        if let Ok(Some(status)) = io_child.lock().try_wait() {
                            *io_exit_code.lock() = Some(status.exit_code() as i32);
                        }
                        io_running.store(false, Ordering::Release);
                        notify(&io_waker);
                        break;
                    }
                }
            }
        })
        .expect("failed to spawn PTY I/O thread");

    let render_screen = Arc::clone(&screen);
    let render_exit_code = Arc::clone(&exit_code);
    let render_running = Arc::clone(&running);
    let render_retry_waker = render_waker.clone();

    let render_pump = std::thread::Builder::new()
        .name("pty-render".to_string())
        .spawn(move || {
            const FRAME_TICK: Duration = Duration::from_millis(16);
            let mut last_emit = Instant::now() - FRAME_TICK;

            while render_running.load(Ordering::Acquire) {
                if render_rx.recv().is_err() {
                    break;
                }
                if !render_running.load(Ordering::Acquire) {
                    break;
                }

                let elapsed = last_emit.elapsed();
                if elapsed < FRAME_TICK {
                    std::thread::sleep(FRAME_TICK - elapsed);
                }
                // Coalesce bursty wakeups into one frame build.
                while render_rx.try_recv().is_ok() {}

                if let Some(mut screen) = render_screen.try_lock() {
                    let frame = screen.take_render_frame();
                    drop(screen);
                    if let Some(frame) = frame {
                        tracing::trace!(
                            frame_seq = frame.frame_seq,
                            lines = frame.lines.len(),
                            events = frame.events.len(),
                            "emitting render frame"
                        );
                        sink.on_frame(frame);
                        last_emit = Instant::now();
                    }
                } else {
                    // The I/O thread owns the lock; retry without spinning.
                    notify(&render_retry_waker);
                }
            }

            // Final drain so the last output of a closing session is not
            // lost, then the one-shot closed notification.
            let mut screen = render_screen.lock();
            let frame = screen.take_render_frame();
            drop(screen);
            if let Some(frame) = frame {
                sink.on_frame(frame);
            }
            let code = render_exit_code.lock().take();
            sink.on_closed(code);
        })
        .expect("failed to spawn render-pump thread");

    IoThreadHandles {
        io,
        render_pump,
        render_waker,
    }
}
