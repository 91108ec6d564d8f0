use std::io::{ErrorKind, Write};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use alulink_frame::{hex, Command, Opcode, PacedWriter, ResponseFrame, ResponseFramer};
use alulink_transport::PollRead;
use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::config::LinkConfig;
use crate::error::{Result, SessionError};
use crate::event::{Callback, LinkEvent, Subscribers};

type BoxedWriter = Box<dyn Write + Send>;

/// State shared between the session handle and its receive loop.
struct Shared {
    stop: AtomicBool,
    lost: Mutex<Option<String>>,
    subscribers: Mutex<Subscribers>,
}

impl Shared {
    /// Channels first, then callbacks. Callbacks run with the list unlocked
    /// so they may subscribe; one that panics is unregistered.
    fn publish(&self, event: LinkEvent) {
        let callbacks = {
            let mut subscribers = lock(&self.subscribers);
            subscribers.send_to_channels(&event);
            subscribers.callbacks()
        };
        for callback in callbacks {
            self.run_callback(&callback, &event);
        }
    }

    fn run_callback(&self, callback: &Callback, event: &LinkEvent) {
        if panic::catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
            warn!("event callback panicked, unregistering it");
            lock(&self.subscribers).remove_callback(callback);
        }
    }

    fn mark_lost(&self, reason: String) {
        *lock(&self.lost) = Some(reason.clone());
        self.publish(LinkEvent::LinkLost(reason));
    }
}

/// Marks the link lost if the receive loop ends without being asked to.
struct LoopExit<'a> {
    shared: &'a Shared,
}

impl Drop for LoopExit<'_> {
    fn drop(&mut self) {
        if self.shared.stop.load(Ordering::SeqCst) || lock(&self.shared.lost).is_some() {
            return;
        }
        if thread::panicking() {
            // Callbacks are skipped while unwinding.
            let reason = "receive loop panicked".to_string();
            warn!("{reason}");
            *lock(&self.shared.lost) = Some(reason.clone());
            lock(&self.shared.subscribers).send_to_channels(&LinkEvent::LinkLost(reason));
        } else {
            self.shared.mark_lost("receive loop exited".to_string());
        }
    }
}

/// An open link to the ALU.
///
/// Owns the transport and runs a receive loop on its own thread for as long
/// as the session lives. Sends are synchronous on the caller's thread and
/// serialized, so frames from concurrent callers never interleave.
pub struct LinkSession {
    name: String,
    writer: Mutex<PacedWriter<BoxedWriter>>,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl LinkSession {
    /// Open a serial port at the default line settings and start a session.
    pub fn open(path: &str) -> Result<Self> {
        crate::connector::open(path)
    }

    /// Start a session over already-opened transport halves.
    ///
    /// `reader` and `writer` must refer to the same link; the receive loop
    /// owns `reader` until shutdown.
    pub fn from_parts<R, W>(
        name: impl Into<String>,
        reader: R,
        writer: W,
        config: LinkConfig,
    ) -> Result<Self>
    where
        R: PollRead + Send + 'static,
        W: Write + Send + 'static,
    {
        let name = name.into();
        let shared = Arc::new(Shared {
            stop: AtomicBool::new(false),
            lost: Mutex::new(None),
            subscribers: Mutex::new(Subscribers::default()),
        });

        let worker = {
            let shared = Arc::clone(&shared);
            let config = config.clone();
            thread::Builder::new()
                .name("alulink-rx".to_string())
                .spawn(move || receive_loop(reader, &shared, &config))
                .map_err(SessionError::Spawn)?
        };

        info!(link = %name, "session started");
        Ok(Self {
            name,
            writer: Mutex::new(PacedWriter::with_delay(
                Box::new(writer) as BoxedWriter,
                config.inter_byte_delay,
            )),
            shared,
            worker: Some(worker),
        })
    }

    /// Link name (the port path for serial sessions).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Send an execute command.
    pub fn send_command(&self, op1: i8, op2: i8, opcode: Opcode) -> Result<()> {
        self.send(&Command::Execute { op1, op2, opcode })
    }

    /// Ask the ALU for its last result. The response arrives as an event.
    pub fn send_display_request(&self) -> Result<()> {
        self.send(&Command::Display)
    }

    /// Send any command.
    pub fn send(&self, command: &Command) -> Result<()> {
        self.ensure_alive()?;
        let frame = command.encode();
        lock(&self.writer).send_paced(&frame)?;
        debug!(link = %self.name, kind = command.kind(), bytes = %hex(&frame), "tx frame");
        Ok(())
    }

    /// Send one raw byte, bypassing the codec. For bring-up and diagnostics.
    pub fn send_raw_byte(&self, byte: u8) -> Result<()> {
        self.ensure_alive()?;
        lock(&self.writer).send_paced(&[byte])?;
        debug!(link = %self.name, byte = %hex(&[byte]), "tx raw byte");
        Ok(())
    }

    /// Subscribe to receive-loop events.
    ///
    /// Only events published after this call are delivered. Dropping the
    /// receiver unsubscribes.
    pub fn subscribe(&self) -> Receiver<LinkEvent> {
        let (tx, rx) = mpsc::channel();
        lock(&self.shared.subscribers).add_channel(tx);
        rx
    }

    /// Register a callback for receive-loop events.
    ///
    /// The callback runs on the receive thread and must not block. A callback
    /// that panics is unregistered; the receive loop keeps running.
    pub fn on_event<F>(&self, callback: F)
    where
        F: Fn(&LinkEvent) + Send + Sync + 'static,
    {
        lock(&self.shared.subscribers).add_callback(Arc::new(callback));
    }

    /// Send a display request and wait for the next response.
    pub fn request_result(&self, timeout: Duration) -> Result<ResponseFrame> {
        let events = self.subscribe();
        self.send_display_request()?;
        wait_for_response(&events, timeout)
    }

    /// Execute an operation, then request and wait for its result.
    pub fn execute(
        &self,
        op1: i8,
        op2: i8,
        opcode: Opcode,
        timeout: Duration,
    ) -> Result<ResponseFrame> {
        self.send_command(op1, op2, opcode)?;
        self.request_result(timeout)
    }

    /// Why the receive loop stopped, if it has.
    pub fn link_lost(&self) -> Option<String> {
        lock(&self.shared.lost).clone()
    }

    /// True while the receive loop is running.
    pub fn is_alive(&self) -> bool {
        self.link_lost().is_none()
            && !self.shared.stop.load(Ordering::SeqCst)
            && self
                .worker
                .as_ref()
                .is_some_and(|worker| !worker.is_finished())
    }

    /// Stop the receive loop and close the link.
    pub fn shutdown(mut self) -> Result<()> {
        self.stop_worker()
    }

    fn ensure_alive(&self) -> Result<()> {
        match self.link_lost() {
            Some(reason) => Err(SessionError::LinkLost(reason)),
            None => Ok(()),
        }
    }

    /// The loop is stopped and joined before the handles drop.
    fn stop_worker(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        self.shared.stop.store(true, Ordering::SeqCst);
        worker.thread().unpark();
        let joined = worker.join();
        info!(link = %self.name, "session closed");
        joined.map_err(|_| SessionError::ReceiverPanicked)
    }
}

impl Drop for LinkSession {
    fn drop(&mut self) {
        if let Err(err) = self.stop_worker() {
            warn!(link = %self.name, error = %err, "session teardown failed");
        }
    }
}

impl std::fmt::Debug for LinkSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkSession")
            .field("name", &self.name)
            .field("alive", &self.is_alive())
            .finish()
    }
}

fn receive_loop<R: PollRead>(mut reader: R, shared: &Shared, config: &LinkConfig) {
    let _exit = LoopExit { shared };
    let mut framer = ResponseFramer::with_policy(config.framing);
    let mut chunk = vec![0u8; config.max_chunk.max(1)];

    while !shared.stop.load(Ordering::SeqCst) {
        match read_available(&mut reader, &mut chunk) {
            Ok(0) => {}
            Ok(n) => {
                let data = &chunk[..n];
                debug!(bytes = %hex(data), "rx raw");
                shared.publish(LinkEvent::Chunk(Bytes::copy_from_slice(data)));
                for frame in framer.push(data) {
                    debug!(
                        result = frame.result,
                        zero = frame.zero,
                        overflow = frame.overflow,
                        "rx response"
                    );
                    shared.publish(LinkEvent::Response(frame));
                }
            }
            Err(err) => {
                warn!(error = %err, "receive loop stopped");
                shared.mark_lost(err.to_string());
                return;
            }
        }
        thread::park_timeout(config.poll_interval);
    }
}

/// Read whatever is queued right now, up to `buf.len()` bytes.
fn read_available<R: PollRead>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let available = reader.bytes_available()?;
    if available == 0 {
        return Ok(0);
    }

    let want = available.min(buf.len());
    loop {
        match reader.read(&mut buf[..want]) {
            Ok(0) => {
                return Err(std::io::Error::new(
                    ErrorKind::UnexpectedEof,
                    "link closed",
                ))
            }
            Ok(n) => return Ok(n),
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if matches!(err.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                return Ok(0)
            }
            Err(err) => return Err(err),
        }
    }
}

fn wait_for_response(events: &Receiver<LinkEvent>, timeout: Duration) -> Result<ResponseFrame> {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match events.recv_timeout(remaining) {
            Ok(LinkEvent::Response(frame)) => return Ok(frame),
            Ok(LinkEvent::LinkLost(reason)) => return Err(SessionError::LinkLost(reason)),
            Ok(LinkEvent::Chunk(_)) => continue,
            Err(RecvTimeoutError::Timeout) => return Err(SessionError::Timeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => {
                return Err(SessionError::LinkLost("receive loop exited".to_string()))
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::io::Read;

    use alulink_frame::FramingPolicy;

    use super::*;

    fn fast_config() -> LinkConfig {
        LinkConfig {
            inter_byte_delay: Duration::ZERO,
            poll_interval: Duration::from_millis(5),
            ..LinkConfig::default()
        }
    }

    /// Replays scripted chunks, then fails like an unplugged adapter.
    ///
    /// Reports nothing queued until the gate opens, so tests can subscribe
    /// before the first chunk is published.
    struct ScriptedReader {
        chunks: VecDeque<Vec<u8>>,
        fail_when_empty: bool,
        gate: Arc<AtomicBool>,
    }

    impl ScriptedReader {
        fn new(chunks: &[&[u8]], fail_when_empty: bool) -> Self {
            Self {
                chunks: chunks.iter().map(|c| c.to_vec()).collect(),
                fail_when_empty,
                gate: Arc::new(AtomicBool::new(true)),
            }
        }

        fn gated(chunks: &[&[u8]]) -> (Self, Arc<AtomicBool>) {
            let mut reader = Self::new(chunks, false);
            reader.gate = Arc::new(AtomicBool::new(false));
            let gate = Arc::clone(&reader.gate);
            (reader, gate)
        }
    }

    impl Read for ScriptedReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let Some(chunk) = self.chunks.front_mut() else {
                return Ok(0);
            };
            let n = chunk.len().min(buf.len());
            buf[..n].copy_from_slice(&chunk[..n]);
            chunk.drain(..n);
            if chunk.is_empty() {
                self.chunks.pop_front();
            }
            Ok(n)
        }
    }

    impl PollRead for ScriptedReader {
        fn bytes_available(&mut self) -> std::io::Result<usize> {
            if !self.gate.load(Ordering::SeqCst) {
                return Ok(0);
            }
            match self.chunks.front() {
                Some(chunk) => Ok(chunk.len()),
                None if self.fail_when_empty => {
                    Err(std::io::Error::new(ErrorKind::BrokenPipe, "device unplugged"))
                }
                None => Ok(0),
            }
        }
    }

    /// Write sink the test can inspect while the session holds it.
    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct PanickingReader;

    impl Read for PanickingReader {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Ok(0)
        }
    }

    impl PollRead for PanickingReader {
        fn bytes_available(&mut self) -> std::io::Result<usize> {
            panic!("driver fault");
        }
    }

    struct BrokenWriter;

    impl Write for BrokenWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn next_response(rx: &Receiver<LinkEvent>) -> ResponseFrame {
        loop {
            match rx.recv_timeout(Duration::from_secs(2)).unwrap() {
                LinkEvent::Response(frame) => return frame,
                LinkEvent::Chunk(_) => continue,
                LinkEvent::LinkLost(reason) => panic!("link lost: {reason}"),
            }
        }
    }

    #[test]
    fn sends_encoded_frames() {
        let sink = SharedSink::default();
        let session = LinkSession::from_parts(
            "mock",
            ScriptedReader::new(&[], false),
            sink.clone(),
            fast_config(),
        )
        .unwrap();

        session.send_command(5, -3, Opcode::Sub).unwrap();
        session.send_display_request().unwrap();
        session.send_raw_byte(0xF0).unwrap();

        assert_eq!(
            sink.0.lock().unwrap().as_slice(),
            &[0xCD, 0x05, 0xFD, 0b100010, 0xD1, 0xF0]
        );
        session.shutdown().unwrap();
    }

    #[test]
    fn chunks_become_responses_in_order() {
        let (reader, gate) = ScriptedReader::gated(&[&[0x05], &[0x01], &[0xFD, 0x02]]);
        let session =
            LinkSession::from_parts("mock", reader, SharedSink::default(), fast_config()).unwrap();
        let rx = session.subscribe();
        gate.store(true, Ordering::SeqCst);

        assert_eq!(next_response(&rx), ResponseFrame::new(5, true, false));
        assert_eq!(next_response(&rx), ResponseFrame::new(-3, false, true));
        session.shutdown().unwrap();
    }

    #[test]
    fn callbacks_see_raw_chunk_then_response() {
        let (reader, gate) = ScriptedReader::gated(&[&[0x05, 0x01, 0x99]]);
        let session =
            LinkSession::from_parts("mock", reader, SharedSink::default(), fast_config()).unwrap();

        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        session.on_event(move |event| {
            let _ = tx.lock().unwrap().send(event.clone());
        });
        gate.store(true, Ordering::SeqCst);

        let timeout = Duration::from_secs(2);
        assert_eq!(
            rx.recv_timeout(timeout).unwrap(),
            LinkEvent::Chunk(Bytes::from_static(&[0x05, 0x01, 0x99]))
        );
        assert_eq!(
            rx.recv_timeout(timeout).unwrap(),
            LinkEvent::Response(ResponseFrame::new(5, true, false))
        );
        // 0x99 was discarded with the rest of the chunk.
        assert!(rx.recv_timeout(Duration::from_millis(30)).is_err());
        session.shutdown().unwrap();
    }

    #[test]
    fn read_failure_is_link_lost() {
        let session = LinkSession::from_parts(
            "mock",
            ScriptedReader::new(&[], true),
            SharedSink::default(),
            fast_config(),
        )
        .unwrap();

        let start = Instant::now();
        while session.is_alive() && start.elapsed() < Duration::from_secs(2) {
            thread::sleep(Duration::from_millis(5));
        }

        let reason = session.link_lost().expect("link should be lost");
        assert!(reason.contains("device unplugged"));

        let err = session.send_display_request().unwrap_err();
        assert!(matches!(err, SessionError::LinkLost(_)));
        session.shutdown().unwrap();
    }

    #[test]
    fn write_failure_surfaces_and_session_stays_open() {
        let session = LinkSession::from_parts(
            "mock",
            ScriptedReader::new(&[], false),
            BrokenWriter,
            fast_config(),
        )
        .unwrap();

        let err = session.send_command(1, 2, Opcode::Add).unwrap_err();
        assert!(matches!(
            err,
            SessionError::Frame(alulink_frame::FrameError::WriteFailed { sent: 0, total: 4, .. })
        ));
        assert!(session.is_alive());
        session.shutdown().unwrap();
    }

    #[test]
    fn request_result_times_out_without_device() {
        let session = LinkSession::from_parts(
            "mock",
            ScriptedReader::new(&[], false),
            SharedSink::default(),
            fast_config(),
        )
        .unwrap();

        let err = session
            .request_result(Duration::from_millis(30))
            .unwrap_err();
        assert!(matches!(err, SessionError::Timeout(_)));
        session.shutdown().unwrap();
    }

    #[test]
    fn shutdown_is_prompt_with_long_poll_interval() {
        let config = LinkConfig {
            poll_interval: Duration::from_secs(30),
            ..fast_config()
        };
        let session = LinkSession::from_parts(
            "mock",
            ScriptedReader::new(&[], false),
            SharedSink::default(),
            config,
        )
        .unwrap();

        let start = Instant::now();
        session.shutdown().unwrap();
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn panicking_callback_is_unregistered_and_loop_survives() {
        let (reader, gate) = ScriptedReader::gated(&[&[0x05, 0x01], &[0x07, 0x00]]);
        let session =
            LinkSession::from_parts("mock", reader, SharedSink::default(), fast_config()).unwrap();
        let rx = session.subscribe();
        session.on_event(|event| {
            if let LinkEvent::Response(_) = event {
                panic!("callback failure");
            }
        });
        gate.store(true, Ordering::SeqCst);

        assert_eq!(next_response(&rx), ResponseFrame::new(5, true, false));
        assert_eq!(next_response(&rx), ResponseFrame::new(7, false, false));
        assert!(session.is_alive());
        assert!(session.link_lost().is_none());
        assert_eq!(lock(&session.shared.subscribers).len(), 1);
        session.shutdown().unwrap();
    }

    #[test]
    fn callback_can_subscribe_from_the_receive_thread() {
        let (reader, gate) = ScriptedReader::gated(&[&[0x05, 0x01], &[0x07, 0x00]]);
        let session =
            LinkSession::from_parts("mock", reader, SharedSink::default(), fast_config()).unwrap();

        let (late_tx, late_rx) = mpsc::channel();
        let late_tx = Mutex::new(Some(late_tx));
        let shared = Arc::downgrade(&session.shared);
        session.on_event(move |event| {
            if !matches!(event, LinkEvent::Response(_)) {
                return;
            }
            let (Some(shared), Some(tx)) = (shared.upgrade(), late_tx.lock().unwrap().take())
            else {
                return;
            };
            lock(&shared.subscribers).add_channel(tx);
        });
        gate.store(true, Ordering::SeqCst);

        // Registered while handling the first response, so only the second arrives.
        assert_eq!(next_response(&late_rx), ResponseFrame::new(7, false, false));
        session.shutdown().unwrap();
    }

    #[test]
    fn receive_loop_panic_is_link_lost() {
        let session =
            LinkSession::from_parts("mock", PanickingReader, SharedSink::default(), fast_config())
                .unwrap();

        let start = Instant::now();
        while session.is_alive() && start.elapsed() < Duration::from_secs(2) {
            thread::sleep(Duration::from_millis(5));
        }

        assert!(!session.is_alive());
        let reason = session.link_lost().expect("link should be lost");
        assert!(reason.contains("panicked"));
        assert!(matches!(
            session.send_display_request(),
            Err(SessionError::LinkLost(_))
        ));
        assert!(matches!(
            session.shutdown(),
            Err(SessionError::ReceiverPanicked)
        ));
    }

    #[test]
    fn reframe_policy_delivers_back_to_back_responses() {
        let config = LinkConfig {
            framing: FramingPolicy::Reframe,
            ..fast_config()
        };
        let (reader, gate) = ScriptedReader::gated(&[&[0x01, 0x00, 0x02, 0x02]]);
        let session =
            LinkSession::from_parts("mock", reader, SharedSink::default(), config).unwrap();
        let rx = session.subscribe();
        gate.store(true, Ordering::SeqCst);

        assert_eq!(next_response(&rx), ResponseFrame::new(1, false, false));
        assert_eq!(next_response(&rx), ResponseFrame::new(2, false, true));
        session.shutdown().unwrap();
    }

    #[test]
    fn max_chunk_splits_queued_bytes_across_polls() {
        let config = LinkConfig {
            max_chunk: 2,
            ..fast_config()
        };
        let (reader, gate) = ScriptedReader::gated(&[&[0x05, 0x01, 0xFD, 0x02]]);
        let session =
            LinkSession::from_parts("mock", reader, SharedSink::default(), config).unwrap();
        let rx = session.subscribe();
        gate.store(true, Ordering::SeqCst);

        let timeout = Duration::from_secs(2);
        let events: Vec<LinkEvent> = (0..4)
            .map(|_| rx.recv_timeout(timeout).unwrap())
            .collect();
        assert_eq!(
            events,
            vec![
                LinkEvent::Chunk(Bytes::from_static(&[0x05, 0x01])),
                LinkEvent::Response(ResponseFrame::new(5, true, false)),
                LinkEvent::Chunk(Bytes::from_static(&[0xFD, 0x02])),
                LinkEvent::Response(ResponseFrame::new(-3, false, true)),
            ]
        );
        session.shutdown().unwrap();
    }

    #[test]
    fn wait_for_response_skips_chunks() {
        let (tx, rx) = mpsc::channel();
        tx.send(LinkEvent::Chunk(Bytes::from_static(&[0x05])))
            .unwrap();
        tx.send(LinkEvent::Response(ResponseFrame::new(5, false, false)))
            .unwrap();

        let frame = wait_for_response(&rx, Duration::from_secs(1)).unwrap();
        assert_eq!(frame.result, 5);
    }

    #[test]
    fn wait_for_response_reports_link_loss() {
        let (tx, rx) = mpsc::channel();
        tx.send(LinkEvent::LinkLost("gone".to_string())).unwrap();

        let err = wait_for_response(&rx, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, SessionError::LinkLost(reason) if reason == "gone"));
    }
}
