//! Standalone relay peers sharing one queue outside any launch.
//!
//! The receiver owns the queue (creates and removes it); the sender only opens it.
//! Signals only raise a [`ShutdownFlag`]; both loops check it between bounded waits
//! and release the queue on the normal return path.

use std::io::{self, Write};
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags};
use signal_hook::consts::{SIGINT, SIGTERM};

use crate::channel::{IpcChannel, IpcMessage, OwnedChannel};
use crate::config::ChannelBounds;
use crate::debug_log;
use crate::error::ChannelError;

/// Longest a peer blocks before checking for shutdown.
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Cancellation flag raised by SIGINT or SIGTERM.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a flag and register it for SIGINT and SIGTERM.
    pub fn install() -> io::Result<Self> {
        let flag = Self::new();
        for signal in [SIGINT, SIGTERM] {
            signal_hook::flag::register(signal, Arc::clone(&flag.0))?;
        }
        Ok(flag)
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Create the queue, print every message as `RCV: <text>` until shutdown, then
/// close and remove the queue. Returns the number of messages printed.
pub fn run_receiver<W: Write>(
    name: &str,
    bounds: ChannelBounds,
    shutdown: &ShutdownFlag,
    out: &mut W,
) -> anyhow::Result<usize> {
    let channel = IpcChannel::create_for_read(name, bounds)
        .with_context(|| format!("opening message queue {}", name))?;
    let channel = OwnedChannel::creator(channel);

    writeln!(out, "\nReady to receive messages ....\n")?;
    out.flush()?;

    let mut received = 0;
    while !shutdown.is_set() {
        match channel.receive_timeout(POLL_INTERVAL) {
            Ok(message) => {
                writeln!(out, "RCV: {}", message)?;
                out.flush()?;
                received += 1;
            }
            Err(ChannelError::Timeout { .. }) => continue,
            // A signal can interrupt the receive itself.
            Err(_) if shutdown.is_set() => break,
            Err(e) => return Err(e).context("receiving message"),
        }
    }

    debug_log!("Receiver: shutting down after {} messages", received);
    for failure in channel.teardown() {
        tracing::warn!("Receiver: {}", failure);
    }
    Ok(received)
}

/// What a line source produced within one wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    /// A complete line, without its terminator.
    Line(String),
    /// Nothing arrived within the wait.
    Idle,
    /// Input is exhausted.
    Closed,
}

/// Line-oriented input that can be waited on with a timeout.
pub trait LineSource {
    fn next_line(&mut self, timeout: Duration) -> io::Result<LineEvent>;
}

/// Lines from standard input, read unbuffered so readiness polling stays exact.
#[derive(Debug, Default)]
pub struct StdinLines {
    pending: Vec<u8>,
    eof: bool,
}

impl StdinLines {
    pub fn new() -> Self {
        Self::default()
    }

    fn take_line(&mut self) -> Option<String> {
        let end = self.pending.iter().position(|b| *b == b'\n')?;
        let rest = self.pending.split_off(end + 1);
        let mut line = std::mem::replace(&mut self.pending, rest);
        line.truncate(end);
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }
}

impl LineSource for StdinLines {
    fn next_line(&mut self, timeout: Duration) -> io::Result<LineEvent> {
        if let Some(line) = self.take_line() {
            return Ok(LineEvent::Line(line));
        }
        if self.eof {
            if self.pending.is_empty() {
                return Ok(LineEvent::Closed);
            }
            let rest = std::mem::take(&mut self.pending);
            return Ok(LineEvent::Line(String::from_utf8_lossy(&rest).into_owned()));
        }

        let stdin = io::stdin();
        let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as i32;
        let mut fds = [PollFd::new(&stdin, PollFlags::POLLIN)];
        match poll(&mut fds, timeout_ms) {
            Ok(0) | Err(Errno::EINTR) => return Ok(LineEvent::Idle),
            Ok(_) => {}
            Err(e) => return Err(io::Error::from(e)),
        }

        let mut chunk = [0u8; 4096];
        match nix::unistd::read(stdin.as_raw_fd(), &mut chunk) {
            Ok(0) => self.eof = true,
            Ok(n) => self.pending.extend_from_slice(&chunk[..n]),
            Err(Errno::EINTR) => return Ok(LineEvent::Idle),
            Err(e) => return Err(io::Error::from(e)),
        }

        match self.take_line() {
            Some(line) => Ok(LineEvent::Line(line)),
            None if self.eof => self.next_line(timeout),
            None => Ok(LineEvent::Idle),
        }
    }
}

/// Open the existing queue and send each input line, cut to the queue's text limit,
/// until shutdown or end of input. The queue is closed but never removed.
/// Returns the number of messages sent.
pub fn run_sender<L: LineSource, W: Write>(
    name: &str,
    expected: ChannelBounds,
    input: &mut L,
    shutdown: &ShutdownFlag,
    out: &mut W,
) -> anyhow::Result<usize> {
    let channel = IpcChannel::open_for_write(name, Some(expected))
        .with_context(|| format!("opening message queue {}", name))?;
    let channel = OwnedChannel::opener(channel);
    let limit = channel.bounds().max_text_len();

    writeln!(out, "\nReady for sending messages (MAX {} chars) ....\n", limit)?;
    write!(out, "SND: ")?;
    out.flush()?;

    let mut sent = 0;
    while !shutdown.is_set() {
        match input.next_line(POLL_INTERVAL).context("reading input")? {
            LineEvent::Line(line) => {
                let message = IpcMessage::from_text(&line, limit);
                channel
                    .send(message.as_bytes())
                    .context("sending message")?;
                sent += 1;
                write!(out, "SND: ")?;
                out.flush()?;
            }
            LineEvent::Idle => continue,
            LineEvent::Closed => break,
        }
    }

    writeln!(out)?;
    debug_log!("Sender: closing queue after {} messages", sent);
    for failure in channel.teardown() {
        tracing::warn!("Sender: {}", failure);
    }
    Ok(sent)
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::channel::tests::{test_queue_name, try_create};
    use crate::config::RELAY_BOUNDS;

    /// Scripted input; raises the shutdown flag once the script runs dry.
    struct ScriptedLines {
        events: VecDeque<LineEvent>,
        shutdown: Option<ShutdownFlag>,
    }

    impl LineSource for ScriptedLines {
        fn next_line(&mut self, _timeout: Duration) -> io::Result<LineEvent> {
            match self.events.pop_front() {
                Some(event) => Ok(event),
                None => {
                    if let Some(ref flag) = self.shutdown {
                        flag.trigger();
                    }
                    Ok(LineEvent::Idle)
                }
            }
        }
    }

    fn lines(items: &[&str]) -> VecDeque<LineEvent> {
        items
            .iter()
            .map(|line| LineEvent::Line(line.to_string()))
            .collect()
    }

    #[test]
    fn test_shutdown_flag() {
        let flag = ShutdownFlag::new();
        assert!(!flag.is_set());
        let clone = flag.clone();
        clone.trigger();
        assert!(flag.is_set());
    }

    #[test]
    fn test_sender_truncates_and_stops_at_end_of_input() {
        let name = test_queue_name("peer-send");
        let Some(reader) = try_create(&name, RELAY_BOUNDS) else {
            return;
        };
        let reader = OwnedChannel::creator(reader);

        let long = "z".repeat(100);
        let mut events = lines(&["first", long.as_str()]);
        events.push_back(LineEvent::Idle);
        events.push_back(LineEvent::Closed);
        let mut input = ScriptedLines {
            events,
            shutdown: None,
        };
        let mut out = Vec::new();

        let sent = run_sender(&name, RELAY_BOUNDS, &mut input, &ShutdownFlag::new(), &mut out).unwrap();
        assert_eq!(sent, 2);

        let output = String::from_utf8(out).unwrap();
        assert!(output.contains("Ready for sending messages (MAX 60 chars) ...."));

        let first = reader.receive_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(first.as_bytes(), b"first\0");
        let second = reader.receive_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(second.len(), RELAY_BOUNDS.max_message_size);
        assert_eq!(second.text(), "z".repeat(60));

        // The sender closed without removing the queue.
        assert!(IpcChannel::open_for_write(&name, None).is_ok());
        assert!(reader.teardown().is_empty());
    }

    #[test]
    fn test_sender_without_queue_fails() {
        let name = test_queue_name("peer-missing");
        let _ = IpcChannel::unlink(&name);
        let mut input = ScriptedLines {
            events: VecDeque::new(),
            shutdown: None,
        };
        let mut out = Vec::new();

        let result = run_sender(&name, RELAY_BOUNDS, &mut input, &ShutdownFlag::new(), &mut out);
        assert!(result.is_err());
        assert!(out.is_empty());
    }

    #[test]
    fn test_receiver_prints_and_removes_queue_on_shutdown() {
        let name = test_queue_name("peer-recv");
        // Probe for mqueue support before starting the receiver thread.
        let Some(probe) = try_create(&name, RELAY_BOUNDS) else {
            return;
        };
        assert!(OwnedChannel::creator(probe).teardown().is_empty());

        let shutdown = ShutdownFlag::new();
        let receiver = {
            let name = name.clone();
            let shutdown = shutdown.clone();
            std::thread::spawn(move || {
                let mut out = Vec::new();
                let count = run_receiver(&name, RELAY_BOUNDS, &shutdown, &mut out).unwrap();
                (count, String::from_utf8(out).unwrap())
            })
        };

        // Wait for the receiver to create the queue.
        let mut writer = None;
        for _ in 0..100 {
            if let Ok(channel) = IpcChannel::open_for_write(&name, Some(RELAY_BOUNDS)) {
                writer = Some(channel);
                break;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        let writer = writer.expect("receiver never created the queue");
        writer.send(IpcMessage::from_text("ping", 60).as_bytes()).unwrap();
        writer.send(IpcMessage::from_text("pong", 60).as_bytes()).unwrap();

        // Let the receiver drain the queue, then ask it to stop.
        std::thread::sleep(Duration::from_millis(600));
        shutdown.trigger();

        let (count, output) = receiver.join().unwrap();
        assert_eq!(count, 2);
        assert!(output.contains("Ready to receive messages ...."));
        assert!(output.contains("RCV: ping\n"));
        assert!(output.contains("RCV: pong\n"));

        writer.close().unwrap();
        assert!(IpcChannel::open_for_write(&name, None).is_err());
    }

    #[test]
    fn test_sender_honours_shutdown() {
        let name = test_queue_name("peer-stop");
        let Some(reader) = try_create(&name, RELAY_BOUNDS) else {
            return;
        };
        let reader = OwnedChannel::creator(reader);

        let shutdown = ShutdownFlag::new();
        let mut input = ScriptedLines {
            events: lines(&["only"]),
            shutdown: Some(shutdown.clone()),
        };
        let mut out = Vec::new();

        let sent = run_sender(&name, RELAY_BOUNDS, &mut input, &shutdown, &mut out).unwrap();
        assert_eq!(sent, 1);
        assert_eq!(
            reader.receive_timeout(Duration::from_secs(5)).unwrap().text(),
            "only"
        );
        assert!(reader.teardown().is_empty());
    }
}
