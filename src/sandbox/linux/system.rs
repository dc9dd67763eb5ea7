//! Kernel calls made by the child bootstrap, behind a trait so the stage sequence
//! can be driven against a recording double.

use std::ffi::CString;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::mount::{mount, MsFlags};
use nix::sys::stat::Mode;
use nix::unistd::{access, chdir, chroot, execvp, mkdir, sethostname, AccessFlags};

use crate::channel::{IpcChannel, IpcMessage};
use crate::config::ChannelSettings;
use crate::error::ChannelError;

/// Write side of the handshake channel as seen by the child.
pub trait HandshakeSink {
    /// Largest payload the channel carries.
    fn max_message_size(&self) -> usize;

    fn send_message(&self, message: &IpcMessage) -> Result<(), ChannelError>;

    /// Close the sink. The child never unlinks.
    fn finish(self) -> Result<(), ChannelError>;
}

impl HandshakeSink for IpcChannel {
    fn max_message_size(&self) -> usize {
        self.bounds().max_message_size
    }

    fn send_message(&self, message: &IpcMessage) -> Result<(), ChannelError> {
        self.send(message.as_bytes())
    }

    fn finish(self) -> Result<(), ChannelError> {
        self.close()
    }
}

/// Mount operations the bootstrap performs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountRequest {
    /// Recursively mark a mount tree private so nothing propagates back to the host.
    MakePrivate { target: PathBuf },
    /// Mount a fresh proc filesystem.
    Proc { target: PathBuf },
}

/// Operating-system calls used inside the isolated child.
pub trait SystemOps {
    type Sink: HandshakeSink;

    /// Open the handshake channel for writing.
    fn open_channel(&mut self, settings: &ChannelSettings) -> Result<Self::Sink, ChannelError>;

    /// Prompt on the terminal and read one line of at most `limit` bytes, without
    /// its terminator. `Ok(None)` means end of input.
    fn prompt_line(&mut self, limit: usize) -> io::Result<Option<Vec<u8>>>;

    fn chroot(&mut self, path: &Path) -> io::Result<()>;

    fn chdir(&mut self, path: &Path) -> io::Result<()>;

    fn exists(&mut self, path: &Path) -> bool;

    fn mkdir(&mut self, path: &Path, mode: u32) -> io::Result<()>;

    fn mount(&mut self, request: &MountRequest) -> io::Result<()>;

    fn set_hostname(&mut self, hostname: &str) -> io::Result<()>;

    fn clear_env(&mut self) -> io::Result<()>;

    /// Replace the process image. Only returns on failure.
    fn exec(&mut self, argv: &[String]) -> io::Error;
}

/// The real system, backed by nix.
#[derive(Debug, Default)]
pub struct LinuxSystem;

impl LinuxSystem {
    pub fn new() -> Self {
        Self
    }
}

impl SystemOps for LinuxSystem {
    type Sink = IpcChannel;

    fn open_channel(&mut self, settings: &ChannelSettings) -> Result<IpcChannel, ChannelError> {
        IpcChannel::open_for_write(&settings.name, Some(settings.bounds))
    }

    fn prompt_line(&mut self, limit: usize) -> io::Result<Option<Vec<u8>>> {
        let mut stdout = io::stdout();
        write!(
            stdout,
            "\n     Child: enter a message to send to the parent process (MAX {} chars)\n     >> ",
            limit
        )?;
        stdout.flush()?;

        let mut line = Vec::new();
        if io::stdin().lock().read_until(b'\n', &mut line)? == 0 {
            return Ok(None);
        }
        writeln!(stdout)?;

        Ok(Some(trim_line(line, limit)))
    }

    fn chroot(&mut self, path: &Path) -> io::Result<()> {
        chroot(path).map_err(io::Error::from)
    }

    fn chdir(&mut self, path: &Path) -> io::Result<()> {
        chdir(path).map_err(io::Error::from)
    }

    fn exists(&mut self, path: &Path) -> bool {
        access(path, AccessFlags::F_OK).is_ok()
    }

    fn mkdir(&mut self, path: &Path, mode: u32) -> io::Result<()> {
        mkdir(path, Mode::from_bits_truncate(mode)).map_err(io::Error::from)
    }

    fn mount(&mut self, request: &MountRequest) -> io::Result<()> {
        match request {
            MountRequest::MakePrivate { target } => mount(
                None::<&str>,
                target.as_path(),
                None::<&str>,
                MsFlags::MS_REC | MsFlags::MS_PRIVATE,
                None::<&str>,
            ),
            MountRequest::Proc { target } => mount(
                Some("proc"),
                target.as_path(),
                Some("proc"),
                MsFlags::empty(),
                None::<&str>,
            ),
        }
        .map_err(io::Error::from)
    }

    fn set_hostname(&mut self, hostname: &str) -> io::Result<()> {
        sethostname(hostname).map_err(io::Error::from)
    }

    fn clear_env(&mut self) -> io::Result<()> {
        // The child is single-threaded at this point.
        #[allow(unused_unsafe)]
        unsafe { nix::env::clearenv() }
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))
    }

    fn exec(&mut self, argv: &[String]) -> io::Error {
        let args: Vec<CString> = match argv
            .iter()
            .map(|arg| CString::new(arg.as_bytes()))
            .collect::<Result<_, _>>()
        {
            Ok(args) => args,
            Err(_) => return io::Error::from(Errno::EINVAL),
        };
        let Some(program) = args.first() else {
            return io::Error::from(Errno::EINVAL);
        };

        match execvp(program, &args) {
            Ok(never) => match never {},
            Err(errno) => io::Error::from(errno),
        }
    }
}

/// Strip the line terminator and cut the line to `limit` bytes.
fn trim_line(mut line: Vec<u8>, limit: usize) -> Vec<u8> {
    if line.last() == Some(&b'\n') {
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
    }
    line.truncate(limit);
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_line() {
        assert_eq!(trim_line(b"hello\n".to_vec(), 80), b"hello");
        assert_eq!(trim_line(b"hello\r\n".to_vec(), 80), b"hello");
        assert_eq!(trim_line(b"no newline".to_vec(), 80), b"no newline");
        assert_eq!(trim_line(b"abcdef\n".to_vec(), 3), b"abc");
    }

    #[test]
    fn test_trim_line_keeps_non_utf8_bytes() {
        assert_eq!(trim_line(b"\xff\xfe ok\n".to_vec(), 80), b"\xff\xfe ok");
    }
}
