//! Named, bounded message-queue channel (POSIX mqueue).
//!
//! The queue is the only path across the isolation boundary besides the child's
//! exit status. Bounds belong to the queue instance: whoever creates it first wins,
//! and every later opener checks the actual bounds against what it expected.

pub mod message;

use std::fmt;
use std::ops::Deref;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use nix::errno::Errno;
use nix::mqueue::{
    mq_close, mq_getattr, mq_open, mq_send, mq_timedreceive, mq_unlink, MqAttr,
    MqdT, MQ_OFlag,
};
use nix::sys::stat::Mode;
use nix::sys::time::TimeSpec;

use crate::config::ChannelBounds;
use crate::error::ChannelError;

pub use message::IpcMessage;

/// A process-local handle to a named kernel message queue.
pub struct IpcChannel {
    name: String,
    mqd: Option<MqdT>,
    bounds: ChannelBounds,
}

impl fmt::Debug for IpcChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IpcChannel")
            .field("name", &self.name)
            .field("open", &self.mqd.is_some())
            .field("bounds", &self.bounds)
            .finish()
    }
}

impl IpcChannel {
    /// Create the queue (or reuse an existing one) for reading and writing.
    pub fn create(name: &str, bounds: ChannelBounds) -> Result<Self, ChannelError> {
        Self::create_with(name, bounds, MQ_OFlag::O_RDWR)
    }

    /// Create the queue (or reuse an existing one) for reading only.
    pub fn create_for_read(name: &str, bounds: ChannelBounds) -> Result<Self, ChannelError> {
        Self::create_with(name, bounds, MQ_OFlag::O_RDONLY)
    }

    fn create_with(
        name: &str,
        bounds: ChannelBounds,
        access: MQ_OFlag,
    ) -> Result<Self, ChannelError> {
        validate_name(name)?;
        bounds.validate().map_err(|e| ChannelError::CreateFailed {
            name: name.to_string(),
            reason: e.to_string(),
        })?;

        let attr = MqAttr::new(0, bounds.max_messages as _, bounds.max_message_size as _, 0);
        let mode = Mode::S_IRUSR | Mode::S_IWUSR | Mode::S_IRGRP | Mode::S_IROTH;
        let mqd = mq_open(name, MQ_OFlag::O_CREAT | access, mode, Some(&attr)).map_err(|e| {
            ChannelError::CreateFailed {
                name: name.to_string(),
                reason: e.to_string(),
            }
        })?;

        let actual = query_bounds(&mqd).map_err(|e| ChannelError::CreateFailed {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        flag_bounds_mismatch(name, bounds, actual);

        tracing::debug!("Opened message queue {} ({:?})", name, actual);

        Ok(Self {
            name: name.to_string(),
            mqd: Some(mqd),
            bounds: actual,
        })
    }

    /// Open an existing queue for writing.
    ///
    /// `expected` is what this side was configured with; a queue created with other
    /// bounds is still used but the mismatch is reported.
    pub fn open_for_write(
        name: &str,
        expected: Option<ChannelBounds>,
    ) -> Result<Self, ChannelError> {
        validate_name(name)?;

        let mqd = mq_open(name, MQ_OFlag::O_WRONLY, Mode::empty(), None).map_err(|e| {
            ChannelError::OpenFailed {
                name: name.to_string(),
                reason: e.to_string(),
            }
        })?;

        let actual = match query_bounds(&mqd) {
            Ok(actual) => actual,
            Err(e) => {
                let _ = mq_close(mqd);
                return Err(ChannelError::OpenFailed {
                    name: name.to_string(),
                    reason: e.to_string(),
                });
            }
        };
        if let Some(expected) = expected {
            flag_bounds_mismatch(name, expected, actual);
        }

        Ok(Self {
            name: name.to_string(),
            mqd: Some(mqd),
            bounds: actual,
        })
    }

    /// Queue name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bounds of the underlying queue instance.
    pub fn bounds(&self) -> ChannelBounds {
        self.bounds
    }

    fn descriptor(&self) -> Result<&MqdT, Errno> {
        self.mqd.as_ref().ok_or(Errno::EBADF)
    }

    /// Enqueue a message, blocking while the queue is full.
    ///
    /// Payloads longer than the queue's message size are cut silently.
    pub fn send(&self, message: &[u8]) -> Result<(), ChannelError> {
        let limit = message.len().min(self.bounds.max_message_size);
        self.descriptor()
            .and_then(|mqd| mq_send(mqd, &message[..limit], 0))
            .map_err(|e| ChannelError::SendFailed {
                name: self.name.clone(),
                reason: e.to_string(),
            })
    }

    /// Block until a message arrives or the absolute `deadline` passes.
    pub fn receive_with_deadline(&self, deadline: SystemTime) -> Result<IpcMessage, ChannelError> {
        let since_epoch = deadline
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO);
        let abstime = TimeSpec::from(since_epoch);

        let mut buf = vec![0u8; self.bounds.max_message_size];
        let mut prio = 0u32;
        let result = self
            .descriptor()
            .and_then(|mqd| mq_timedreceive(mqd, &mut buf, &mut prio, &abstime));

        match result {
            Ok(len) => {
                buf.truncate(len);
                Ok(IpcMessage::new(buf))
            }
            Err(Errno::ETIMEDOUT) => Err(ChannelError::Timeout {
                name: self.name.clone(),
            }),
            Err(e) => Err(ChannelError::ReceiveFailed {
                name: self.name.clone(),
                reason: e.to_string(),
            }),
        }
    }

    /// Receive with a deadline `timeout` from now.
    pub fn receive_timeout(&self, timeout: Duration) -> Result<IpcMessage, ChannelError> {
        self.receive_with_deadline(SystemTime::now() + timeout)
    }

    /// Close this handle. The queue itself stays until unlinked.
    pub fn close(mut self) -> Result<(), ChannelError> {
        self.close_handle()
    }

    fn close_handle(&mut self) -> Result<(), ChannelError> {
        match self.mqd.take() {
            Some(mqd) => mq_close(mqd).map_err(|e| ChannelError::CloseFailed {
                name: self.name.clone(),
                reason: e.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Remove the named queue. Handles that are still open stay valid until closed.
    pub fn unlink(name: &str) -> Result<(), ChannelError> {
        validate_name(name)?;
        mq_unlink(name).map_err(|e| ChannelError::UnlinkFailed {
            name: name.to_string(),
            reason: e.to_string(),
        })
    }
}

impl Drop for IpcChannel {
    fn drop(&mut self) {
        if let Some(mqd) = self.mqd.take() {
            let _ = mq_close(mqd);
        }
    }
}

/// Scoped ownership of a channel: closes it, and unlinks it when this side created
/// it, on every exit path.
#[derive(Debug)]
pub struct OwnedChannel {
    channel: IpcChannel,
    unlink_on_drop: bool,
    released: bool,
}

impl OwnedChannel {
    /// Wrap a channel this process created.
    pub fn creator(channel: IpcChannel) -> Self {
        Self {
            channel,
            unlink_on_drop: true,
            released: false,
        }
    }

    /// Wrap a channel this process only opened.
    pub fn opener(channel: IpcChannel) -> Self {
        Self {
            channel,
            unlink_on_drop: false,
            released: false,
        }
    }

    /// Close, then unlink if this side created the queue. Both steps are attempted;
    /// every failure is returned.
    pub fn teardown(mut self) -> Vec<ChannelError> {
        self.release()
    }

    fn release(&mut self) -> Vec<ChannelError> {
        let mut failures = Vec::new();
        if self.released {
            return failures;
        }
        self.released = true;

        tracing::debug!("Closing message queue {}", self.channel.name);
        if let Err(e) = self.channel.close_handle() {
            failures.push(e);
        }
        if self.unlink_on_drop {
            tracing::debug!("Removing message queue {}", self.channel.name);
            if let Err(e) = IpcChannel::unlink(&self.channel.name) {
                failures.push(e);
            }
        }
        failures
    }
}

impl Deref for OwnedChannel {
    type Target = IpcChannel;

    fn deref(&self) -> &IpcChannel {
        &self.channel
    }
}

impl Drop for OwnedChannel {
    fn drop(&mut self) {
        for failure in self.release() {
            tracing::warn!("{}", failure);
        }
    }
}

/// Queue names are a single path component with a leading slash.
fn validate_name(name: &str) -> Result<(), ChannelError> {
    if name.len() < 2 || !name.starts_with('/') || name[1..].contains('/') {
        return Err(ChannelError::InvalidName(name.to_string()));
    }
    Ok(())
}

fn query_bounds(mqd: &MqdT) -> Result<ChannelBounds, Errno> {
    let attr = mq_getattr(mqd)?;
    Ok(ChannelBounds {
        max_messages: attr.maxmsg() as usize,
        max_message_size: attr.msgsize() as usize,
    })
}

fn flag_bounds_mismatch(name: &str, expected: ChannelBounds, actual: ChannelBounds) {
    if expected != actual {
        tracing::warn!(
            "Message queue {} already exists with depth {} and message size {} \
             (expected depth {} and message size {}); using the existing bounds",
            name,
            actual.max_messages,
            actual.max_message_size,
            expected.max_messages,
            expected.max_message_size
        );
    }
}
