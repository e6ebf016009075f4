//! Channel-based sink implementation.

use crossbeam_channel::{Sender, TrySendError};
use tracing::debug;

use crate::{Sink, SinkError};

/// A sink that forwards each chunk over a bounded crossbeam channel.
///
/// Never blocks the drain thread: a full channel accepts nothing (the chunk
/// counts as dropped) and a dropped receiver is a fatal disconnect.
#[derive(Debug)]
pub struct ChannelSink<T> {
    name: String,
    sender: Sender<Vec<T>>,
}

impl<T> ChannelSink<T> {
    /// Creates a new channel sink with the given sender
    pub fn new(sender: Sender<Vec<T>>) -> Self {
        Self::with_name("channel", sender)
    }

    /// Creates a new channel sink with a custom name
    pub fn with_name(name: impl Into<String>, sender: Sender<Vec<T>>) -> Self {
        Self {
            name: name.into(),
            sender,
        }
    }
}

impl<T: Copy + Send> Sink<T> for ChannelSink<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn write_chunk(&self, chunk: &[T]) -> Result<usize, SinkError> {
        match self.sender.try_send(chunk.to_vec()) {
            Ok(()) => Ok(chunk.len()),
            Err(TrySendError::Full(_)) => {
                debug!("Channel sink '{}' full, dropping chunk", self.name);
                Ok(0)
            }
            Err(TrySendError::Disconnected(_)) => {
                Err(SinkError::disconnected("channel receiver dropped"))
            }
        }
    }
}
