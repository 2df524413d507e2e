use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::Bytes;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio_util::sync::PollSender;

/// What the producer pushes into the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Data(Bytes),
    /// Sent exactly once, after the last byte
    End,
}

/// Create a bounded producer channel.
///
/// When the pipeline stops draining (all upload permits taken) the channel
/// fills and writes to the sink return `Pending`, which pauses the producer.
pub fn stream_channel(capacity: usize) -> (ArchiveSink, mpsc::Receiver<StreamEvent>) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (ArchiveSink::new(sender), receiver)
}

/// `AsyncWrite` front of the upload pipeline.
///
/// Every write becomes one `Data` event and `shutdown` sends `End`. Dropping
/// the sink without shutting it down closes the channel without `End`, which
/// the pipeline treats as a failed producer.
pub struct ArchiveSink {
    sender: PollSender<StreamEvent>,
    bytes_written: u64,
    ended: bool,
}

impl ArchiveSink {
    fn new(sender: mpsc::Sender<StreamEvent>) -> Self {
        Self {
            sender: PollSender::new(sender),
            bytes_written: 0,
            ended: false,
        }
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    fn poll_send(&mut self, cx: &mut Context<'_>, event: StreamEvent) -> Poll<io::Result<()>> {
        if let Err(e) = ready!(self.sender.poll_reserve(cx)) {
            return Poll::Ready(Err(broken_pipe(e)));
        }
        self.sender.send_item(event).map_err(broken_pipe)?;
        Poll::Ready(Ok(()))
    }
}

fn broken_pipe<E: std::fmt::Display>(e: E) -> io::Error {
    io::Error::new(
        io::ErrorKind::BrokenPipe,
        format!("Upload channel closed: {}", e),
    )
}

impl AsyncWrite for ArchiveSink {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if this.ended {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "write after end of stream",
            )));
        }
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }

        ready!(this.poll_send(cx, StreamEvent::Data(Bytes::copy_from_slice(buf))))?;
        this.bytes_written += buf.len() as u64;
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        // Each write is already a complete event
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.ended {
            return Poll::Ready(Ok(()));
        }

        ready!(this.poll_send(cx, StreamEvent::End))?;
        this.ended = true;
        this.sender.close();
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_writes_become_events_then_end() {
        let (mut sink, mut events) = stream_channel(8);
        sink.write_all(b"hello ").await.unwrap();
        sink.write_all(b"world").await.unwrap();
        sink.shutdown().await.unwrap();
        assert_eq!(sink.bytes_written(), 11);
        drop(sink);

        assert_eq!(events.recv().await, Some(StreamEvent::Data(Bytes::from_static(b"hello "))));
        assert_eq!(events.recv().await, Some(StreamEvent::Data(Bytes::from_static(b"world"))));
        assert_eq!(events.recv().await, Some(StreamEvent::End));
        assert_eq!(events.recv().await, None);
    }

    #[tokio::test]
    async fn test_drop_without_shutdown_sends_no_end() {
        let (mut sink, mut events) = stream_channel(8);
        sink.write_all(b"partial").await.unwrap();
        drop(sink);

        assert!(matches!(events.recv().await, Some(StreamEvent::Data(_))));
        assert_eq!(events.recv().await, None);
    }

    #[tokio::test]
    async fn test_write_fails_once_receiver_is_gone() {
        let (mut sink, events) = stream_channel(1);
        drop(events);

        let err = sink.write_all(b"data").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn test_full_channel_applies_backpressure() {
        let (mut sink, mut events) = stream_channel(1);
        sink.write_all(b"first").await.unwrap();

        let blocked = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            sink.write_all(b"second"),
        )
        .await;
        assert!(blocked.is_err(), "write should wait for the consumer");

        assert!(matches!(events.recv().await, Some(StreamEvent::Data(_))));
        sink.write_all(b"second").await.unwrap();
    }
}
