//! Write batching for the WebSocket → TCP direction.
//!
//! Flushing after every chunk serializes the pump behind OS buffer drains and
//! collapses throughput under load; never flushing leaves small MQTT control
//! packets (acks, pings) queued behind bulk payload for an unbounded time.
//! [`BatchedWriter`] applies the dual-threshold policy between those extremes:
//!
//! - flush once the pending count exceeds `flush_threshold`, or
//! - flush immediately after any chunk smaller than `small_packet_threshold`.
//!
//! In production the inner writer is a `tokio::io::BufWriter` over the TCP
//! write half, sized to the flush threshold, so `flush()` is a real hand-off
//! to the OS rather than a no-op.

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::trace;

/// A writer that counts bytes since the last flush and flushes per policy.
pub struct BatchedWriter<W> {
    inner: W,
    /// Bytes written since the last explicit flush.
    pending: usize,
    flush_threshold: usize,
    small_packet_threshold: usize,
}

impl<W: AsyncWrite + Unpin> BatchedWriter<W> {
    pub fn new(inner: W, flush_threshold: usize, small_packet_threshold: usize) -> Self {
        Self {
            inner,
            pending: 0,
            flush_threshold,
            small_packet_threshold,
        }
    }

    /// Write one chunk and flush if the policy calls for it.
    ///
    /// Empty chunks are skipped entirely: they carry no payload and must not
    /// trigger the small-packet flush.
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> std::io::Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        self.inner.write_all(chunk).await?;
        self.pending += chunk.len();

        // Small chunks are latency-sensitive control packets; big accumulations
        // are throughput. Both thresholds are strict comparisons.
        if chunk.len() < self.small_packet_threshold || self.pending > self.flush_threshold {
            trace!(
                pending = self.pending,
                chunk = chunk.len(),
                "flushing batched writes"
            );
            self.inner.flush().await?;
            self.pending = 0;
        }
        Ok(())
    }

    /// Flush any bytes still pending. Called when the inbound side ends cleanly.
    pub async fn finish(&mut self) -> std::io::Result<()> {
        if self.pending > 0 {
            self.inner.flush().await?;
            self.pending = 0;
        }
        Ok(())
    }

    /// Flush and shut down the inner writer.
    pub async fn shutdown(&mut self) -> std::io::Result<()> {
        self.inner.shutdown().await
    }

    /// Bytes written since the last flush.
    pub fn pending(&self) -> usize {
        self.pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    /// Records every write and flush so tests can assert on ordering.
    #[derive(Default)]
    struct RecordingWriter {
        written: Vec<u8>,
        flushes: Vec<usize>, // total bytes written at the time of each flush
    }

    impl AsyncWrite for RecordingWriter {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            self.written.extend_from_slice(buf);
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            let total = self.written.len();
            self.flushes.push(total);
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            self.poll_flush(cx)
        }
    }

    fn writer() -> BatchedWriter<RecordingWriter> {
        BatchedWriter::new(RecordingWriter::default(), 131072, 100)
    }

    #[tokio::test]
    async fn bytes_pass_through_in_order() {
        let mut w = writer();
        w.write_chunk(b"hello ").await.unwrap();
        w.write_chunk(b"mqtt ").await.unwrap();
        w.write_chunk(b"world").await.unwrap();
        w.finish().await.unwrap();
        assert_eq!(w.inner.written, b"hello mqtt world");
    }

    #[tokio::test]
    async fn bulk_chunks_under_threshold_do_not_flush() {
        let mut w = writer();
        w.write_chunk(&vec![0u8; 50000]).await.unwrap();
        w.write_chunk(&vec![0u8; 40000]).await.unwrap();
        assert!(w.inner.flushes.is_empty());
        assert_eq!(w.pending(), 90000);
    }

    #[tokio::test]
    async fn small_chunk_flushes_even_under_threshold() {
        // 50000 + 40000 + 60: cumulative 90060 is under the 131072 threshold,
        // but the 60-byte chunk is below the small-packet cutoff and must
        // flush immediately.
        let mut w = writer();
        w.write_chunk(&vec![0u8; 50000]).await.unwrap();
        w.write_chunk(&vec![0u8; 40000]).await.unwrap();
        w.write_chunk(&vec![0u8; 60]).await.unwrap();
        assert_eq!(w.inner.flushes, vec![90060]);
        assert_eq!(w.pending(), 0);
    }

    #[tokio::test]
    async fn crossing_threshold_flushes_on_that_write() {
        let mut w = writer();
        w.write_chunk(&vec![0u8; 100000]).await.unwrap();
        assert!(w.inner.flushes.is_empty());
        // 100000 + 40000 = 140000 > 131072
        w.write_chunk(&vec![0u8; 40000]).await.unwrap();
        assert_eq!(w.inner.flushes, vec![140000]);
        assert_eq!(w.pending(), 0);
    }

    #[tokio::test]
    async fn exactly_at_threshold_does_not_flush() {
        let mut w = BatchedWriter::new(RecordingWriter::default(), 1000, 100);
        w.write_chunk(&vec![0u8; 1000]).await.unwrap();
        assert!(w.inner.flushes.is_empty());
        w.write_chunk(&vec![0u8; 200]).await.unwrap();
        assert_eq!(w.inner.flushes, vec![1200]);
    }

    #[tokio::test]
    async fn counter_resets_after_flush() {
        let mut w = BatchedWriter::new(RecordingWriter::default(), 1000, 100);
        w.write_chunk(&vec![0u8; 1500]).await.unwrap(); // flush #1
        w.write_chunk(&vec![0u8; 500]).await.unwrap(); // pending 500, no flush
        assert_eq!(w.inner.flushes.len(), 1);
        assert_eq!(w.pending(), 500);
    }

    #[tokio::test]
    async fn finish_flushes_remainder_once() {
        let mut w = writer();
        w.write_chunk(&vec![0u8; 5000]).await.unwrap();
        w.finish().await.unwrap();
        assert_eq!(w.inner.flushes, vec![5000]);
        // Nothing pending: finish is a no-op
        w.finish().await.unwrap();
        assert_eq!(w.inner.flushes, vec![5000]);
    }

    #[tokio::test]
    async fn empty_chunk_is_skipped() {
        let mut w = writer();
        w.write_chunk(b"").await.unwrap();
        assert!(w.inner.written.is_empty());
        assert!(w.inner.flushes.is_empty());
        assert_eq!(w.pending(), 0);
    }
}
