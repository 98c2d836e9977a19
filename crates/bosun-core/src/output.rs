//! Per-request output streaming.
//!
//! Every build request carries an [`OutputSink`]; the orchestrator, the VCS
//! client, and the script runner all write progress lines to it. The receiving
//! half is owned by the RPC layer, which forwards lines to the master.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Which stream a line belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// One line of build output, without the trailing newline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: StreamKind,
    pub line: String,
}

/// Cloneable sink for one request's output.
///
/// Sends never block and never fail the build: if the receiver is gone the
/// line is dropped, matching a master that has stopped listening.
#[derive(Debug, Clone)]
pub struct OutputSink {
    tx: mpsc::UnboundedSender<OutputLine>,
}

impl OutputSink {
    /// Create a sink and the receiver the RPC layer drains.
    pub fn channel() -> (OutputSink, mpsc::UnboundedReceiver<OutputLine>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (OutputSink { tx }, rx)
    }

    pub fn send(&self, stream: StreamKind, line: impl Into<String>) {
        let _ = self.tx.send(OutputLine {
            stream,
            line: line.into(),
        });
    }

    pub fn stdout(&self, line: impl Into<String>) {
        self.send(StreamKind::Stdout, line);
    }

    pub fn stderr(&self, line: impl Into<String>) {
        self.send(StreamKind::Stderr, line);
    }
}

/// Forward every line read from `reader` to `sink` until EOF.
///
/// Used for subprocess stdout/stderr pipes.
pub(crate) fn forward_lines<R>(
    reader: R,
    stream: StreamKind,
    sink: OutputSink,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            sink.send(stream, line);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sink_delivers_lines_in_order() {
        let (sink, mut rx) = OutputSink::channel();
        sink.stdout("first");
        sink.stderr("second");

        let a = rx.recv().await.unwrap();
        assert_eq!(a.stream, StreamKind::Stdout);
        assert_eq!(a.line, "first");

        let b = rx.recv().await.unwrap();
        assert_eq!(b.stream, StreamKind::Stderr);
        assert_eq!(b.line, "second");
    }

    #[tokio::test]
    async fn send_after_receiver_dropped_is_silent() {
        let (sink, rx) = OutputSink::channel();
        drop(rx);
        sink.stdout("nobody listens");
    }

    #[tokio::test]
    async fn forward_lines_splits_on_newlines() {
        let (sink, mut rx) = OutputSink::channel();
        let data: &[u8] = b"one\ntwo\n";
        forward_lines(data, StreamKind::Stdout, sink)
            .await
            .unwrap();

        assert_eq!(rx.recv().await.unwrap().line, "one");
        assert_eq!(rx.recv().await.unwrap().line, "two");
    }
}
