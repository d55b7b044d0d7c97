use std::borrow::Cow;
use std::fmt;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

use crate::store::LogSink;
use crate::types::ExecutionId;

/// Which pipe a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamTag {
    Stdout,
    Stderr,
}

impl StreamTag {
    pub fn as_str(self) -> &'static str {
        match self {
            StreamTag::Stdout => "stdout",
            StreamTag::Stderr => "stderr",
        }
    }

    /// Message stored for one captured line: `[tag] line`.
    pub fn format_line(self, line: &str) -> String {
        format!("[{}] {line}", self.as_str())
    }
}

impl fmt::Display for StreamTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters for one finished drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub lines: u64,
    pub dropped: u64,
}

/// One captured line without its `\n` or `\r\n` terminator. Bytes that are
/// not valid UTF-8 become U+FFFD.
fn decode_line(raw: &[u8]) -> Cow<'_, str> {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw)
}

/// Copy `reader` into `sink` line by line until EOF.
///
/// A failed append drops that line with a warning and keeps going; a slow or
/// flaky sink never stops the process from being drained. Output is not
/// required to be UTF-8.
pub async fn drain<R>(
    reader: R,
    execution_id: ExecutionId,
    tag: StreamTag,
    sink: &dyn LogSink,
) -> DrainReport
where
    R: AsyncRead + Unpin,
{
    let mut report = DrainReport::default();
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(%execution_id, stream = %tag, error = %e, "read failed, stopping drain");
                break;
            }
        }
        let line = decode_line(&buf);
        report.lines += 1;
        tracing::debug!(%execution_id, stream = %tag, "{line}");

        if let Err(e) = sink.append(execution_id, &tag.format_line(&line)).await {
            report.dropped += 1;
            tracing::warn!(%execution_id, stream = %tag, error = %e, "dropping log line");
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use crate::store::MemoryStore;
    use crate::types::{LogLine, LogLineId};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, Ordering};

    async fn messages(store: &MemoryStore, id: ExecutionId) -> Vec<String> {
        store
            .lines(id)
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.message)
            .collect()
    }

    #[tokio::test]
    async fn each_line_is_tagged_and_ordered() {
        let store = MemoryStore::new();
        let id = ExecutionId(1);
        let input: &[u8] = b"alpha\nbeta\ngamma\n";

        let report = drain(input, id, StreamTag::Stdout, &store).await;

        assert_eq!(report, DrainReport { lines: 3, dropped: 0 });
        assert_eq!(
            messages(&store, id).await,
            vec!["[stdout] alpha", "[stdout] beta", "[stdout] gamma"]
        );
    }

    #[tokio::test]
    async fn trailing_line_without_newline_is_kept() {
        let store = MemoryStore::new();
        let id = ExecutionId(1);
        let input: &[u8] = b"first\nlast";

        drain(input, id, StreamTag::Stderr, &store).await;

        assert_eq!(
            messages(&store, id).await,
            vec!["[stderr] first", "[stderr] last"]
        );
    }

    #[tokio::test]
    async fn invalid_utf8_is_replaced_and_reading_continues() {
        let store = MemoryStore::new();
        let id = ExecutionId(1);
        let input: &[u8] = b"a\xffb\nafter\n";

        let report = drain(input, id, StreamTag::Stdout, &store).await;

        assert_eq!(report, DrainReport { lines: 2, dropped: 0 });
        assert_eq!(
            messages(&store, id).await,
            vec!["[stdout] a\u{FFFD}b", "[stdout] after"]
        );
    }

    #[tokio::test]
    async fn crlf_terminators_are_stripped() {
        let store = MemoryStore::new();
        let id = ExecutionId(1);
        let input: &[u8] = b"one\r\ntwo\r\n";

        drain(input, id, StreamTag::Stdout, &store).await;

        assert_eq!(
            messages(&store, id).await,
            vec!["[stdout] one", "[stdout] two"]
        );
    }

    #[tokio::test]
    async fn empty_stream_produces_nothing() {
        let store = MemoryStore::new();
        let input: &[u8] = b"";
        let report = drain(input, ExecutionId(1), StreamTag::Stdout, &store).await;
        assert_eq!(report, DrainReport::default());
    }

    /// Sink that rejects every other append.
    #[derive(Default)]
    struct FlakySink {
        calls: AtomicU64,
        inner: MemoryStore,
    }

    #[async_trait]
    impl LogSink for FlakySink {
        async fn append(&self, execution_id: ExecutionId, message: &str) -> Result<LogLineId> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n % 2 == 1 {
                return Err(Error::Persistence("sink unavailable".into()));
            }
            self.inner.append(execution_id, message).await
        }

        async fn lines(&self, execution_id: ExecutionId) -> Result<Vec<LogLine>> {
            self.inner.lines(execution_id).await
        }
    }

    #[tokio::test]
    async fn failed_appends_do_not_stop_the_drain() {
        let sink = FlakySink::default();
        let id = ExecutionId(5);
        let input: &[u8] = b"1\n2\n3\n4\n5\n";

        let report = drain(input, id, StreamTag::Stdout, &sink).await;

        assert_eq!(report, DrainReport { lines: 5, dropped: 2 });
        assert_eq!(
            messages(&sink.inner, id).await,
            vec!["[stdout] 1", "[stdout] 3", "[stdout] 5"]
        );
    }
}
