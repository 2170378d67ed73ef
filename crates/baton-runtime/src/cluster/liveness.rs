use std::time::Duration;

use baton_core::protocol::{decode_line, DELIMITER, MAX_FRAME_LEN};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

/// State of a watched connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Open,
    Closed,
}

/// Why a connection transitioned to [`LinkState::Closed`].
#[derive(Debug)]
pub enum CloseReason {
    /// The remote side closed the stream.
    Eof,
    /// Nothing arrived within the idle timeout.
    IdleTimeout,
    /// Any other read error.
    Io(std::io::Error),
    /// Local cancellation.
    Shutdown,
}

impl CloseReason {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::IdleTimeout)
    }

    /// Log the close the way every owner of a link does.
    pub fn log(&self, who: &dyn std::fmt::Display) {
        match self {
            Self::Eof => tracing::info!("{} disconnected", who),
            Self::IdleTimeout => tracing::info!("{} idle timeout", who),
            Self::Io(e) => tracing::warn!("{} read error: {}", who, e),
            Self::Shutdown => tracing::debug!("{} closed on shutdown", who),
        }
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Eof => write!(f, "end of stream"),
            Self::IdleTimeout => write!(f, "idle timeout"),
            Self::Io(e) => write!(f, "io error: {}", e),
            Self::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// Read-deadline policy.
///
/// The deadline is reset to `now + idle_timeout` before every read, so a
/// link only dies after `idle_timeout` of complete silence.
#[derive(Debug, Clone, Copy)]
pub struct LivenessMonitor {
    idle_timeout: Duration,
}

impl LivenessMonitor {
    pub fn new(idle_timeout: Duration) -> Self {
        Self { idle_timeout }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Read one delimited frame into `buf`, bounded by the idle timeout.
    ///
    /// A frame longer than [`MAX_FRAME_LEN`] closes the link with
    /// [`CloseReason::Io`] instead of growing `buf` further.
    pub async fn read_frame<R>(&self, reader: &mut R, buf: &mut Vec<u8>) -> Result<(), CloseReason>
    where
        R: AsyncBufRead + Unpin,
    {
        buf.clear();
        let mut frame = (&mut *reader).take(MAX_FRAME_LEN as u64);
        match tokio::time::timeout(self.idle_timeout, frame.read_until(DELIMITER, buf)).await {
            Err(_) => Err(CloseReason::IdleTimeout),
            Ok(Ok(0)) => Err(CloseReason::Eof),
            Ok(Ok(n)) if n >= MAX_FRAME_LEN && buf.last() != Some(&DELIMITER) => {
                Err(CloseReason::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("frame exceeds {} bytes", MAX_FRAME_LEN),
                )))
            }
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(CloseReason::Io(e)),
        }
    }
}

/// A buffered reader watched by a [`LivenessMonitor`].
///
/// `Closed` is terminal: once a read fails the link never reads again.
pub struct MonitoredLink<R> {
    reader: R,
    monitor: LivenessMonitor,
    state: LinkState,
    buf: Vec<u8>,
}

impl<R> MonitoredLink<R>
where
    R: AsyncBufRead + Unpin,
{
    pub fn new(reader: R, monitor: LivenessMonitor) -> Self {
        Self {
            reader,
            monitor,
            state: LinkState::Open,
            buf: Vec::with_capacity(64),
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Read the next line.
    ///
    /// A frame cut short by EOF is still returned as a line; the following
    /// call reports the EOF.
    pub async fn next_line(&mut self) -> Result<String, CloseReason> {
        if self.state == LinkState::Closed {
            return Err(CloseReason::Eof);
        }

        match self.monitor.read_frame(&mut self.reader, &mut self.buf).await {
            Ok(()) => Ok(decode_line(&self.buf)),
            Err(reason) => {
                self.state = LinkState::Closed;
                Err(reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncWriteExt, BufReader};

    #[tokio::test]
    async fn test_reads_lines_while_data_flows() {
        let (client, server) = tokio::io::duplex(64);
        let mut link = MonitoredLink::new(
            BufReader::new(server),
            LivenessMonitor::new(Duration::from_millis(500)),
        );

        let mut client = client;
        client.write_all(b"ping\nhello world\n").await.unwrap();

        assert_eq!(link.next_line().await.unwrap(), "ping");
        assert_eq!(link.next_line().await.unwrap(), "hello world");
        assert_eq!(link.state(), LinkState::Open);
    }

    #[tokio::test]
    async fn test_silence_closes_with_timeout() {
        let (_client, server) = tokio::io::duplex(64);
        let mut link = MonitoredLink::new(
            BufReader::new(server),
            LivenessMonitor::new(Duration::from_millis(50)),
        );

        let started = std::time::Instant::now();
        let reason = link.next_line().await.unwrap_err();
        assert!(reason.is_timeout());
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert_eq!(link.state(), LinkState::Closed);
    }

    #[tokio::test]
    async fn test_deadline_resets_on_each_read() {
        let (mut client, server) = tokio::io::duplex(64);
        let mut link = MonitoredLink::new(
            BufReader::new(server),
            LivenessMonitor::new(Duration::from_millis(150)),
        );

        let writer = tokio::spawn(async move {
            for _ in 0..4 {
                tokio::time::sleep(Duration::from_millis(60)).await;
                client.write_all(b"ping\n").await.unwrap();
            }
            client
        });

        // Total elapsed exceeds the timeout, but no single gap does.
        for _ in 0..4 {
            assert_eq!(link.next_line().await.unwrap(), "ping");
        }
        let _client = writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_eof_closes_and_stays_closed() {
        let (client, server) = tokio::io::duplex(64);
        let mut link = MonitoredLink::new(
            BufReader::new(server),
            LivenessMonitor::new(Duration::from_secs(5)),
        );
        drop(client);

        assert!(matches!(link.next_line().await, Err(CloseReason::Eof)));
        assert_eq!(link.state(), LinkState::Closed);
        assert!(matches!(link.next_line().await, Err(CloseReason::Eof)));
    }

    #[tokio::test]
    async fn test_oversized_frame_closes_link() {
        let (mut client, server) = tokio::io::duplex(1024);
        let mut link = MonitoredLink::new(
            BufReader::new(server),
            LivenessMonitor::new(Duration::from_secs(5)),
        );

        let writer = tokio::spawn(async move {
            let chunk = vec![b'x'; 1024];
            // Keep writing until the reader hangs up.
            while client.write_all(&chunk).await.is_ok() {}
        });

        match link.next_line().await {
            Err(CloseReason::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::InvalidData),
            other => panic!("expected oversized frame error, got {:?}", other),
        }
        assert_eq!(link.state(), LinkState::Closed);

        drop(link);
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_frame_at_limit_is_accepted() {
        let (mut client, server) = tokio::io::duplex(1024);
        let mut link = MonitoredLink::new(
            BufReader::new(server),
            LivenessMonitor::new(Duration::from_secs(5)),
        );

        let writer = tokio::spawn(async move {
            let mut frame = vec![b'y'; MAX_FRAME_LEN - 1];
            frame.push(b'\n');
            client.write_all(&frame).await.unwrap();
            client.write_all(b"ping\n").await.unwrap();
            client
        });

        assert_eq!(link.next_line().await.unwrap().len(), MAX_FRAME_LEN - 1);
        assert_eq!(link.next_line().await.unwrap(), "ping");
        let _client = writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_partial_line_before_eof() {
        let (mut client, server) = tokio::io::duplex(64);
        let mut link = MonitoredLink::new(
            BufReader::new(server),
            LivenessMonitor::new(Duration::from_secs(5)),
        );
        client.write_all(b"no newline").await.unwrap();
        drop(client);

        assert_eq!(link.next_line().await.unwrap(), "no newline");
        assert!(matches!(link.next_line().await, Err(CloseReason::Eof)));
    }

    #[test]
    fn test_close_reason_display() {
        assert_eq!(CloseReason::IdleTimeout.to_string(), "idle timeout");
        assert_eq!(CloseReason::Eof.to_string(), "end of stream");
        assert!(!CloseReason::Shutdown.is_timeout());
    }
}
