//! Line-based command protocol, one task per connection.
//!
//! Grammar: `exchange <N>` with `1 <= N <= 10`. Each line gets exactly one
//! newline-terminated reply: a JSON array on success, plain text otherwise.

use super::audit::AuditLog;
use crate::aggregator::ExchangeAggregator;
use crate::core::{DayCount, DayCountError};
use anyhow::{Context, Result};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tracing::{debug, info, instrument, warn};

pub const EXCHANGE_KEYWORD: &str = "exchange";

/// Longest accepted command line, excluding the newline.
pub const MAX_LINE_BYTES: usize = 1024;

/// One line read from the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// Decoded text; invalid UTF-8 is replaced rather than rejected.
    Text(String),
    /// More than `MAX_LINE_BYTES` before the newline. The rest of the line is discarded.
    TooLong,
}

/// Reads the next line, holding at most `MAX_LINE_BYTES + 1` bytes of it in memory.
/// Returns `None` at end of stream.
pub async fn read_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<Option<Line>>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let read = (&mut *reader)
        .take(MAX_LINE_BYTES as u64 + 1)
        .read_until(b'\n', buf)
        .await?;
    if read == 0 {
        return Ok(None);
    }

    if buf.last() != Some(&b'\n') && read > MAX_LINE_BYTES {
        skip_past_newline(reader).await?;
        return Ok(Some(Line::TooLong));
    }

    Ok(Some(Line::Text(String::from_utf8_lossy(buf).into_owned())))
}

async fn skip_past_newline<R>(reader: &mut R) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let chunk = reader.fill_buf().await?;
        if chunk.is_empty() {
            return Ok(());
        }
        match chunk.iter().position(|b| *b == b'\n') {
            Some(pos) => {
                reader.consume(pos + 1);
                return Ok(());
            }
            None => {
                let len = chunk.len();
                reader.consume(len);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Exchange(DayCount),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Unknown command.")]
    UnknownCommand,
    #[error(transparent)]
    Days(#[from] DayCountError),
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.split_whitespace();
        if parts.next() != Some(EXCHANGE_KEYWORD) {
            return Err(CommandError::UnknownCommand);
        }
        match (parts.next(), parts.next()) {
            (Some(days), None) => Ok(Command::Exchange(days.parse()?)),
            _ => Err(DayCountError::InvalidDayCount.into()),
        }
    }
}

/// Outcome of one command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub body: String,
    /// Only successfully processed commands are written to the audit log.
    pub audit: bool,
}

/// Shared per-server state; each session holds a cheap clone.
#[derive(Clone)]
pub struct CommandHandler {
    aggregator: Arc<ExchangeAggregator>,
    audit_log: Arc<AuditLog>,
}

impl CommandHandler {
    pub fn new(aggregator: Arc<ExchangeAggregator>, audit_log: Arc<AuditLog>) -> Self {
        CommandHandler {
            aggregator,
            audit_log,
        }
    }

    pub async fn execute(&self, line: &str) -> Result<Reply> {
        match line.parse::<Command>() {
            Ok(Command::Exchange(days)) => {
                let report = self.aggregator.aggregate(days).await;
                let body =
                    serde_json::to_string(&report).context("Failed to serialize exchange report")?;
                Ok(Reply { body, audit: true })
            }
            Err(e) => {
                debug!(command = %line, error = %e, "Rejected command");
                Ok(Reply {
                    body: e.to_string(),
                    audit: false,
                })
            }
        }
    }

    /// Serves commands until the peer closes the connection.
    #[instrument(name = "Session", skip(self, stream))]
    pub async fn run<S>(&self, stream: S, peer: &str) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        info!("Client connected");
        let (reader, mut writer) = tokio::io::split(stream);
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::with_capacity(MAX_LINE_BYTES + 1);

        while let Some(line) = read_line(&mut reader, &mut buf).await? {
            let (reply, command) = match line {
                Line::TooLong => {
                    warn!(limit = MAX_LINE_BYTES, "Discarded overlong command line");
                    let reply = Reply {
                        body: CommandError::UnknownCommand.to_string(),
                        audit: false,
                    };
                    (reply, None)
                }
                Line::Text(text) => {
                    let command = text.trim();
                    if command.is_empty() {
                        continue;
                    }
                    debug!(%command, "Received command");
                    (self.execute(command).await?, Some(command.to_string()))
                }
            };

            writer.write_all(reply.body.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;

            if let Some(command) = command.filter(|_| reply.audit) {
                self.audit_log.record(&command).await;
            }
        }

        info!("Client disconnected");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::tests::StubSource;
    use std::sync::atomic::Ordering;
    use tempfile::{TempDir, tempdir};
    use tokio::io::{AsyncReadExt, duplex};

    struct Fixture {
        handler: CommandHandler,
        source: Arc<StubSource>,
        audit_path: std::path::PathBuf,
        _dir: TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let audit_path = dir.path().join("exchange.log");
        let source = Arc::new(StubSource::default());
        let aggregator = Arc::new(ExchangeAggregator::new(
            source.clone(),
            vec!["EUR".to_string(), "USD".to_string()],
            3,
        ));
        let handler = CommandHandler::new(aggregator, Arc::new(AuditLog::new(&audit_path)));
        Fixture {
            handler,
            source,
            audit_path,
            _dir: dir,
        }
    }

    fn audit_lines(fixture: &Fixture) -> Vec<String> {
        std::fs::read_to_string(&fixture.audit_path)
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Sends `input` over an in-memory connection and returns everything written back.
    async fn converse(fixture: &Fixture, input: impl AsRef<[u8]>) -> String {
        let (mut client, server) = duplex(64 * 1024);
        client.write_all(input.as_ref()).await.unwrap();
        client.shutdown().await.unwrap();

        fixture.handler.run(server, "test-peer").await.unwrap();

        let mut output = String::new();
        client.read_to_string(&mut output).await.unwrap();
        output
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            "exchange 3".parse::<Command>(),
            Ok(Command::Exchange(DayCount::new(3).unwrap()))
        );
        assert_eq!(
            "  exchange   10 ".parse::<Command>(),
            Ok(Command::Exchange(DayCount::new(10).unwrap()))
        );
        assert_eq!(
            "exchange 15".parse::<Command>(),
            Err(CommandError::Days(DayCountError::OutOfRange))
        );
        assert_eq!(
            "exchange abc".parse::<Command>(),
            Err(CommandError::Days(DayCountError::InvalidDayCount))
        );
        assert_eq!(
            "exchange".parse::<Command>(),
            Err(CommandError::Days(DayCountError::InvalidDayCount))
        );
        assert_eq!(
            "exchange 1 2".parse::<Command>(),
            Err(CommandError::Days(DayCountError::InvalidDayCount))
        );
        assert_eq!("ping".parse::<Command>(), Err(CommandError::UnknownCommand));
        assert_eq!(
            "exchanges 3".parse::<Command>(),
            Err(CommandError::UnknownCommand)
        );
    }

    #[tokio::test]
    async fn test_exchange_three_days() {
        let fixture = fixture();

        let output = converse(&fixture, "exchange 3\n").await;

        let value: serde_json::Value = serde_json::from_str(output.trim_end()).unwrap();
        let items = value.as_array().unwrap();
        assert_eq!(items.len(), 3);

        let today = crate::core::DateKey::today();
        for (offset, item) in items.iter().enumerate() {
            let key = today.days_before(offset as u64).unwrap().to_string();
            assert_eq!(item[&key]["USD"]["sale"], 37.9879);
            assert_eq!(item[&key]["EUR"]["purchase"], 41.1201);
        }

        assert_eq!(fixture.source.calls.load(Ordering::SeqCst), 3);
        let lines = audit_lines(&fixture);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with(": exchange 3"));
    }

    #[tokio::test]
    async fn test_out_of_range_is_rejected_without_fetch() {
        let fixture = fixture();

        let output = converse(&fixture, "exchange 15\n").await;

        assert_eq!(output, "Error: Number of days should be between 1 and 10.\n");
        assert_eq!(fixture.source.calls.load(Ordering::SeqCst), 0);
        assert!(audit_lines(&fixture).is_empty());
    }

    #[tokio::test]
    async fn test_invalid_day_count() {
        let fixture = fixture();

        let output = converse(&fixture, "exchange abc\n").await;

        assert_eq!(output, "Error: Invalid number of days.\n");
        assert_eq!(fixture.source.calls.load(Ordering::SeqCst), 0);
        assert!(audit_lines(&fixture).is_empty());
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let fixture = fixture();

        let output = converse(&fixture, "ping\n").await;

        assert_eq!(output, "Unknown command.\n");
        assert_eq!(fixture.source.calls.load(Ordering::SeqCst), 0);
        assert!(audit_lines(&fixture).is_empty());
    }

    #[tokio::test]
    async fn test_connection_survives_errors() {
        let fixture = fixture();

        let output = converse(&fixture, "ping\r\n\nexchange 0\nexchange 1\n").await;

        let replies: Vec<&str> = output.lines().collect();
        assert_eq!(replies.len(), 3);
        assert_eq!(replies[0], "Unknown command.");
        assert_eq!(
            replies[1],
            "Error: Number of days should be between 1 and 10."
        );
        assert!(replies[2].starts_with('['));
        assert_eq!(fixture.source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(audit_lines(&fixture).len(), 1);
    }

    #[tokio::test]
    async fn test_non_utf8_line_is_unknown_command() {
        let fixture = fixture();

        let output = converse(&fixture, b"\xff\xfe\nping\n").await;

        assert_eq!(output, "Unknown command.\nUnknown command.\n");
        assert_eq!(fixture.source.calls.load(Ordering::SeqCst), 0);
        assert!(audit_lines(&fixture).is_empty());
    }

    #[tokio::test]
    async fn test_overlong_line_is_discarded_and_session_continues() {
        let fixture = fixture();
        let input = format!(
            "exchange {}\nexchange 1\n",
            "1".repeat(MAX_LINE_BYTES * 4)
        );

        let output = converse(&fixture, input).await;

        let replies: Vec<&str> = output.lines().collect();
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0], "Unknown command.");
        assert!(replies[1].starts_with('['));
        assert_eq!(fixture.source.calls.load(Ordering::SeqCst), 1);
        let lines = audit_lines(&fixture);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with(": exchange 1"));
    }

    #[tokio::test]
    async fn test_read_line_limits() {
        let exact = format!("{}\n", "a".repeat(MAX_LINE_BYTES));
        let input = format!("{exact}{}\nlast", "b".repeat(MAX_LINE_BYTES + 1));
        let mut reader = BufReader::new(input.as_bytes());
        let mut buf = Vec::new();

        assert_eq!(
            read_line(&mut reader, &mut buf).await.unwrap(),
            Some(Line::Text(exact))
        );
        assert_eq!(
            read_line(&mut reader, &mut buf).await.unwrap(),
            Some(Line::TooLong)
        );
        assert_eq!(
            read_line(&mut reader, &mut buf).await.unwrap(),
            Some(Line::Text("last".to_string()))
        );
        assert_eq!(read_line(&mut reader, &mut buf).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_all_fetches_failing_yields_empty_array() {
        let dir = tempdir().unwrap();
        let mut source = StubSource::default();
        let today = crate::core::DateKey::today();
        for offset in 0..2 {
            source.overrides.insert(
                today.days_before(offset).unwrap(),
                Err(crate::core::FetchError::BadStatus(404)),
            );
        }
        let aggregator = Arc::new(ExchangeAggregator::new(
            Arc::new(source),
            vec!["EUR".to_string(), "USD".to_string()],
            2,
        ));
        let audit_path = dir.path().join("exchange.log");
        let handler = CommandHandler::new(aggregator, Arc::new(AuditLog::new(&audit_path)));

        let reply = handler.execute("exchange 2").await.unwrap();

        assert_eq!(reply.body, "[]");
        assert!(reply.audit);
    }
}
