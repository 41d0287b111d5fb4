//! Newline-delimited JSON feed.
//!
//! Reads one node status record per line from an async byte stream. This is
//! used for TCP relays and for replaying captured records.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tracing::debug;

use super::{Feed, FeedEvent, FEED_BUFFER};
use crate::error::IotopError;

impl Feed {
    /// Spawn a background task that reads records from the given reader.
    ///
    /// Lines that are not valid JSON are forwarded as [`IotopError::Decode`]
    /// so the ingest loop can apply its decode policy. Read errors are
    /// forwarded as [`IotopError::Feed`] and stop the task; EOF closes the
    /// channel.
    ///
    /// ```
    /// use std::io::Cursor;
    /// use sensorbee_iotop::Feed;
    ///
    /// # tokio_test::block_on(async {
    /// let data = b"{\"node_name\":\"src\",\"node_type\":\"source\",\"ts\":1}\n";
    /// let mut feed = Feed::spawn_lines(Cursor::new(data.to_vec()), "replay");
    /// assert!(feed.recv().await.unwrap().is_ok());
    /// assert!(feed.recv().await.is_none());
    /// # });
    /// ```
    pub fn spawn_lines<R>(reader: R, description: &str) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<FeedEvent>(FEED_BUFFER);

        tokio::spawn(async move {
            let mut reader = BufReader::new(reader);
            let mut line = String::new();

            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => {
                        debug!("line feed reached end of stream");
                        break;
                    }
                    Ok(_) => {
                        let trimmed = line.trim();
                        if trimmed.is_empty() {
                            continue;
                        }
                        let event = serde_json::from_str(trimmed).map_err(IotopError::from);
                        if tx.send(event).await.is_err() {
                            // Receiver dropped
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(IotopError::Feed(format!("read error, {}", e)))).await;
                        break;
                    }
                }
            }
        });

        Self::new(rx, format!("stream: {}", description))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_json() -> &'static str {
        r#"{"node_name":"src","node_type":"source","state":"running","ts":1}"#
    }

    #[tokio::test]
    async fn test_spawn_lines_forwards_records() {
        let data = format!("{}\n\n{}\n", sample_json(), sample_json());
        let mut feed = Feed::spawn_lines(Cursor::new(data), "test");

        let first = feed.recv().await.unwrap().unwrap();
        assert_eq!(first["node_name"], "src");
        assert!(feed.recv().await.unwrap().is_ok());

        // EOF closes the channel
        assert!(feed.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_spawn_lines_invalid_json() {
        let mut feed = Feed::spawn_lines(Cursor::new("not valid json\n"), "test");
        let event = feed.recv().await.unwrap();
        assert!(matches!(event, Err(IotopError::Decode(_))));
    }

    #[tokio::test]
    async fn test_spawn_lines_description() {
        let feed = Feed::spawn_lines(Cursor::new(""), "localhost:9090");
        assert_eq!(feed.description(), "stream: localhost:9090");
    }
}
