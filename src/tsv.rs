//! Record stream reader for tab-separated gazetteer dumps.
//!
//! One producer splits a newline-delimited byte stream into field vectors
//! and fans them out to a configurable number of worker tasks over a
//! bounded channel, so the producer blocks whenever the workers are
//! saturated. Lines starting with `#` are skipped.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

/// Fan-out reader over tab-separated records.
pub struct TsvReader {
    workers: usize,
    channel_capacity: usize,
}

impl TsvReader {
    pub fn new(workers: usize, channel_capacity: usize) -> Self {
        Self {
            workers: workers.max(1),
            channel_capacity: channel_capacity.max(1),
        }
    }

    /// Read the stream to exhaustion, invoking `handler` exactly once per
    /// non-comment line. Returns the number of records dispatched.
    ///
    /// Handler invocation order matches input order only when the reader
    /// was built with a single worker. A read error on the underlying
    /// stream aborts remaining delivery and fails the whole call; the
    /// workers are still joined before returning.
    pub async fn run<S, H, Fut>(&self, stream: S, handler: H) -> Result<u64>
    where
        S: AsyncBufRead + Unpin + Send,
        H: Fn(Vec<String>) -> Fut + Clone + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let start = Instant::now();

        let (tx, rx) = mpsc::channel::<Vec<String>>(self.channel_capacity);
        let rx = Arc::new(Mutex::new(rx));

        let mut handles = Vec::with_capacity(self.workers);
        for _ in 0..self.workers {
            let rx = rx.clone();
            let handler = handler.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    let record = { rx.lock().await.recv().await };
                    match record {
                        Some(fields) => handler(fields).await,
                        None => break,
                    }
                }
            }));
        }

        let mut lines = stream.lines();
        let mut dispatched = 0u64;
        let mut read_error = None;

        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line.starts_with('#') {
                        debug!("skip comment line {}", line);
                        continue;
                    }
                    let fields: Vec<String> = line.split('\t').map(String::from).collect();
                    if tx.send(fields).await.is_err() {
                        break;
                    }
                    dispatched += 1;
                }
                Ok(None) => break,
                Err(e) => {
                    read_error = Some(e);
                    break;
                }
            }
        }

        // Closing the channel lets the workers drain and exit.
        drop(tx);
        for handle in handles {
            handle.await.context("record worker failed")?;
        }

        if let Some(e) = read_error {
            return Err(e).context("unable to properly read record stream");
        }

        debug!("dispatched {} records in {:?}", dispatched, start.elapsed());

        Ok(dispatched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::task::{Context as TaskContext, Poll};
    use tokio::io::{AsyncRead, BufReader, ReadBuf};

    #[tokio::test]
    async fn test_handler_runs_once_per_non_comment_line() {
        let data = b"us\t10001\tNew York\n# comment line\nus\t10002\tNew York\n";
        let count = Arc::new(AtomicU64::new(0));

        let reader = TsvReader::new(4, 8);
        let counter = count.clone();
        let dispatched = reader
            .run(BufReader::new(&data[..]), move |_fields| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            })
            .await
            .unwrap();

        assert_eq!(dispatched, 2);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_field_order_preserved_within_record() {
        let data = b"a\tb\tc\td\n";
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));

        let reader = TsvReader::new(1, 1);
        let sink = seen.clone();
        reader
            .run(BufReader::new(&data[..]), move |fields| {
                let sink = sink.clone();
                async move {
                    sink.lock().unwrap().push(fields);
                }
            })
            .await
            .unwrap();

        assert_eq!(seen.lock().unwrap()[0], vec!["a", "b", "c", "d"]);
    }

    #[tokio::test]
    async fn test_single_worker_preserves_line_order() {
        let mut data = String::new();
        for i in 0..100 {
            data.push_str(&format!("{}\tplace\n", i));
        }
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));

        let reader = TsvReader::new(1, 4);
        let sink = seen.clone();
        reader
            .run(BufReader::new(data.as_bytes()), move |fields| {
                let sink = sink.clone();
                async move {
                    sink.lock().unwrap().push(fields[0].clone());
                }
            })
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        let expected: Vec<String> = (0..100).map(|i| i.to_string()).collect();
        assert_eq!(*seen, expected);
    }

    /// Yields one complete line, then fails the read.
    struct FailingStream {
        sent: bool,
    }

    impl AsyncRead for FailingStream {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut TaskContext<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            if !self.sent {
                self.sent = true;
                buf.put_slice(b"us\t10001\tNew York\n");
                Poll::Ready(Ok(()))
            } else {
                Poll::Ready(Err(std::io::Error::other("stream torn down")))
            }
        }
    }

    #[tokio::test]
    async fn test_read_error_is_fatal() {
        let reader = TsvReader::new(2, 4);
        let result = reader
            .run(BufReader::new(FailingStream { sent: false }), |_fields| async {})
            .await;

        assert!(result.is_err());
    }
}
