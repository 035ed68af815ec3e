//! Connection driver
//!
//! Feeds a [`Session`] from a real transport. [`run_session`] connects,
//! spawns the writer task, pumps inbound bytes into the session and, when
//! the transport closes, waits the configured fixed delay and connects
//! again until shut down.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::timeout;

use crate::config::SessionConfig;
use crate::error::{IndiError, IndiResult};
use crate::session::Session;
use crate::INDI_DEFAULT_PORT;

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Opens the duplex text channel to the server
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> IndiResult<(BoxedReader, BoxedWriter)>;

    /// Human readable endpoint for logs
    fn describe(&self) -> String;
}

/// Direct TCP link to an INDI server
#[derive(Debug, Clone)]
pub struct TcpConnector {
    host: String,
    port: u16,
    connect_timeout: Duration,
}

impl TcpConnector {
    pub fn new(host: &str, port: Option<u16>) -> Self {
        Self {
            host: host.to_string(),
            port: port.unwrap_or(INDI_DEFAULT_PORT),
            connect_timeout: Duration::from_secs(3),
        }
    }

    /// Connector using the session's connection timeout
    pub fn from_config(host: &str, port: Option<u16>, config: &SessionConfig) -> Self {
        Self::new(host, port).with_timeout(config.connection_timeout())
    }

    pub fn with_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self) -> IndiResult<(BoxedReader, BoxedWriter)> {
        let addr = format!("{}:{}", self.host, self.port);

        let stream = match timeout(self.connect_timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(IndiError::ConnectionFailed(format!(
                    "Failed to connect to INDI server at {}: {}",
                    addr, e
                )));
            }
            Err(_) => {
                return Err(IndiError::ConnectionTimeout {
                    host: self.host.clone(),
                    port: self.port,
                    duration: self.connect_timeout,
                });
            }
        };

        let (read_half, write_half) = stream.into_split();
        let reader: BoxedReader = Box::new(read_half);
        let writer: BoxedWriter = Box::new(write_half);
        Ok((reader, writer))
    }

    fn describe(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Writes each queued message followed by a newline
async fn writer_task(mut writer: BoxedWriter, mut rx: mpsc::Receiver<String>) {
    while let Some(text) = rx.recv().await {
        if let Err(e) = writer.write_all(text.as_bytes()).await {
            tracing::error!("INDI write error: {}", e);
            break;
        }
        if let Err(e) = writer.write_all(b"\n").await {
            tracing::error!("INDI write error: {}", e);
            break;
        }
        if let Err(e) = writer.flush().await {
            tracing::error!("INDI flush error: {}", e);
            break;
        }
    }
}

/// Decode as much of `carry` as is valid UTF-8, keeping a trailing partial
/// sequence for the next read. Invalid bytes become U+FFFD.
fn take_utf8(carry: &mut Vec<u8>) -> String {
    let mut text = String::new();
    loop {
        match std::str::from_utf8(carry) {
            Ok(s) => {
                text.push_str(s);
                carry.clear();
                return text;
            }
            Err(e) => {
                let valid = e.valid_up_to();
                match e.error_len() {
                    // Sequence cut by the read boundary
                    None => {
                        text.push_str(&String::from_utf8_lossy(&carry[..valid]));
                        carry.drain(..valid);
                        return text;
                    }
                    Some(len) => {
                        text.push_str(&String::from_utf8_lossy(&carry[..valid + len]));
                        carry.drain(..valid + len);
                    }
                }
            }
        }
    }
}

/// Pump inbound bytes into the session. Returns true on a clean close (EOF).
async fn read_loop(mut reader: BoxedReader, session: &Mutex<Session>, chunk_size: usize) -> bool {
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut carry: Vec<u8> = Vec::new();
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => return true,
            Ok(n) => {
                carry.extend_from_slice(&buf[..n]);
                let text = take_utf8(&mut carry);
                if !text.is_empty() {
                    session.lock().await.handle_chunk(&text);
                }
            }
            Err(e) => {
                tracing::warn!("INDI read error: {}", e);
                return false;
            }
        }
    }
}

/// Drive `session` over connections from `connector` until `shutdown` fires
pub async fn run_session<C>(
    session: Arc<Mutex<Session>>,
    connector: Arc<C>,
    mut shutdown: oneshot::Receiver<()>,
) where
    C: Connector + ?Sized + 'static,
{
    let endpoint = connector.describe();
    loop {
        let (delay, chunk_size) = {
            let mut s = session.lock().await;
            s.begin_connect();
            (s.config().reconnect_delay(), s.config().read_chunk_size)
        };

        let attempt = tokio::select! {
            result = connector.connect() => result,
            _ = &mut shutdown => {
                tracing::info!("INDI session for {} received shutdown signal", endpoint);
                session.lock().await.handle_close(true);
                return;
            }
        };

        match attempt {
            Ok((reader, writer)) => {
                let (tx, rx) = mpsc::channel::<String>(100);
                let writer_handle = tokio::spawn(writer_task(writer, rx));
                session.lock().await.handle_open(tx);
                tracing::info!("Connected to INDI server at {}", endpoint);

                let clean = tokio::select! {
                    clean = read_loop(reader, &session, chunk_size) => clean,
                    _ = &mut shutdown => {
                        tracing::info!("INDI session for {} received shutdown signal", endpoint);
                        session.lock().await.handle_close(true);
                        writer_handle.abort();
                        return;
                    }
                };
                session.lock().await.handle_close(clean);
                writer_handle.abort();
            }
            Err(e) => {
                tracing::warn!("{}", e);
                session.lock().await.handle_close(false);
            }
        }

        tracing::warn!("Reconnecting to INDI server at {} in {:?}", endpoint, delay);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = &mut shutdown => {
                tracing::info!("INDI session for {} received shutdown signal", endpoint);
                return;
            }
        }
    }
}
