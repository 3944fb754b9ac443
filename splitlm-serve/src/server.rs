//! TCP server implementation
//!
//! Provides the [`Server`] builder for wiring a generator to a listener.
//! Each accepted connection gets its own task: read one request frame, run
//! generation on the [`Engine`]'s worker thread, and write every fragment
//! back as it arrives. The connection is closed when generation ends.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;

use splitlm::{Error, GenerationConfig, Generator, Result};
use splitlm_runtime::{Engine, FinishReason, GenerationEvent};

use crate::config::ServerConfig;
use crate::framing::{receive_message, send_raw};
use crate::status::{spawn_dispatcher, StatusEvent, StatusObserver, StatusSink};
use crate::types::InferenceRequest;

/// Pause after a failed `accept` before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// The inference server.
pub struct Server {
    config: ServerConfig,
    engine: Engine,
    observers: Vec<Arc<dyn StatusObserver>>,
}

/// Builder for constructing a [`Server`].
pub struct ServerBuilder {
    config: ServerConfig,
    engine: Engine,
    observers: Vec<Arc<dyn StatusObserver>>,
}

impl Server {
    /// Create a new server builder around `generator`.
    #[must_use]
    pub fn builder(generator: impl Generator + 'static) -> ServerBuilder {
        ServerBuilder {
            config: ServerConfig::default(),
            engine: Engine::new(generator),
            observers: Vec::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Bind the configured address and serve forever.
    ///
    /// # Errors
    /// Returns an error if the address cannot be bound.
    pub async fn run(self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind).await?;
        self.run_on(listener).await
    }

    /// Serve forever on an already bound listener.
    ///
    /// # Errors
    /// Returns an error if the listener's address cannot be read.
    pub async fn run_on(self, listener: TcpListener) -> Result<()> {
        self.run_until(listener, std::future::pending()).await
    }

    /// Serve on `listener` until `shutdown` completes.
    ///
    /// On shutdown the listener is closed at once; connections already
    /// accepted run to completion before this returns.
    ///
    /// # Errors
    /// Returns an error if the listener's address cannot be read.
    pub async fn run_until<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let addr = listener.local_addr()?;
        let (status, dispatcher) = spawn_dispatcher(self.observers);
        let shared = Arc::new(Shared {
            engine: self.engine,
            max_frame_len: self.config.max_frame_len,
            generation: self.config.generation,
            status,
        });

        log::info!("Server listening on {addr}");
        shared.status.emit(StatusEvent::Listening { addr });

        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        log::info!("Connection from {peer}");
                        let shared = Arc::clone(&shared);
                        connections.spawn(async move { shared.serve(stream, peer).await });
                    }
                    Err(e) => {
                        log::warn!("Failed to accept connection: {e}");
                        let e = Error::from(e);
                        shared.status.emit(StatusEvent::Failed {
                            peer: None,
                            kind: e.kind(),
                            message: e.to_string(),
                        });
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    log_join(joined);
                }
            }
        }

        drop(listener);
        if !connections.is_empty() {
            log::info!("Shutting down, waiting for {} connections", connections.len());
        }
        while let Some(joined) = connections.join_next().await {
            log_join(joined);
        }
        log::info!("Server on {addr} stopped");

        drop(shared);
        let _ = dispatcher.await;
        Ok(())
    }
}

fn log_join(joined: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        log::error!("Connection task failed: {e}");
    }
}

impl ServerBuilder {
    /// Set the address to bind the server to.
    #[must_use]
    pub fn bind(mut self, addr: impl Into<SocketAddr>) -> Self {
        self.config.bind = addr.into();
        self
    }

    /// Reject request frames longer than `max` bytes.
    #[must_use]
    pub fn max_frame_len(mut self, max: usize) -> Self {
        self.config.max_frame_len = max;
        self
    }

    /// Generation settings for every request.
    #[must_use]
    pub fn generation(mut self, config: GenerationConfig) -> Self {
        self.config.generation = config;
        self
    }

    /// Replace all settings at once.
    #[must_use]
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Add a status observer. May be called more than once.
    #[must_use]
    pub fn observer(mut self, observer: impl StatusObserver + 'static) -> Self {
        self.observers.push(Arc::new(observer));
        self
    }

    /// Add an observer that the caller keeps a handle to.
    #[must_use]
    pub fn shared_observer(mut self, observer: Arc<dyn StatusObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Build the server.
    #[must_use]
    pub fn build(self) -> Server {
        Server {
            config: self.config,
            engine: self.engine,
            observers: self.observers,
        }
    }
}

/// State shared by every connection task.
struct Shared {
    engine: Engine,
    max_frame_len: usize,
    generation: GenerationConfig,
    status: StatusSink,
}

impl Shared {
    async fn serve(&self, stream: TcpStream, peer: SocketAddr) {
        self.status.emit(StatusEvent::Connected { peer });

        match self.handle(stream, peer).await {
            Ok((reason, fragments)) => {
                log::info!("[{peer}] Generation finished ({reason:?}), {fragments} fragments sent");
                self.status.emit(StatusEvent::Finished {
                    peer,
                    reason,
                    fragments,
                });
            }
            Err(e) => {
                if e.is_disconnect() {
                    log::info!("[{peer}] Client went away: {e}");
                } else {
                    log::warn!("[{peer}] Error handling client: {e}");
                }
                self.status.emit(StatusEvent::Failed {
                    peer: Some(peer),
                    kind: e.kind(),
                    message: e.to_string(),
                });
            }
        }

        log::info!("[{peer}] Connection closed");
    }

    /// One request, one fragment stream. Returns how generation ended and
    /// how many fragments were written.
    async fn handle(&self, stream: TcpStream, peer: SocketAddr) -> Result<(FinishReason, usize)> {
        let (mut reader, mut writer) = stream.into_split();

        let frame = receive_message(&mut reader, self.max_frame_len).await?;
        let request = InferenceRequest::decode(&frame)?;
        log::debug!(
            "[{peer}] Request with {} tokens ({} attended)",
            request.input_ids.len(),
            request.attention_mask.iter().filter(|&&m| m == 1).count()
        );
        let config = request.generation_config(&self.generation);

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        self.engine.submit(request.into_input(), config, tx)?;

        // Returning early drops `rx`, which stops the worker at its next fragment.
        let mut index = 0;
        while let Some(event) = rx.recv().await {
            match event {
                GenerationEvent::Fragment(text) => {
                    if text.is_empty() {
                        continue;
                    }
                    self.status.emit(StatusEvent::Fragment {
                        peer,
                        index,
                        text: text.clone(),
                    });
                    send_raw(&mut writer, text.as_bytes()).await?;
                    index += 1;
                }
                GenerationEvent::Error(e) => return Err(e),
                GenerationEvent::Finished(reason) => {
                    if let Err(e) = writer.shutdown().await {
                        log::debug!("[{peer}] Shutdown after generation failed: {e}");
                    }
                    return Ok((reason, index));
                }
            }
        }
        Err(Error::Generation(
            "generation worker stopped without reporting".into(),
        ))
    }
}
