//! Fragment-level generation engine
//!
//! The [`Engine`] wraps a [`Generator`] and runs each submitted request on its
//! own worker thread, so a long generation never blocks the caller. Fragments
//! are pushed through a [`FragmentSender`] of the caller's choice as soon as
//! the generator yields them.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use splitlm::{Error, GenerationConfig, GenerationInput, Generator, Result};

/// Why generation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// The generator's stream was exhausted.
    Stop,
    /// Reached the maximum number of fragments.
    Length,
    /// The receiver was dropped (client disconnect).
    Cancelled,
}

/// An event produced by the engine during generation.
///
/// Sent through a single channel so ordering is guaranteed:
/// zero or more `Fragment`s, then exactly one terminal event
/// (`Finished` or `Error`).
#[derive(Debug)]
pub enum GenerationEvent {
    /// A newly generated text fragment.
    Fragment(String),
    /// An error occurred during generation.
    Error(Error),
    /// Generation completed with the given reason.
    Finished(FinishReason),
}

/// Trait for sending generation events from the engine to the caller.
///
/// Abstracted so callers can provide either a sync or async sender.
/// Return `false` to signal that the receiver has been dropped and
/// generation should stop.
pub trait FragmentSender: Send {
    /// Send a generation event to the receiver.
    ///
    /// Returns `false` if the receiver has been dropped, signalling the
    /// engine to abort generation early.
    fn send(&self, event: GenerationEvent) -> bool;
}

impl FragmentSender for mpsc::Sender<GenerationEvent> {
    fn send(&self, event: GenerationEvent) -> bool {
        mpsc::Sender::send(self, event).is_ok()
    }
}

impl FragmentSender for mpsc::SyncSender<GenerationEvent> {
    fn send(&self, event: GenerationEvent) -> bool {
        mpsc::SyncSender::send(self, event).is_ok()
    }
}

impl FragmentSender for tokio::sync::mpsc::UnboundedSender<GenerationEvent> {
    fn send(&self, event: GenerationEvent) -> bool {
        tokio::sync::mpsc::UnboundedSender::send(self, event).is_ok()
    }
}

impl FragmentSender for Box<dyn FragmentSender> {
    fn send(&self, event: GenerationEvent) -> bool {
        (**self).send(event)
    }
}

/// Handle to a generation capability.
///
/// Cheap to clone; clones share the same generator.
#[derive(Clone)]
pub struct Engine {
    generator: Arc<dyn Generator>,
}

impl Engine {
    /// Create an engine around `generator`.
    #[must_use]
    pub fn new(generator: impl Generator + 'static) -> Self {
        Self {
            generator: Arc::new(generator),
        }
    }

    /// Create an engine around an already shared generator.
    #[must_use]
    pub fn from_shared(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }

    /// Submit a generation request with a caller-provided sender.
    ///
    /// The request runs on a fresh worker thread. Fragments are sent as they
    /// are produced; generation stops when the stream ends, when
    /// `config.max_new_tokens` fragments have been sent, or when the sender
    /// returns `false` (receiver dropped). In the last case the generator's
    /// stream is dropped right away, which is its signal to stop.
    ///
    /// # Errors
    /// Returns an error if the worker thread cannot be spawned.
    pub fn submit(
        &self,
        input: GenerationInput,
        config: GenerationConfig,
        tx: impl FragmentSender + 'static,
    ) -> Result<JoinHandle<()>> {
        let generator = Arc::clone(&self.generator);
        thread::Builder::new()
            .name("splitlm-generate".into())
            .spawn(move || run_request(generator.as_ref(), input, &config, &tx))
            .map_err(|e| Error::Generation(format!("failed to spawn generation thread: {e}")))
    }

    /// Generate all fragments, blocking until complete.
    ///
    /// # Errors
    /// Returns the generator's error, if any.
    pub fn generate(
        &self,
        input: GenerationInput,
        config: &GenerationConfig,
    ) -> Result<Vec<String>> {
        self.generate_stream(input, config, |rx| {
            let mut fragments = Vec::new();
            for event in rx {
                match event {
                    GenerationEvent::Fragment(text) => fragments.push(text),
                    GenerationEvent::Error(e) => return Err(e),
                    GenerationEvent::Finished(_) => break,
                }
            }
            Ok(fragments)
        })?
    }

    /// Generate with streaming via a channel.
    ///
    /// The provided `consumer` closure receives a [`mpsc::Receiver`] and is
    /// called on the current thread while fragments are being produced by
    /// the worker thread.
    ///
    /// # Errors
    /// Returns an error if the worker thread cannot be spawned.
    pub fn generate_stream<F, R>(
        &self,
        input: GenerationInput,
        config: &GenerationConfig,
        consumer: F,
    ) -> Result<R>
    where
        F: FnOnce(mpsc::Receiver<GenerationEvent>) -> R,
    {
        let (tx, rx) = mpsc::channel();
        self.submit(input, config.clone(), tx)?;
        Ok(consumer(rx))
    }
}

/// Drive one request to completion and report exactly one terminal event.
fn run_request(
    generator: &dyn Generator,
    input: GenerationInput,
    config: &GenerationConfig,
    tx: &dyn FragmentSender,
) {
    let run = || -> Result<FinishReason> {
        let mut stream = generator.generate(input, config)?;
        let mut sent = 0usize;
        loop {
            // Checked before pulling so the model never runs past the cap.
            if sent >= config.max_new_tokens {
                return Ok(FinishReason::Length);
            }
            let Some(fragment) = stream.next() else {
                return Ok(FinishReason::Stop);
            };
            if !tx.send(GenerationEvent::Fragment(fragment?)) {
                log::debug!("Receiver dropped after {sent} fragments, stopping generation");
                return Ok(FinishReason::Cancelled);
            }
            sent += 1;
        }
    };

    match run() {
        Ok(reason) => {
            let _ = tx.send(GenerationEvent::Finished(reason));
        }
        Err(e) => {
            let _ = tx.send(GenerationEvent::Error(e));
        }
    }
}
