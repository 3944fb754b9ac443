//! Integration tests for the splitlm-serve TCP server.
//!
//! Uses scripted generators and the echo model so no model weights are
//! needed. Every test binds its own listener on an ephemeral port.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use splitlm::tokenizer::{ByteSymbolMap, MergeTable, SpecialTokens, TokenizerConfig, Vocabulary};
use splitlm::{
    BpeTokenizer, ErrorKind, FragmentStream, GenerationConfig, GenerationInput, Generator,
    Result as SplitResult,
};
use splitlm_runtime::{DecodingGenerator, EchoModel, FinishReason};
use splitlm_serve::{
    send_message, Client, ClientConfig, DisplayLog, FragmentReader, InferenceRequest, Server,
    ServerBuilder, StatusEvent, StatusObserver,
};

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

/// Yields fixed fragments with a pause before each.
struct Scripted {
    fragments: Vec<&'static str>,
    delay: Duration,
}

impl Generator for Scripted {
    fn generate(&self, _: GenerationInput, _: &GenerationConfig) -> SplitResult<FragmentStream> {
        let delay = self.delay;
        let fragments: Vec<String> = self.fragments.iter().map(|s| (*s).to_string()).collect();
        Ok(Box::new(fragments.into_iter().map(move |f| {
            thread::sleep(delay);
            Ok(f)
        })))
    }
}

/// Never finishes on its own; records when its stream is dropped.
struct Endless {
    dropped: Arc<AtomicBool>,
}

struct EndlessStream {
    dropped: Arc<AtomicBool>,
}

impl Iterator for EndlessStream {
    type Item = SplitResult<String>;

    fn next(&mut self) -> Option<Self::Item> {
        thread::sleep(Duration::from_millis(1));
        Some(Ok("tick ".to_string()))
    }
}

impl Drop for EndlessStream {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::SeqCst);
    }
}

impl Generator for Endless {
    fn generate(&self, _: GenerationInput, _: &GenerationConfig) -> SplitResult<FragmentStream> {
        Ok(Box::new(EndlessStream {
            dropped: Arc::clone(&self.dropped),
        }))
    }
}

/// Ticks forever when the prompt starts with `!`, otherwise streams
/// `f0 ` .. `f19 ` slowly.
struct ByPrompt;

impl Generator for ByPrompt {
    fn generate(&self, input: GenerationInput, _: &GenerationConfig) -> SplitResult<FragmentStream> {
        if input.input_ids.first() == Some(&u32::from(b'!')) {
            return Ok(Box::new(std::iter::repeat_with(|| {
                thread::sleep(Duration::from_millis(1));
                Ok("tick ".to_string())
            })));
        }
        Ok(Box::new((0..20).map(|i| {
            thread::sleep(Duration::from_millis(10));
            Ok(format!("f{i} "))
        })))
    }
}

const MERGES: &[(&str, &str)] = &[("Ġ", "t"), ("h", "e"), ("Ġt", "he"), ("l", "l")];

fn tokenizer() -> BpeTokenizer {
    let map = ByteSymbolMap::new();
    let mut entries: Vec<(String, u32)> = (0u8..=255)
        .map(|b| (map.symbol(b).to_string(), u32::from(b)))
        .collect();
    for (i, (l, r)) in MERGES.iter().enumerate() {
        entries.push((format!("{l}{r}"), 256 + u32::try_from(i).unwrap()));
    }
    entries.push(("<|endoftext|>".to_string(), 300));
    BpeTokenizer::from_parts(
        Vocabulary::from_entries(entries).unwrap(),
        MergeTable::from_pairs(MERGES.iter().copied()).unwrap(),
        SpecialTokens::default(),
        &TokenizerConfig::default(),
    )
    .unwrap()
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

type Events = Arc<Mutex<Vec<StatusEvent>>>;

struct TestServer {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<SplitResult<()>>,
    events: Events,
}

impl TestServer {
    async fn start(builder: ServerBuilder) -> Self {
        let events: Events = Arc::default();
        let recorded = Arc::clone(&events);
        let observer: Arc<dyn StatusObserver> = Arc::new(move |event: &StatusEvent| {
            recorded.lock().unwrap().push(event.clone());
        });
        let server = builder.shared_observer(observer).build();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(server.run_until(listener, async {
            let _ = rx.await;
        }));
        Self {
            addr,
            shutdown,
            task,
            events,
        }
    }

    fn client(&self, sequence_length: Option<usize>) -> Client<BpeTokenizer> {
        let config = ClientConfig {
            server: self.addr,
            sequence_length,
            connect_timeout_ms: Some(2_000),
            ..ClientConfig::default()
        };
        Client::new(tokenizer(), config)
    }

    /// Stop the server and return every status event it emitted.
    async fn stop(self) -> Vec<StatusEvent> {
        let _ = self.shutdown.send(());
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .expect("server did not shut down")
            .unwrap()
            .unwrap();
        let events = self.events.lock().unwrap().clone();
        events
    }
}

async fn raw_request(addr: SocketAddr, frame: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    send_message(&mut stream, frame).await.unwrap();
    let mut out = Vec::new();
    // A server that closes without reading the whole frame may reset instead.
    let _ = stream.read_to_end(&mut out).await;
    out
}

fn echo_server() -> ServerBuilder {
    Server::builder(DecodingGenerator::new(EchoModel, Arc::new(tokenizer())))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_end_to_end_echo() {
    let server = TestServer::start(echo_server()).await;
    let client = server.client(Some(32));

    let mut seen = Vec::new();
    let text = client
        .generate_to_string("hello the world", |f| seen.push(f.to_string()))
        .await
        .unwrap();
    assert_eq!(text, "hello the world");
    assert_eq!(seen.concat(), text);

    let events = server.stop().await;
    assert!(events.iter().any(|e| matches!(
        e,
        StatusEvent::Finished {
            reason: FinishReason::Stop,
            ..
        }
    )));
}

#[tokio::test]
async fn test_fragments_reported_in_order() {
    let display = Arc::new(DisplayLog::new());
    let server = TestServer::start(
        Server::builder(Scripted {
            fragments: vec!["He", "llo"],
            delay: Duration::from_millis(20),
        })
        .shared_observer(Arc::clone(&display) as Arc<dyn StatusObserver>),
    )
    .await;

    let text = server
        .client(None)
        .generate_to_string("anything", |_| {})
        .await
        .unwrap();
    assert_eq!(text, "Hello");

    let events = server.stop().await;
    let fragments: Vec<String> = events
        .iter()
        .filter(|e| matches!(e, StatusEvent::Fragment { .. }))
        .map(ToString::to_string)
        .collect();
    assert_eq!(fragments, vec!["Generated 0: He", "Generated 1: llo"]);

    assert!(matches!(events[0], StatusEvent::Listening { .. }));
    let connected = events
        .iter()
        .position(|e| matches!(e, StatusEvent::Connected { .. }))
        .unwrap();
    let finished = events
        .iter()
        .position(|e| {
            matches!(
                e,
                StatusEvent::Finished {
                    reason: FinishReason::Stop,
                    fragments: 2,
                    ..
                }
            )
        })
        .unwrap();
    assert!(connected < finished);
    assert_eq!(events.last(), Some(&StatusEvent::Idle));

    assert_eq!(display.generated(), vec!["Generated 0: He", "Generated 1: llo"]);
    assert_eq!(display.status(), "Server Status: Idle");
}

#[tokio::test]
async fn test_connections_are_isolated() {
    let server = TestServer::start(echo_server()).await;
    let a = server.client(None);
    let b = server.client(Some(24));

    let (ra, rb) = tokio::join!(
        a.generate_to_string("the first prompt", |_| {}),
        b.generate_to_string("another one, héllo", |_| {}),
    );
    assert_eq!(ra.unwrap(), "the first prompt");
    assert_eq!(rb.unwrap(), "another one, héllo");

    let events = server.stop().await;
    let connected = events
        .iter()
        .filter(|e| matches!(e, StatusEvent::Connected { .. }))
        .count();
    assert_eq!(connected, 2);
}

#[tokio::test]
async fn test_failing_neighbours_leave_stream_intact() {
    let server = TestServer::start(Server::builder(ByPrompt).generation(GenerationConfig {
        max_new_tokens: 100,
        ..GenerationConfig::default()
    }))
    .await;

    let mut steady = server.client(None).generate("numbers").await.unwrap();
    let first = steady.next_fragment().await.unwrap().unwrap();

    let junk = raw_request(server.addr, b"not a request at all");
    let quitter = async {
        let mut reader = server.client(None).generate("!go").await.unwrap();
        assert!(reader.next_fragment().await.unwrap().is_some());
    };
    let rest = async {
        let mut text = first;
        while let Some(fragment) = steady.next_fragment().await.unwrap() {
            text.push_str(&fragment);
        }
        text
    };
    let (junk_reply, (), text) = tokio::join!(junk, quitter, rest);

    assert!(junk_reply.is_empty());
    let expected: String = (0..20).map(|i| format!("f{i} ")).collect();
    assert_eq!(text, expected);

    let events = server.stop().await;
    assert!(events.iter().any(|e| matches!(
        e,
        StatusEvent::Finished {
            reason: FinishReason::Stop,
            fragments: 20,
            ..
        }
    )));
    let failures = events
        .iter()
        .filter(|e| matches!(e, StatusEvent::Failed { peer: Some(_), .. }))
        .count();
    assert_eq!(failures, 2);
    assert_eq!(events.last(), Some(&StatusEvent::Idle));
}

#[tokio::test]
async fn test_request_overrides_are_clamped() {
    let server = TestServer::start(echo_server().generation(GenerationConfig {
        max_new_tokens: 4,
        ..GenerationConfig::default()
    }))
    .await;
    let client = server.client(None);

    let request = client
        .prepare(
            "abcdefgh",
            Some(splitlm_serve::GenerationOverrides {
                max_new_tokens: Some(100),
                ..Default::default()
            }),
        )
        .unwrap();
    let fragments = client.send(&request).await.unwrap().collect().await.unwrap();
    assert_eq!(fragments.concat(), "abcd");

    server.stop().await;
}

#[tokio::test]
async fn test_client_disconnect_cancels_generation() {
    let dropped = Arc::new(AtomicBool::new(false));
    let server = TestServer::start(
        Server::builder(Endless {
            dropped: Arc::clone(&dropped),
        })
        .generation(GenerationConfig {
            max_new_tokens: usize::MAX,
            ..GenerationConfig::default()
        }),
    )
    .await;

    let mut reader = server.client(None).generate("go").await.unwrap();
    assert!(reader.next_fragment().await.unwrap().is_some());
    drop(reader);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !dropped.load(Ordering::SeqCst) {
        assert!(
            tokio::time::Instant::now() < deadline,
            "generator was not stopped"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let events = server.stop().await;
    assert!(events.iter().any(|e| matches!(
        e,
        StatusEvent::Failed {
            kind: ErrorKind::Transport,
            ..
        }
    )));
}

#[tokio::test]
async fn test_malformed_payload_closes_connection() {
    let server = TestServer::start(echo_server()).await;

    let out = raw_request(server.addr, b"definitely not json").await;
    assert!(out.is_empty());

    let mismatched = InferenceRequest {
        input_ids: vec![1, 2],
        attention_mask: vec![1],
        hidden_states: None,
        generation: None,
    };
    let frame = serde_json::to_vec(&mismatched).unwrap();
    assert!(raw_request(server.addr, &frame).await.is_empty());

    let events = server.stop().await;
    let failures = events
        .iter()
        .filter(|e| matches!(e, StatusEvent::Failed { .. }))
        .count();
    assert_eq!(failures, 2);
}

#[tokio::test]
async fn test_oversize_frame_rejected() {
    let server = TestServer::start(echo_server().max_frame_len(16)).await;

    let request = InferenceRequest::from_tokens(splitlm::TokenizedInput::unpadded(vec![7; 64]));
    let out = raw_request(server.addr, &request.encode().unwrap()).await;
    assert!(out.is_empty());

    let events = server.stop().await;
    assert!(events.iter().any(|e| matches!(
        e,
        StatusEvent::Failed { message, .. } if message.contains("exceeds the limit")
    )));
}

#[tokio::test]
async fn test_early_close_before_frame() {
    let server = TestServer::start(echo_server()).await;

    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    stream.write_all(&[0, 0]).await.unwrap();
    stream.shutdown().await.unwrap();
    let mut rest = Vec::new();
    stream.read_to_end(&mut rest).await.unwrap();
    assert!(rest.is_empty());

    let events = server.stop().await;
    assert!(events.iter().any(|e| matches!(
        e,
        StatusEvent::Failed { message, .. } if message.contains("after 2 of 4 bytes")
    )));
}

#[tokio::test]
async fn test_shutdown_drains_in_flight_connection() {
    let server = TestServer::start(Server::builder(Scripted {
        fragments: vec!["slow ", "but ", "complete"],
        delay: Duration::from_millis(50),
    }))
    .await;

    let mut reader: FragmentReader<TcpStream> =
        server.client(None).generate("wait").await.unwrap();
    let first = reader.next_fragment().await.unwrap().unwrap();

    // Shut down while the generator is still running.
    let stopping = tokio::spawn(server.stop());

    let mut text = first;
    while let Some(f) = reader.next_fragment().await.unwrap() {
        text.push_str(&f);
    }
    assert_eq!(text, "slow but complete");

    let events = stopping.await.unwrap();
    assert!(events.iter().any(|e| matches!(
        e,
        StatusEvent::Finished {
            fragments: 3,
            ..
        }
    )));
}
