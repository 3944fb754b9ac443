//! splitlm serve: the network half of split inference
//!
//! The front end sends one length-prefixed request per connection; the back
//! end streams generated text back and closes the connection when done.
//!
//! # Example
//!
//! ```ignore
//! use splitlm_runtime::{DecodingGenerator, EchoModel};
//! use splitlm_serve::{DisplayLog, LogObserver, Server};
//!
//! #[tokio::main]
//! async fn main() -> splitlm::Result<()> {
//!     let tokenizer = /* load tokenizer */;
//!
//!     Server::builder(DecodingGenerator::new(EchoModel, tokenizer))
//!         .bind(([0, 0, 0, 0], 12345))
//!         .observer(LogObserver)
//!         .build()
//!         .run()
//!         .await
//! }
//! ```

mod client;
pub mod config;
pub mod framing;
mod server;
pub mod status;
pub mod types;

pub use client::Client;
pub use config::{ClientConfig, ServerConfig};
pub use framing::{receive_message, send_message, send_raw, FragmentReader};
pub use server::{Server, ServerBuilder};
pub use status::{DisplayLog, LogObserver, StatusEvent, StatusObserver};
pub use types::{GenerationOverrides, InferenceRequest};
