//! Fairy - Voice-driven editing engine
//!
//! This library provides the core functionality for Fairy:
//! - Voice capture, utterance segmentation and WAV/base64 encoding
//! - Transcription and a turn-based tool-calling loop
//! - A streaming duplex session over the realtime protocol
//! - Editor tools acting on a host document surface
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  Host surface                        │
//! │   Document  │  Diagnostics  │  Files  │  Status     │
//! └────────────────────▲────────────────────────────────┘
//!                      │ tools
//! ┌────────────────────┴────────────────────────────────┐
//! │                     Fairy                            │
//! │   Session  │  Orchestrator  │  Realtime  │  Tools   │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                 Model services                       │
//! │   STT  │  Chat completions  │  Realtime socket       │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod agent;
pub mod config;
pub mod error;
pub mod host;
pub mod llm;
pub mod realtime;
pub mod session;
pub mod tools;
pub mod voice;

pub use config::Config;
pub use error::{Error, Result};
