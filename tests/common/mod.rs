//! Shared test utilities
//!
//! Scripted stand-ins for the model, the transcriber, the microphone, the
//! realtime socket and the speakers.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use fairy::host::{BufferDocument, DocumentSurface};
use fairy::llm::{ChatModel, ConversationMessage, ModelTurn, ToolCall};
use fairy::realtime::{ClientEvent, RealtimeTransport, ServerEvent};
use fairy::tools::ToolSpec;
use fairy::voice::{
    AudioFrame, AudioFrameSource, FRAME_SAMPLES, FrameReceiver, PlaybackSink, Transcriber,
};
use fairy::{Error, Result};

/// Sample document used by most tests
pub const SOURCE: &str = "use std::io;\n\nfn main() {\n    let x = 1;\n    let y = 2;\n    println!(\"{}\", x + y);\n}\n";

/// Document URI for [`SOURCE`]
pub const URI: &str = "file:///work/main.rs";

/// In-memory document holding [`SOURCE`], plus the same value as a host
#[must_use]
pub fn document() -> (Arc<BufferDocument>, Arc<dyn DocumentSurface>) {
    let doc = Arc::new(BufferDocument::in_memory(URI, SOURCE));
    let host: Arc<dyn DocumentSurface> = doc.clone();
    (doc, host)
}

/// Chat model answering from a script
///
/// Every request is recorded. Once the script is exhausted the model either
/// repeats a fixed answer or fails.
#[derive(Default)]
pub struct ScriptedModel {
    turns: Mutex<VecDeque<Result<ModelTurn>>>,
    repeat: Option<ModelTurn>,
    requests: Mutex<Vec<Vec<ConversationMessage>>>,
}

impl ScriptedModel {
    pub fn new(turns: impl IntoIterator<Item = ModelTurn>) -> Self {
        Self {
            turns: Mutex::new(turns.into_iter().map(Ok).collect()),
            ..Self::default()
        }
    }

    /// A model that answers every request with the same turn
    pub fn always(turn: ModelTurn) -> Self {
        Self {
            repeat: Some(turn),
            ..Self::default()
        }
    }

    /// A model whose first request fails
    pub fn failing(message: &str) -> Self {
        Self {
            turns: Mutex::new(VecDeque::from([Err(Error::Llm(message.to_string()))])),
            ..Self::default()
        }
    }

    /// Number of requests made
    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// History sent with each request
    pub fn requests(&self) -> Vec<Vec<ConversationMessage>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(
        &self,
        messages: &[ConversationMessage],
        _tools: &[ToolSpec],
    ) -> Result<ModelTurn> {
        self.requests.lock().unwrap().push(messages.to_vec());
        if let Some(turn) = self.turns.lock().unwrap().pop_front() {
            return turn;
        }
        self.repeat
            .clone()
            .ok_or_else(|| Error::Llm("script exhausted".to_string()))
    }
}

/// Single tool call turn
pub fn call(id: &str, name: &str, arguments: serde_json::Value) -> ModelTurn {
    ModelTurn::calls(vec![ToolCall::new(id, name, arguments.to_string())])
}

/// Transcriber returning scripted text
#[derive(Default)]
pub struct ScriptedTranscriber {
    results: Mutex<VecDeque<std::result::Result<String, String>>>,
    calls: Mutex<Vec<usize>>,
}

impl ScriptedTranscriber {
    pub fn new(texts: &[&str]) -> Self {
        Self {
            results: Mutex::new(texts.iter().map(|t| Ok((*t).to_string())).collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            results: Mutex::new(VecDeque::from([Err(message.to_string())])),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Byte length of every WAV received
    pub fn calls(&self) -> Vec<usize> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    async fn transcribe(&self, wav: &[u8]) -> Result<String> {
        self.calls.lock().unwrap().push(wav.len());
        match self.results.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(Error::Transcription(message)),
            None => Err(Error::Transcription("script exhausted".to_string())),
        }
    }
}

/// Frame source replaying one script per `start`
///
/// The channel closes after the scripted frames. Starting again with no
/// script left fails like an unplugged microphone.
#[derive(Default)]
pub struct ScriptedFrameSource {
    scripts: VecDeque<Vec<AudioFrame>>,
    running: bool,
    pub starts: usize,
}

impl ScriptedFrameSource {
    pub fn new(scripts: impl IntoIterator<Item = Vec<AudioFrame>>) -> Self {
        Self {
            scripts: scripts.into_iter().collect(),
            ..Self::default()
        }
    }
}

impl AudioFrameSource for ScriptedFrameSource {
    fn start(&mut self) -> Result<FrameReceiver> {
        let frames = self
            .scripts
            .pop_front()
            .ok_or_else(|| Error::Capture("no input device".to_string()))?;
        let (tx, rx) = mpsc::unbounded_channel();
        for frame in frames {
            let _ = tx.send(frame);
        }
        self.running = true;
        self.starts += 1;
        Ok(rx)
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn is_running(&self) -> bool {
        self.running
    }
}

/// Frame source that never yields and never closes
#[derive(Default)]
pub struct SilentSource {
    tx: Option<mpsc::UnboundedSender<AudioFrame>>,
}

impl AudioFrameSource for SilentSource {
    fn start(&mut self) -> Result<FrameReceiver> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.tx = Some(tx);
        Ok(rx)
    }

    fn stop(&mut self) {
        self.tx = None;
    }

    fn is_running(&self) -> bool {
        self.tx.is_some()
    }
}

/// `count` frames flagged as speech
pub fn speech_frames(count: usize) -> Vec<AudioFrame> {
    (0..count)
        .map(|i| {
            let amplitude = if i % 2 == 0 { 6000 } else { -6000 };
            AudioFrame::new(vec![amplitude; FRAME_SAMPLES], true)
        })
        .collect()
}

/// `count` silent frames
pub fn silence_frames(count: usize) -> Vec<AudioFrame> {
    (0..count)
        .map(|_| AudioFrame::new(vec![0; FRAME_SAMPLES], false))
        .collect()
}

/// Silence, a spoken span long enough to start an utterance, then enough
/// silence to end it with default settings
pub fn utterance_frames() -> Vec<AudioFrame> {
    let mut frames = silence_frames(5);
    frames.extend(speech_frames(20));
    frames.extend(silence_frames(30));
    frames
}

/// Shared log of client events
pub type SentLog = Arc<Mutex<Vec<ClientEvent>>>;

/// Realtime transport fed from a channel
///
/// Events pushed through [`MockTransport::sender`] are delivered in order.
/// The transport reports closed once every sender is dropped.
pub struct MockTransport {
    events: mpsc::UnboundedReceiver<Result<ServerEvent>>,
    sent: SentLog,
    pub closed: bool,
}

impl MockTransport {
    /// Transport, its event feed and its sent log
    pub fn new() -> (
        Self,
        mpsc::UnboundedSender<Result<ServerEvent>>,
        SentLog,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sent = SentLog::default();
        (
            Self {
                events: rx,
                sent: Arc::clone(&sent),
                closed: false,
            },
            tx,
            sent,
        )
    }

    /// Transport that delivers `events` and then closes
    pub fn scripted(events: impl IntoIterator<Item = ServerEvent>) -> (Self, SentLog) {
        let (transport, tx, sent) = Self::new();
        for event in events {
            let _ = tx.send(Ok(event));
        }
        (transport, sent)
    }
}

#[async_trait]
impl RealtimeTransport for MockTransport {
    async fn send(&mut self, event: &ClientEvent) -> Result<()> {
        if self.closed {
            return Err(Error::WebSocket("transport closed".to_string()));
        }
        self.sent.lock().unwrap().push(event.clone());
        Ok(())
    }

    async fn next_event(&mut self) -> Option<Result<ServerEvent>> {
        self.events.recv().await
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

/// Wire names of everything sent, in order
pub fn sent_types(sent: &SentLog) -> Vec<&'static str> {
    sent.lock().unwrap().iter().map(ClientEvent::event_type).collect()
}

/// Playback sink that records each WAV buffer
#[derive(Default)]
pub struct RecordingPlayback {
    played: Mutex<Vec<Vec<u8>>>,
}

impl RecordingPlayback {
    pub fn played(&self) -> Vec<Vec<u8>> {
        self.played.lock().unwrap().clone()
    }
}

#[async_trait]
impl PlaybackSink for RecordingPlayback {
    async fn play_wav(&self, wav: Vec<u8>) -> Result<()> {
        self.played.lock().unwrap().push(wav);
        Ok(())
    }
}
