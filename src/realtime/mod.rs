//! Streaming voice sessions
//!
//! A [`RealtimeController`] keeps one duplex session open: captured audio is
//! pushed frame by frame while server events are consumed from the same
//! `select!` loop. Tool calls are dispatched as their arguments complete and
//! the result is sent back before a follow-up response is requested.

mod events;
mod transport;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

pub use events::{
    ClientEvent, ConversationItem, CreatedItem, ErrorDetail, ResponseStatus, ServerEvent,
    SessionConfig,
};
pub use transport::{DEFAULT_REALTIME_URL, RealtimeTransport, WebSocketTransport};

use crate::agent::streaming_instructions;
use crate::host::DocumentSurface;
use crate::llm::{ConversationMessage, ToolCall};
use crate::session::{Session, SessionState};
use crate::tools::{ToolDispatcher, ToolRegistry, default_registry};
use crate::voice::{AudioFrameSource, PcmFormat, PlaybackSink, codec};
use crate::{Error, Result};

/// Default wait for a function output acknowledgment
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Tool calls kept in the local history of a streaming session
pub const DEFAULT_HISTORY_CALLS: usize = 32;

/// Tuning for streaming sessions
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// Longest wait between a function output and its follow-up request
    pub settle_delay: Duration,
    /// Voice for spoken responses
    pub voice: Option<String>,
    /// Most recent tool calls kept in `Session::history`; the server holds
    /// the full conversation
    pub history_calls: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            settle_delay: DEFAULT_SETTLE_DELAY,
            voice: None,
            history_calls: DEFAULT_HISTORY_CALLS,
        }
    }
}

/// A function output still waiting for its follow-up `response.create`
#[derive(Debug)]
struct PendingFollowUp {
    call_id: String,
    deadline: Instant,
}

/// Drives a streaming session over a [`RealtimeTransport`]
pub struct RealtimeController<T> {
    transport: T,
    host: Arc<dyn DocumentSurface>,
    playback: Arc<dyn PlaybackSink>,
    dispatcher: ToolDispatcher,
    config: RealtimeConfig,
    follow_ups: VecDeque<PendingFollowUp>,
    audio_tx: Option<mpsc::UnboundedSender<Vec<u8>>>,
}

impl<T: RealtimeTransport> RealtimeController<T> {
    /// Create a controller with the built-in editor tools
    #[must_use]
    pub fn new(
        transport: T,
        host: Arc<dyn DocumentSurface>,
        playback: Arc<dyn PlaybackSink>,
    ) -> Self {
        let registry = Arc::new(default_registry(&host));
        Self {
            transport,
            host,
            playback,
            dispatcher: ToolDispatcher::new(registry),
            config: RealtimeConfig::default(),
            follow_ups: VecDeque::new(),
            audio_tx: None,
        }
    }

    /// Replace the tool registry
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<ToolRegistry>) -> Self {
        self.dispatcher = ToolDispatcher::new(registry);
        self
    }

    /// Replace the tuning
    #[must_use]
    pub fn with_config(mut self, config: RealtimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Give back the transport
    #[must_use]
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Run the session until it is cancelled or the transport closes
    ///
    /// The session ends `Closed` whatever the outcome.
    ///
    /// # Errors
    ///
    /// Returns `Error::Capture` if audio cannot start and `Error::WebSocket`
    /// if the transport breaks; both are shown to the user first
    pub async fn run(
        &mut self,
        session: &mut Session,
        source: &mut dyn AudioFrameSource,
    ) -> Result<()> {
        let handle = session.handle().clone();
        handle.transition(SessionState::Streaming)?;
        tracing::info!(session_id = %session.id(), "realtime session started");

        let (audio_tx, audio_rx) = mpsc::unbounded_channel();
        self.audio_tx = Some(audio_tx);
        let player = tokio::spawn(play_queue(Arc::clone(&self.playback), audio_rx));

        let result = self.stream(session, source).await;

        source.stop();
        if let Err(e) = self.transport.close().await {
            tracing::debug!(error = %e, "realtime transport close failed");
        }

        self.audio_tx = None;
        if handle.is_cancelled() {
            player.abort();
        } else if let Err(e) = player.await {
            tracing::warn!(error = %e, "playback task failed");
        }

        if let Err(e) = &result {
            self.host.notify_user(&e.to_string()).await;
        }
        self.follow_ups.clear();
        if handle.state() == SessionState::Streaming {
            if let Err(e) = handle.transition(SessionState::Cancelling) {
                tracing::debug!(error = %e, "session left streaming before close");
            }
        }
        handle.close();
        self.host.set_status("Fairy ready").await;
        tracing::info!(session_id = %session.id(), "realtime session closed");

        result
    }

    async fn stream(
        &mut self,
        session: &mut Session,
        source: &mut dyn AudioFrameSource,
    ) -> Result<()> {
        let handle = session.handle().clone();
        let tools = self
            .dispatcher
            .registry()
            .specs()
            .iter()
            .map(crate::tools::ToolSpec::to_realtime_tool)
            .collect();
        let mut config = SessionConfig::new(streaming_instructions(self.host.as_ref()).await, tools);
        config.voice.clone_from(&self.config.voice);

        self.transport
            .send(&ClientEvent::SessionUpdate { session: config })
            .await?;
        self.transport.send(&ClientEvent::ResponseCreate).await?;

        let mut frames = source.start()?;
        let mut capturing = true;
        self.host.set_status("Listening...").await;

        loop {
            let next_deadline = self.follow_ups.front().map(|f| f.deadline);

            tokio::select! {
                biased;
                () = handle.cancelled() => {
                    tracing::info!("realtime session cancelled");
                    return Ok(());
                }
                () = tokio::time::sleep_until(next_deadline.unwrap_or_else(Instant::now)),
                    if next_deadline.is_some() => {
                    if let Some(follow_up) = self.follow_ups.pop_front() {
                        tracing::debug!(call_id = %follow_up.call_id, "settle delay elapsed");
                        self.transport.send(&ClientEvent::ResponseCreate).await?;
                    }
                }
                frame = frames.recv(), if capturing => {
                    if let Some(frame) = frame {
                        let audio = codec::base64_encode(&frame.to_pcm());
                        self.transport
                            .send(&ClientEvent::InputAudioBufferAppend { audio })
                            .await?;
                    } else {
                        tracing::debug!("audio source ended");
                        capturing = false;
                    }
                }
                event = self.transport.next_event() => {
                    match event {
                        None => {
                            tracing::info!("realtime transport closed");
                            return Ok(());
                        }
                        Some(Ok(event)) => self.handle_event(session, event).await?,
                        Some(Err(Error::Protocol(msg))) => {
                            tracing::warn!(error = %msg, "realtime protocol error");
                            self.host.notify_user(&format!("Protocol error: {msg}")).await;
                        }
                        Some(Err(e)) => return Err(e),
                    }
                }
            }
        }
    }

    async fn handle_event(&mut self, session: &mut Session, event: ServerEvent) -> Result<()> {
        match event {
            ServerEvent::AudioDelta { delta } => match codec::base64_decode(&delta) {
                Ok(bytes) => session.output_audio.extend_from_slice(&bytes),
                Err(e) => {
                    tracing::warn!(error = %e, "undecodable audio delta");
                    self.host.notify_user(&e.to_string()).await;
                }
            },
            ServerEvent::AudioDone => {
                let pcm = session.take_output_audio();
                if !pcm.is_empty() {
                    tracing::debug!(bytes = pcm.len(), "response audio complete");
                    let wav = codec::encode_wav(&pcm, PcmFormat::REALTIME_OUTPUT);
                    if let Some(tx) = &self.audio_tx {
                        let _ = tx.send(wav);
                    }
                }
            }
            ServerEvent::TextDelta { delta } => session.output_text.push_str(&delta),
            ServerEvent::TextDone { text } => {
                let accumulated = session.take_output_text();
                let text = if text.is_empty() { accumulated } else { text };
                if !text.is_empty() {
                    self.host.notify_user(&text).await;
                }
            }
            ServerEvent::TranscriptDelta { delta } => {
                session.output_transcript.push_str(&delta);
                self.host.set_status(&session.output_transcript).await;
            }
            ServerEvent::TranscriptDone { transcript } => {
                let accumulated = session.take_output_transcript();
                let transcript = if transcript.is_empty() { accumulated } else { transcript };
                if !transcript.is_empty() {
                    self.host.notify_user(&transcript).await;
                }
            }
            ServerEvent::FunctionCallArgumentsDone {
                call_id,
                name,
                arguments,
            } => {
                self.run_tool(session, ToolCall::new(call_id, name, arguments))
                    .await?;
            }
            ServerEvent::ResponseDone { response } => {
                if let Some(message) = response.failure_message() {
                    tracing::warn!(error = %message, "realtime response failed");
                    self.host.notify_user(&format!("Error: {message}")).await;
                }
            }
            ServerEvent::Error { error } => {
                tracing::warn!(error = %error.message, code = ?error.code, "realtime error event");
                self.host.notify_user(&format!("Error: {}", error.message)).await;
            }
            ServerEvent::ItemCreated { item } => {
                if item.item_type == "function_call_output" {
                    if let Some(call_id) = item.call_id {
                        self.acknowledge(&call_id).await?;
                    }
                }
            }
            ServerEvent::Other { event_type } => {
                tracing::trace!(event = %event_type, "ignoring realtime event");
            }
        }
        Ok(())
    }

    async fn run_tool(&mut self, session: &mut Session, call: ToolCall) -> Result<()> {
        self.host
            .notify_user(&format!("{}({})", call.name, call.arguments))
            .await;
        let invocation = self.dispatcher.dispatch(&call).await;

        session.push_message(ConversationMessage::assistant("", vec![call.clone()]));
        session.push_message(ConversationMessage::tool(&call.id, &invocation.result));
        session.retain_recent(self.config.history_calls * 2);

        self.transport
            .send(&ClientEvent::function_call_output(&call.id, &invocation.result))
            .await?;
        self.follow_ups.push_back(PendingFollowUp {
            call_id: call.id,
            deadline: Instant::now() + self.config.settle_delay,
        });
        Ok(())
    }

    /// Request the follow-up for `call_id` if it is still pending
    async fn acknowledge(&mut self, call_id: &str) -> Result<()> {
        let Some(index) = self.follow_ups.iter().position(|f| f.call_id == call_id) else {
            return Ok(());
        };
        self.follow_ups.remove(index);
        tracing::debug!(call_id, "function output acknowledged");
        self.transport.send(&ClientEvent::ResponseCreate).await
    }
}

/// Play finished responses one after another
async fn play_queue(playback: Arc<dyn PlaybackSink>, mut audio: mpsc::UnboundedReceiver<Vec<u8>>) {
    while let Some(wav) = audio.recv().await {
        if let Err(e) = playback.play_wav(wav).await {
            tracing::warn!(error = %e, "playback failed");
        }
    }
}
