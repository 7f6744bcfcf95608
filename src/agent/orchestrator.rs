//! Turn-based voice conversation
//!
//! One activation listens for a single utterance, transcribes it and runs the
//! tool-calling loop until the model stops asking for tools. With the
//! continuous flag set on the session handle, [`Orchestrator::run`] starts
//! listening again after every turn.

use std::sync::Arc;

use super::context::opening_messages;
use crate::host::DocumentSurface;
use crate::llm::{ChatModel, ConversationMessage, ToolCall};
use crate::session::{Session, SessionState};
use crate::tools::{EditorTool, ToolDispatcher, ToolInvocation, ToolRegistry, default_registry};
use crate::voice::{AudioFrameSource, SegmenterConfig, SpeechSegmenter, Transcriber, Utterance};
use crate::{Error, Result};

/// Default bound on model requests per turn
pub const DEFAULT_MAX_ITERATIONS: usize = 8;

/// Call id used for the zero-tool fallback
const FALLBACK_CALL_ID: &str = "fallback";

/// Tuning for the turn loop
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Model requests allowed per turn
    pub max_iterations: usize,
    /// Utterance detection
    pub segmenter: SegmenterConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            segmenter: SegmenterConfig::default(),
        }
    }
}

/// How a turn ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The model finished after calling at least one tool
    Completed,
    /// No tool was called; the fallback tool ran
    Fallback,
    /// The model kept calling tools until the iteration cap
    IterationCapReached,
    /// Cancelled before the turn finished
    Cancelled,
    /// Nothing was said or recognised
    NoSpeech,
}

/// Summary of one turn
#[derive(Debug, Clone)]
pub struct TurnReport {
    pub transcript: String,
    /// Every dispatched call in order, including the fallback
    pub invocations: Vec<ToolInvocation>,
    /// Model requests made
    pub iterations: usize,
    /// Text of the model's last answer, if any
    pub final_text: Option<String>,
    pub outcome: TurnOutcome,
}

impl TurnReport {
    fn empty(outcome: TurnOutcome) -> Self {
        Self {
            transcript: String::new(),
            invocations: Vec::new(),
            iterations: 0,
            final_text: None,
            outcome,
        }
    }

    /// Calls requested by the model, excluding the fallback
    #[must_use]
    pub fn tools_used(&self) -> usize {
        self.invocations
            .iter()
            .filter(|i| i.call_id != FALLBACK_CALL_ID)
            .count()
    }
}

/// Drives turn-based sessions
pub struct Orchestrator {
    model: Arc<dyn ChatModel>,
    transcriber: Arc<dyn Transcriber>,
    host: Arc<dyn DocumentSurface>,
    dispatcher: ToolDispatcher,
    config: OrchestratorConfig,
}

impl Orchestrator {
    /// Create an orchestrator with the built-in editor tools
    #[must_use]
    pub fn new(
        model: Arc<dyn ChatModel>,
        transcriber: Arc<dyn Transcriber>,
        host: Arc<dyn DocumentSurface>,
    ) -> Self {
        let registry = Arc::new(default_registry(&host));
        Self {
            model,
            transcriber,
            host,
            dispatcher: ToolDispatcher::new(registry),
            config: OrchestratorConfig::default(),
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
    pub fn with_config(mut self, mut config: OrchestratorConfig) -> Self {
        config.max_iterations = config.max_iterations.max(1);
        self.config = config;
        self
    }

    /// Run turns until the session is cancelled or leaves continuous mode
    ///
    /// # Errors
    ///
    /// Returns `Error::Capture` if the audio source cannot start or closes
    /// without delivering audio; other turn errors are reported to the user and the loop goes on
    pub async fn run(
        &self,
        session: &mut Session,
        source: &mut dyn AudioFrameSource,
    ) -> Result<Vec<TurnReport>> {
        let mut reports = Vec::new();

        loop {
            match self.run_once(session, source).await {
                Ok(report) => reports.push(report),
                Err(e @ Error::Capture(_)) => return Err(e),
                Err(e) => tracing::warn!(error = %e, "turn failed"),
            }

            let handle = session.handle();
            if !handle.is_continuous() || handle.is_cancelled() {
                break;
            }
            tracing::debug!(turns = reports.len(), "continuous mode, listening again");
        }

        Ok(reports)
    }

    /// Listen for one utterance and act on it
    ///
    /// # Errors
    ///
    /// Returns `Error::Capture` if the audio source cannot start or closes
    /// without delivering audio and `Error::Transcription` if the utterance cannot be transcribed. Both
    /// are shown to the user first.
    pub async fn run_once(
        &self,
        session: &mut Session,
        source: &mut dyn AudioFrameSource,
    ) -> Result<TurnReport> {
        session.clear_turn();
        let handle = session.handle().clone();

        if handle.is_cancelled() {
            return Ok(TurnReport::empty(TurnOutcome::Cancelled));
        }
        handle.transition(SessionState::Listening)?;
        self.host.set_status("Ready to listen").await;

        let utterance = match self.listen(session, source).await {
            Ok(utterance) => utterance,
            Err(e) => {
                self.host.notify_user(&e.to_string()).await;
                self.finish(session).await;
                return Err(e);
            }
        };

        if handle.is_cancelled() {
            self.finish(session).await;
            return Ok(TurnReport::empty(TurnOutcome::Cancelled));
        }

        let Some(utterance) = utterance else {
            tracing::debug!("no utterance captured");
            self.finish(session).await;
            return Ok(TurnReport::empty(TurnOutcome::NoSpeech));
        };

        self.host.set_status("Processing...").await;
        handle.transition(SessionState::Transcribing)?;
        tracing::debug!(duration_ms = utterance.duration_ms(), "transcribing utterance");

        let transcript = match self.transcriber.transcribe(&utterance.to_wav()).await {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "transcription failed");
                self.host.notify_user(&e.to_string()).await;
                self.finish(session).await;
                return Err(e);
            }
        };

        if transcript.is_empty() {
            self.host.notify_user("Nothing recognised").await;
            self.finish(session).await;
            return Ok(TurnReport::empty(TurnOutcome::NoSpeech));
        }

        Ok(self.respond(session, &transcript).await)
    }

    /// Run the tool loop for an already transcribed request
    ///
    /// The session may be `Idle` or `Transcribing`; it is back in `Idle`
    /// when this returns.
    pub async fn respond(&self, session: &mut Session, transcript: &str) -> TurnReport {
        let handle = session.handle().clone();
        if handle.state() == SessionState::Idle {
            // typed requests skip capture
            if let Err(e) = handle
                .transition(SessionState::Listening)
                .and_then(|()| handle.transition(SessionState::Transcribing))
            {
                tracing::debug!(error = %e, "typed request did not enter transcribing");
            }
        }
        tracing::info!(session_id = %session.id(), transcript, "processing voice command");
        self.host.notify_user(transcript).await;

        if session.history.is_empty() {
            for message in opening_messages(self.host.as_ref(), transcript).await {
                session.push_message(message);
            }
        } else {
            session.push_message(ConversationMessage::user(transcript));
        }

        let specs = self.dispatcher.registry().specs();
        let cap = self.config.max_iterations;
        let mut report = TurnReport::empty(TurnOutcome::Completed);
        report.transcript = transcript.to_string();

        'turn: loop {
            if handle.is_cancelled() {
                report.outcome = TurnOutcome::Cancelled;
                break;
            }
            if report.iterations == cap {
                let err = Error::IterationCapExceeded(cap);
                tracing::warn!(cap, "iteration cap reached");
                self.host.notify_user(&err.to_string()).await;
                report.outcome = TurnOutcome::IterationCapReached;
                break;
            }
            if handle.transition(SessionState::AwaitModel).is_err() {
                report.outcome = TurnOutcome::Cancelled;
                break;
            }

            report.iterations += 1;
            let turn = match self.model.complete(&session.history, &specs).await {
                Ok(turn) => turn,
                Err(e) => {
                    tracing::warn!(error = %e, iteration = report.iterations, "model request failed");
                    self.host.notify_user(&e.to_string()).await;
                    break;
                }
            };

            session.push_message(ConversationMessage::assistant(
                turn.text.clone().unwrap_or_default(),
                turn.tool_calls.clone(),
            ));
            report.final_text = turn.text;

            if turn.tool_calls.is_empty() {
                break;
            }
            session.pending_tool_calls.extend(turn.tool_calls);

            while let Some(call) = session.pending_tool_calls.pop_front() {
                if handle.is_cancelled() || handle.transition(SessionState::Dispatching).is_err() {
                    tracing::info!(
                        skipped = session.pending_tool_calls.len() + 1,
                        "turn cancelled, dropping pending tool calls"
                    );
                    session.pending_tool_calls.clear();
                    report.outcome = TurnOutcome::Cancelled;
                    break 'turn;
                }

                let invocation = self.dispatch(session, &call).await;
                report.invocations.push(invocation);
            }
        }

        if report.outcome == TurnOutcome::Cancelled {
            tracing::info!(session_id = %session.id(), "turn cancelled");
        } else if report.invocations.is_empty() {
            self.run_fallback(session, transcript, &mut report).await;
        } else {
            self.host
                .notify_user(&format!("Tools used: {}", report.tools_used()))
                .await;
        }

        self.finish(session).await;
        report
    }

    async fn run_fallback(&self, session: &mut Session, transcript: &str, report: &mut TurnReport) {
        let fallback = EditorTool::FALLBACK.name();
        if !self.dispatcher.registry().contains(fallback) {
            tracing::warn!(tool = fallback, "no tools used and no fallback registered");
            return;
        }

        self.host
            .notify_user(&format!("No tools used, delegating to {fallback}"))
            .await;

        if session.state() == SessionState::AwaitModel {
            if let Err(e) = session.handle().transition(SessionState::Dispatching) {
                tracing::debug!(error = %e, "fallback dispatched outside the tool loop");
            }
        }

        let arguments = serde_json::json!({ "input": transcript }).to_string();
        let call = ToolCall::new(FALLBACK_CALL_ID, fallback, arguments);
        let invocation = self.dispatcher.dispatch(&call).await;
        report.invocations.push(invocation);
        report.outcome = TurnOutcome::Fallback;
    }

    async fn dispatch(&self, session: &mut Session, call: &ToolCall) -> ToolInvocation {
        self.host
            .notify_user(&format!("{}({})", call.name, call.arguments))
            .await;
        let invocation = self.dispatcher.dispatch(call).await;
        session.push_message(ConversationMessage::tool(&call.id, &invocation.result));
        invocation
    }

    /// Wait for one utterance or cancellation
    async fn listen(
        &self,
        session: &Session,
        source: &mut dyn AudioFrameSource,
    ) -> Result<Option<Utterance>> {
        let handle = session.handle();
        let mut frames = source.start()?;
        let mut segmenter = SpeechSegmenter::new(self.config.segmenter);
        let mut announced = false;
        let mut received = 0usize;

        let utterance = loop {
            tokio::select! {
                biased;
                () = handle.cancelled() => break None,
                frame = frames.recv() => {
                    let Some(frame) = frame else {
                        if received == 0 {
                            source.stop();
                            return Err(Error::Capture(
                                "audio input closed before delivering any audio".to_string(),
                            ));
                        }
                        let rest = segmenter.finish();
                        break (!rest.is_empty()).then_some(rest);
                    };
                    received += 1;
                    if let Some(utterance) = segmenter.push(&frame) {
                        break Some(utterance);
                    }
                    if !announced && segmenter.is_speaking() {
                        announced = true;
                        self.host.set_status("Listening...").await;
                    }
                }
            }
        };

        source.stop();
        Ok(utterance.filter(|u| !u.is_empty()))
    }

    async fn finish(&self, session: &Session) {
        session.handle().settle_idle();
        self.host.set_status("Fairy ready").await;
    }
}
