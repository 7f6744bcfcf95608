//! Turn-based orchestration tests
//!
//! Drive full turns with a scripted model, transcriber and microphone
//! against an in-memory document.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use fairy::agent::{Orchestrator, OrchestratorConfig, TurnOutcome};
use fairy::host::{DocumentSurface, Position};
use fairy::llm::{ModelTurn, Role, ToolCall};
use fairy::session::{Mode, Session, SessionHandle, SessionState};
use fairy::tools::{DispatchError, EditorTool, ToolDefinition, ToolHandler, ToolRegistry, ToolSpec};
use fairy::voice::AudioFrameSource;
use fairy::{Error, Result};

mod common;

use common::{
    ScriptedFrameSource, ScriptedModel, ScriptedTranscriber, URI, call, document, silence_frames,
    utterance_frames,
};

fn orchestrator(
    model: &Arc<ScriptedModel>,
    transcriber: ScriptedTranscriber,
    host: &Arc<dyn DocumentSurface>,
) -> Orchestrator {
    Orchestrator::new(model.clone(), Arc::new(transcriber), Arc::clone(host))
}

/// Cancels the session when called
struct HaltTool(SessionHandle);

#[async_trait]
impl ToolHandler for HaltTool {
    async fn call(&self, _args: Value) -> Result<String> {
        self.0.cancel();
        Ok("halted".to_string())
    }
}

struct PanicTool;

#[async_trait]
impl ToolHandler for PanicTool {
    async fn call(&self, _args: Value) -> Result<String> {
        panic!("tool blew up");
    }
}

#[tokio::test]
async fn test_spoken_save_runs_one_tool_and_ends() {
    let (doc, host) = document();
    let model = Arc::new(ScriptedModel::new([
        call("c1", "Save", json!({})),
        ModelTurn::text("Saved it."),
    ]));
    let orchestrator = orchestrator(&model, ScriptedTranscriber::new(&["save the file"]), &host);

    let mut session = Session::new(Mode::TurnBased);
    let mut source = ScriptedFrameSource::new([utterance_frames()]);
    let report = orchestrator.run_once(&mut session, &mut source).await.unwrap();

    assert_eq!(report.outcome, TurnOutcome::Completed);
    assert_eq!(report.transcript, "save the file");
    assert_eq!(report.iterations, 2);
    assert_eq!(report.tools_used(), 1);
    assert_eq!(report.final_text.as_deref(), Some("Saved it."));
    assert_eq!(doc.save_count().await, 1);

    // the tool result is in the history the model sees next
    let requests = model.requests();
    assert_eq!(requests.len(), 2);
    let last = requests[1].last().unwrap();
    assert_eq!(last.role, Role::Tool);
    assert_eq!(last.tool_call_id.as_deref(), Some("c1"));
    assert_eq!(last.text, format!("Saved file {URI}"));

    let notifications = doc.notifications().await;
    assert_eq!(
        notifications,
        vec!["save the file", "Save({})", "Tools used: 1"]
    );

    let statuses = doc.statuses().await;
    assert_eq!(statuses.first().map(String::as_str), Some("Ready to listen"));
    assert!(statuses.contains(&"Listening...".to_string()));
    assert!(statuses.contains(&"Processing...".to_string()));
    assert!(statuses.contains(&"Saved file".to_string()));
    assert_eq!(statuses.last().map(String::as_str), Some("Fairy ready"));

    assert_eq!(session.state(), SessionState::Idle);
    assert!(!source.is_running());
}

#[tokio::test]
async fn test_multiple_calls_run_in_order() {
    let (doc, host) = document();
    let model = Arc::new(ScriptedModel::new([
        ModelTurn::calls(vec![
            ToolCall::new(
                "c1",
                "ReplaceCodeAtLine",
                json!({"line": 5, "code": "    let y = 3;"}).to_string(),
            ),
            ToolCall::new("c2", "FocusLines", json!({"start": 4, "end": 6}).to_string()),
        ]),
        ModelTurn::text("done"),
    ]));
    let orchestrator = orchestrator(&model, ScriptedTranscriber::default(), &host);

    let mut session = Session::new(Mode::TurnBased);
    let report = orchestrator
        .respond(&mut session, "set y to three and show me")
        .await;

    assert_eq!(report.outcome, TurnOutcome::Completed);
    let names: Vec<&str> = report.invocations.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, ["ReplaceCodeAtLine", "FocusLines"]);
    assert!(report.invocations.iter().all(|i| i.is_success()));

    let text = doc.get_text().await;
    assert_eq!(text.split('\n').nth(4), Some("    let y = 3;"));
    assert_eq!(
        doc.revealed().await,
        vec![(Position::line_start(3), Position::line_start(5))]
    );

    let statuses = doc.statuses().await;
    let replaced = statuses.iter().position(|s| s == "Replaced line 5").unwrap();
    let focused = statuses
        .iter()
        .position(|s| s == "Focusing on lines 4 to 6")
        .unwrap();
    assert!(replaced < focused);

    // assistant message, then one tool message per call in call order
    let tool_ids: Vec<Option<&str>> = session
        .history
        .iter()
        .filter(|m| m.role == Role::Tool)
        .map(|m| m.tool_call_id.as_deref())
        .collect();
    assert_eq!(tool_ids, [Some("c1"), Some("c2")]);
}

#[tokio::test]
async fn test_tool_loop_is_bounded() {
    let (doc, host) = document();
    let model = Arc::new(ScriptedModel::always(call(
        "again",
        "Response",
        json!({"response": "still working"}),
    )));
    let orchestrator = orchestrator(&model, ScriptedTranscriber::default(), &host).with_config(
        OrchestratorConfig {
            max_iterations: 3,
            ..OrchestratorConfig::default()
        },
    );

    let mut session = Session::new(Mode::TurnBased);
    let report = orchestrator.respond(&mut session, "keep going").await;

    assert_eq!(report.outcome, TurnOutcome::IterationCapReached);
    assert_eq!(model.request_count(), 3);
    assert_eq!(report.iterations, 3);
    assert_eq!(report.invocations.len(), 3);

    let notifications = doc.notifications().await;
    assert!(notifications.contains(&Error::IterationCapExceeded(3).to_string()));
    assert_eq!(session.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_zero_tool_turn_falls_back() {
    let (doc, host) = document();
    let model = Arc::new(ScriptedModel::new([ModelTurn::text("Sure, thinking about it.")]));
    let orchestrator = orchestrator(&model, ScriptedTranscriber::default(), &host);

    let mut session = Session::new(Mode::TurnBased);
    let report = orchestrator.respond(&mut session, "make it faster").await;

    assert_eq!(report.outcome, TurnOutcome::Fallback);
    assert_eq!(report.tools_used(), 0);
    assert_eq!(report.invocations.len(), 1);
    assert_eq!(report.invocations[0].name, EditorTool::FALLBACK.name());
    assert_eq!(
        report.invocations[0].arguments,
        Some(json!({"input": "make it faster"}))
    );
    assert_eq!(doc.delegated().await, vec!["make it faster"]);
    assert!(
        doc.notifications()
            .await
            .contains(&"No tools used, delegating to ModifyCode".to_string())
    );
}

#[tokio::test]
async fn test_model_failure_is_reported_then_falls_back() {
    let (doc, host) = document();
    let model = Arc::new(ScriptedModel::failing("service unavailable"));
    let orchestrator = orchestrator(&model, ScriptedTranscriber::default(), &host);

    let mut session = Session::new(Mode::TurnBased);
    let report = orchestrator.respond(&mut session, "rename x").await;

    assert_eq!(report.outcome, TurnOutcome::Fallback);
    assert!(
        doc.notifications()
            .await
            .iter()
            .any(|n| n.contains("service unavailable"))
    );
    assert_eq!(doc.delegated().await, vec!["rename x"]);
}

#[tokio::test]
async fn test_bad_calls_become_error_results() {
    let (_doc, host) = document();
    let model = Arc::new(ScriptedModel::new([
        ModelTurn::calls(vec![
            ToolCall::new("c1", "Teleport", "{}"),
            ToolCall::new("c2", "ReplaceCodeAtLine", "{not json"),
            ToolCall::new("c3", "DeleteLines", json!({"start": 9}).to_string()),
        ]),
        ModelTurn::text("sorry"),
    ]));
    let orchestrator = orchestrator(&model, ScriptedTranscriber::default(), &host);

    let mut session = Session::new(Mode::TurnBased);
    let report = orchestrator.respond(&mut session, "do something odd").await;

    assert_eq!(report.outcome, TurnOutcome::Completed);
    assert_eq!(model.request_count(), 2);
    assert!(matches!(
        report.invocations[0].error,
        Some(DispatchError::UnknownTool(_))
    ));
    assert!(matches!(
        report.invocations[1].error,
        Some(DispatchError::InvalidArguments(_))
    ));
    assert!(report.invocations[1].arguments.is_none());
    assert!(matches!(
        report.invocations[2].error,
        Some(DispatchError::InvalidArguments(_))
    ));

    let results: Vec<&str> = session
        .history
        .iter()
        .filter(|m| m.role == Role::Tool)
        .map(|m| m.text.as_str())
        .collect();
    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|r| r.starts_with("Error:")));
}

#[tokio::test]
async fn test_panicking_tool_does_not_end_the_turn() {
    let (_doc, host) = document();
    let registry = ToolRegistry::new([
        ToolDefinition::new(ToolSpec::new("Explode", "Always panics"), Arc::new(PanicTool)),
        EditorTool::Save.definition(Arc::clone(&host)),
    ]);
    let model = Arc::new(ScriptedModel::new([
        ModelTurn::calls(vec![
            ToolCall::new("c1", "Explode", "{}"),
            ToolCall::new("c2", "Save", "{}"),
        ]),
        ModelTurn::text("ok"),
    ]));
    let orchestrator = orchestrator(&model, ScriptedTranscriber::default(), &host)
        .with_registry(Arc::new(registry));

    let mut session = Session::new(Mode::TurnBased);
    let report = orchestrator.respond(&mut session, "explode then save").await;

    assert_eq!(report.outcome, TurnOutcome::Completed);
    assert!(matches!(
        report.invocations[0].error,
        Some(DispatchError::Execution(_))
    ));
    assert!(report.invocations[1].is_success());
}

#[tokio::test]
async fn test_cancel_drops_pending_calls() {
    let (doc, host) = document();
    let mut session = Session::new(Mode::TurnBased);
    let registry = ToolRegistry::new([
        ToolDefinition::new(
            ToolSpec::new("Halt", "Stop the session"),
            Arc::new(HaltTool(session.handle().clone())),
        ),
        EditorTool::Save.definition(Arc::clone(&host)),
    ]);
    let model = Arc::new(ScriptedModel::new([ModelTurn::calls(vec![
        ToolCall::new("c1", "Halt", "{}"),
        ToolCall::new("c2", "Save", "{}"),
    ])]));
    let orchestrator = orchestrator(&model, ScriptedTranscriber::default(), &host)
        .with_registry(Arc::new(registry));

    let report = orchestrator.respond(&mut session, "stop").await;

    assert_eq!(report.outcome, TurnOutcome::Cancelled);
    assert_eq!(report.invocations.len(), 1);
    assert_eq!(doc.save_count().await, 0);
    assert_eq!(model.request_count(), 1);
    assert!(session.pending_tool_calls.is_empty());
    assert_eq!(session.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_cancelled_session_does_not_listen() {
    let (_doc, host) = document();
    let model = Arc::new(ScriptedModel::default());
    let orchestrator = orchestrator(&model, ScriptedTranscriber::default(), &host);

    let mut session = Session::new(Mode::TurnBased);
    session.handle().cancel();
    let mut source = ScriptedFrameSource::new([utterance_frames()]);

    let report = orchestrator.run_once(&mut session, &mut source).await.unwrap();
    assert_eq!(report.outcome, TurnOutcome::Cancelled);
    assert_eq!(source.starts, 0);
    assert_eq!(model.request_count(), 0);
}

#[tokio::test]
async fn test_silence_yields_no_speech() {
    let (_doc, host) = document();
    let model = Arc::new(ScriptedModel::default());
    let transcriber = ScriptedTranscriber::new(&["unused"]);
    let orchestrator = Orchestrator::new(model.clone(), Arc::new(transcriber), Arc::clone(&host));

    let mut session = Session::new(Mode::TurnBased);
    let mut source = ScriptedFrameSource::new([silence_frames(60)]);

    let report = orchestrator.run_once(&mut session, &mut source).await.unwrap();
    assert_eq!(report.outcome, TurnOutcome::NoSpeech);
    assert_eq!(model.request_count(), 0);
    assert_eq!(session.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_transcription_failure_is_shown() {
    let (doc, host) = document();
    let model = Arc::new(ScriptedModel::default());
    let orchestrator = orchestrator(&model, ScriptedTranscriber::failing("bad audio"), &host);

    let mut session = Session::new(Mode::TurnBased);
    let mut source = ScriptedFrameSource::new([utterance_frames()]);

    let result = orchestrator.run_once(&mut session, &mut source).await;
    assert!(matches!(result, Err(Error::Transcription(_))));
    assert!(
        doc.notifications()
            .await
            .iter()
            .any(|n| n.contains("bad audio"))
    );
    assert_eq!(session.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_continuous_mode_listens_again() {
    let (doc, host) = document();
    let handle = SessionHandle::new(true);
    let mut registry_tools: Vec<ToolDefinition> = EditorTool::ALL
        .into_iter()
        .map(|tool| tool.definition(Arc::clone(&host)))
        .collect();
    registry_tools.push(ToolDefinition::new(
        ToolSpec::new("Goodbye", "End the session"),
        Arc::new(HaltTool(handle.clone())),
    ));

    let model = Arc::new(ScriptedModel::new([
        call("c1", "Save", json!({})),
        ModelTurn::text("saved"),
        call("c2", "Goodbye", json!({})),
    ]));
    let orchestrator = orchestrator(
        &model,
        ScriptedTranscriber::new(&["save", "that's all"]),
        &host,
    )
    .with_registry(Arc::new(ToolRegistry::new(registry_tools)));

    let mut session = Session::with_handle(Mode::TurnBased, handle);
    let mut source = ScriptedFrameSource::new([utterance_frames(), utterance_frames()]);

    let reports = orchestrator.run(&mut session, &mut source).await.unwrap();

    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].outcome, TurnOutcome::Completed);
    assert_eq!(reports[1].outcome, TurnOutcome::Cancelled);
    assert_eq!(source.starts, 2);
    assert_eq!(doc.save_count().await, 1);

    // each turn starts from a fresh context
    let requests = model.requests();
    assert_eq!(requests[2][0].role, Role::System);
    assert_eq!(requests[2].last().map(|m| m.text.as_str()), Some("that's all"));
}

#[tokio::test]
async fn test_missing_microphone_ends_the_loop() {
    let (doc, host) = document();
    let model = Arc::new(ScriptedModel::default());
    let orchestrator = orchestrator(&model, ScriptedTranscriber::default(), &host);

    let mut session = Session::with_handle(Mode::TurnBased, SessionHandle::new(true));
    let mut source = ScriptedFrameSource::default();

    let result = orchestrator.run(&mut session, &mut source).await;
    assert!(matches!(result, Err(Error::Capture(_))));
    assert!(
        doc.notifications()
            .await
            .iter()
            .any(|n| n.contains("no input device"))
    );
}

#[tokio::test]
async fn test_closed_audio_input_stops_continuous_mode() {
    let (doc, host) = document();
    let model = Arc::new(ScriptedModel::default());
    let orchestrator = orchestrator(&model, ScriptedTranscriber::default(), &host);

    let mut session = Session::with_handle(Mode::TurnBased, SessionHandle::new(true));
    // every start succeeds but the stream closes at once
    let mut source = ScriptedFrameSource::new(std::iter::repeat_n(Vec::new(), 50));

    let result = orchestrator.run(&mut session, &mut source).await;
    assert!(matches!(result, Err(Error::Capture(_))));
    assert_eq!(source.starts, 1);
    assert!(!source.is_running());
    assert_eq!(model.request_count(), 0);

    let statuses = doc.statuses().await;
    let ready = statuses.iter().filter(|s| *s == "Ready to listen").count();
    assert_eq!(ready, 1);
    assert_eq!(session.state(), SessionState::Idle);
}
