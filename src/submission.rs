// src/submission.rs
use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use crate::errors::{EvalError, Result, ValidationError};
use crate::inputs::{FileBlob, InputSlot, SlotKind, Snapshot};
use crate::report::{EvaluationReport, ReportView};
use crate::transport::{EvaluationTransport, TransportReply};

pub const GENERIC_FAILURE: &str = "Evaluation failed";
pub const ABANDONED: &str = "Evaluation was interrupted before a response arrived";

/// Lifecycle of the current (or most recent) submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Validating,
    ValidationFailed,
    Submitting,
    Succeeded,
    Failed,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Idle => "Idle",
            Phase::Validating => "Validating",
            Phase::ValidationFailed => "ValidationFailed",
            Phase::Submitting => "Submitting",
            Phase::Succeeded => "Succeeded",
            Phase::Failed => "Failed",
        };
        write!(f, "{}", name)
    }
}

/// Question paper or solution key after normalization: exactly one form.
#[derive(Debug, Clone, PartialEq)]
pub enum MaterialSource {
    File(FileBlob),
    Text(String),
}

impl MaterialSource {
    /// File wins over pasted text; empty text counts as absent.
    fn from_slot(slot: &InputSlot) -> Option<Self> {
        if let Some(file) = &slot.file {
            return Some(MaterialSource::File(file.clone()));
        }
        slot.provided_text()
            .map(|text| MaterialSource::Text(text.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    File(&'a FileBlob),
    Text(&'a str),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FormField<'a> {
    pub name: &'static str,
    pub value: FieldValue<'a>,
}

/// The validated payload. Only obtainable through [`SubmissionRequest::from_snapshot`].
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionRequest {
    answer_sheet: FileBlob,
    question_paper: MaterialSource,
    solution_key: MaterialSource,
}

impl SubmissionRequest {
    /// Checks readiness in a fixed order; the first missing material is reported.
    pub fn from_snapshot(snapshot: &Snapshot) -> std::result::Result<Self, ValidationError> {
        let answer_sheet = snapshot
            .answer_sheet
            .file
            .clone()
            .ok_or(ValidationError::MissingAnswerSheet)?;
        let question_paper = MaterialSource::from_slot(&snapshot.question_paper)
            .ok_or(ValidationError::MissingQuestionPaper)?;
        let solution_key = MaterialSource::from_slot(&snapshot.solution_key)
            .ok_or(ValidationError::MissingSolutionKey)?;

        Ok(Self {
            answer_sheet,
            question_paper,
            solution_key,
        })
    }

    pub fn answer_sheet(&self) -> &FileBlob {
        &self.answer_sheet
    }

    pub fn question_paper(&self) -> &MaterialSource {
        &self.question_paper
    }

    pub fn solution_key(&self) -> &MaterialSource {
        &self.solution_key
    }

    /// Multipart fields in transmission order. One field per material.
    pub fn fields(&self) -> Vec<FormField<'_>> {
        let mut fields = vec![FormField {
            name: SlotKind::AnswerSheet.file_field(),
            value: FieldValue::File(&self.answer_sheet),
        }];
        fields.extend(material_field(SlotKind::QuestionPaper, &self.question_paper));
        fields.extend(material_field(SlotKind::SolutionKey, &self.solution_key));
        fields
    }
}

fn material_field(kind: SlotKind, source: &MaterialSource) -> Option<FormField<'_>> {
    match source {
        MaterialSource::File(blob) => Some(FormField {
            name: kind.file_field(),
            value: FieldValue::File(blob),
        }),
        MaterialSource::Text(text) => kind.text_field().map(|name| FormField {
            name,
            value: FieldValue::Text(text),
        }),
    }
}

/// Turns a service reply into a report or the message to surface.
pub fn interpret_reply(reply: &TransportReply) -> Result<EvaluationReport> {
    if !reply.is_success() {
        return Err(EvalError::Request(failure_detail(&reply.body)));
    }

    let value: serde_json::Value = serde_json::from_str(&reply.body)?;

    // The service reports unreadable sheets with a 2xx and an `error` field.
    if value.get("results").is_none() {
        if let Some(message) = value.get("error").and_then(|e| e.as_str()) {
            return Err(EvalError::Request(message.to_string()));
        }
    }

    EvaluationReport::from_value(value)
}

/// `detail` string from an error body, or the generic message.
fn failure_detail(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(str::to_string))
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| GENERIC_FAILURE.to_string())
}

/// Bookkeeping for one validated attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub latency_ms: Option<u64>,
}

#[derive(Debug)]
struct ControllerState {
    phase: Phase,
    error: Option<String>,
    report: Option<EvaluationReport>,
    attempt: Option<Attempt>,
}

impl Default for ControllerState {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            error: None,
            report: None,
            attempt: None,
        }
    }
}

fn lock_state(state: &Mutex<ControllerState>) -> MutexGuard<'_, ControllerState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Held while a request is outstanding. If the submit future is dropped
/// before disarming, the attempt is closed as `Failed` so the controller
/// does not stay `Submitting`.
struct InFlight<'a> {
    state: &'a Mutex<ControllerState>,
    armed: bool,
}

impl InFlight<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = lock_state(self.state);
        if state.phase == Phase::Submitting {
            log::warn!("Submission dropped while in flight");
            if let Some(attempt) = state.attempt.as_mut() {
                attempt.finished_at = Some(Utc::now());
            }
            state.error = Some(ABANDONED.to_string());
            state.phase = Phase::Failed;
        }
    }
}

/// Drives validation, transmission and the observable phase.
///
/// State lives behind a mutex that is never held across the network call,
/// so the phase, error and report stay observable while a request is in flight.
pub struct SubmissionController<T> {
    transport: T,
    state: Mutex<ControllerState>,
}

impl<T: EvaluationTransport> SubmissionController<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            state: Mutex::new(ControllerState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, ControllerState> {
        lock_state(&self.state)
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn phase(&self) -> Phase {
        self.state().phase
    }

    pub fn error_message(&self) -> Option<String> {
        self.state().error.clone()
    }

    pub fn report(&self) -> Option<EvaluationReport> {
        self.state().report.clone()
    }

    pub fn view(&self) -> Option<ReportView> {
        self.state().report.as_ref().map(ReportView::from_report)
    }

    pub fn last_attempt(&self) -> Option<Attempt> {
        self.state().attempt.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.phase() == Phase::Submitting
    }

    /// Clears error and report. Refused while a submission is in flight.
    pub fn reset(&self) -> Result<()> {
        let mut state = self.state();
        if state.phase == Phase::Submitting {
            return Err(EvalError::Busy);
        }
        state.error = None;
        state.report = None;
        state.phase = Phase::Idle;
        Ok(())
    }

    /// Validates the snapshot, sends it, and records the outcome.
    ///
    /// Returns [`EvalError::Busy`] without touching state when another
    /// submission is still in flight.
    pub async fn submit(&self, snapshot: &Snapshot) -> Result<EvaluationReport> {
        let request = {
            let mut state = self.state();
            if state.phase == Phase::Submitting {
                log::warn!("Submission rejected: another evaluation is in flight");
                return Err(EvalError::Busy);
            }
            state.phase = Phase::Validating;

            match SubmissionRequest::from_snapshot(snapshot) {
                Ok(request) => {
                    state.error = None;
                    state.report = None;
                    state.attempt = Some(Attempt {
                        id: Uuid::new_v4(),
                        started_at: Utc::now(),
                        finished_at: None,
                        latency_ms: None,
                    });
                    state.phase = Phase::Submitting;
                    request
                }
                Err(e) => {
                    log::info!("Validation failed: {}", e);
                    state.error = Some(e.to_string());
                    state.phase = Phase::ValidationFailed;
                    return Err(e.into());
                }
            }
        };

        for field in request.fields() {
            match field.value {
                FieldValue::File(blob) => {
                    log::debug!("field {} <- file '{}' ({} bytes)", field.name, blob.name, blob.len())
                }
                FieldValue::Text(text) => {
                    log::debug!("field {} <- text ({} chars)", field.name, text.chars().count())
                }
            }
        }

        let mut in_flight = InFlight {
            state: &self.state,
            armed: true,
        };
        let outcome = self.transport.send(&request).await;

        let mut state = self.state();
        in_flight.disarm();
        if let Some(attempt) = state.attempt.as_mut() {
            attempt.finished_at = Some(Utc::now());
            attempt.latency_ms = outcome.as_ref().ok().map(|reply| reply.latency_ms);
        }

        let result = match outcome {
            Ok(reply) => interpret_reply(&reply),
            Err(EvalError::Transport(message)) => Err(EvalError::Transport(message)),
            Err(e) => Err(EvalError::Transport(e.user_message())),
        };

        match result {
            Ok(report) => {
                log::info!(
                    "✅ Evaluation succeeded: {} result(s)",
                    report.results.len()
                );
                state.report = Some(report.clone());
                state.phase = Phase::Succeeded;
                Ok(report)
            }
            Err(e) => {
                let message = e.user_message();
                log::error!("❌ Evaluation failed: {}", message);
                state.error = Some(message);
                state.phase = Phase::Failed;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inputs::InputCollector;
    use std::sync::Arc;
    use tokio::sync::Notify;

    fn blob(name: &str) -> FileBlob {
        FileBlob::new(name, b"bytes".to_vec())
    }

    fn ready_inputs() -> InputCollector {
        let mut inputs = InputCollector::new();
        inputs.set_file(SlotKind::AnswerSheet, Some(blob("sheet.png")));
        inputs.set_text(SlotKind::QuestionPaper, "Q1. Calculate the velocity.");
        inputs.set_file(SlotKind::SolutionKey, Some(blob("key.pdf")));
        inputs
    }

    fn reply(status: u16, body: &str) -> TransportReply {
        TransportReply {
            status,
            body: body.to_string(),
            latency_ms: 7,
        }
    }

    const REPORT_BODY: &str = r#"{
        "total_questions": 1, "total_marks_awarded": 3, "total_max_marks": 5, "percentage": 60,
        "results": [{"question_number": 1, "max_marks": 5, "marks_awarded": 3,
                     "student_answer": "v = 20 m/s", "feedback": "Partially correct"}]
    }"#;

    /// Replays scripted outcomes and records the field names it was sent.
    struct ScriptedTransport {
        outcomes: Mutex<Vec<Result<TransportReply>>>,
        sent: Mutex<Vec<Vec<String>>>,
        gate: Option<Arc<Notify>>,
    }

    impl ScriptedTransport {
        fn new(outcomes: Vec<Result<TransportReply>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes),
                sent: Mutex::new(Vec::new()),
                gate: None,
            }
        }

        fn sent(&self) -> Vec<Vec<String>> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl EvaluationTransport for ScriptedTransport {
        async fn send(&self, request: &SubmissionRequest) -> Result<TransportReply> {
            let names = request.fields().iter().map(|f| f.name.to_string()).collect();
            self.sent.lock().unwrap().push(names);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.outcomes.lock().unwrap().remove(0)
        }
    }

    #[test]
    fn validation_order_first_failure_wins() {
        let empty = InputCollector::new().snapshot();
        assert_eq!(
            SubmissionRequest::from_snapshot(&empty),
            Err(ValidationError::MissingAnswerSheet)
        );

        let mut inputs = InputCollector::new();
        inputs.set_file(SlotKind::AnswerSheet, Some(blob("sheet.pdf")));
        inputs.set_file(SlotKind::SolutionKey, Some(blob("key.pdf")));
        inputs.set_text(SlotKind::QuestionPaper, "");
        assert_eq!(
            SubmissionRequest::from_snapshot(&inputs.snapshot()),
            Err(ValidationError::MissingQuestionPaper)
        );

        // Still the question paper when the solution key is missing too.
        inputs.clear(SlotKind::SolutionKey);
        assert_eq!(
            SubmissionRequest::from_snapshot(&inputs.snapshot()),
            Err(ValidationError::MissingQuestionPaper)
        );

        inputs.set_text(SlotKind::QuestionPaper, "Q1");
        assert_eq!(
            SubmissionRequest::from_snapshot(&inputs.snapshot()),
            Err(ValidationError::MissingSolutionKey)
        );
    }

    #[test]
    fn file_takes_precedence_over_text() {
        let mut inputs = ready_inputs();
        inputs.set_file(SlotKind::QuestionPaper, Some(blob("qp.pdf")));
        inputs.set_text(SlotKind::SolutionKey, r#"{"1": {"text": "v = d/t", "marks": 5}}"#);

        let request = SubmissionRequest::from_snapshot(&inputs.snapshot()).unwrap();
        let names: Vec<_> = request.fields().iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["answer_sheet", "question_paper", "solution_key"]);
    }

    #[test]
    fn text_used_when_no_file() {
        let request = SubmissionRequest::from_snapshot(&ready_inputs().snapshot()).unwrap();
        let fields = request.fields();
        assert_eq!(fields[1].name, "question_paper_text");
        assert_eq!(fields[1].value, FieldValue::Text("Q1. Calculate the velocity."));
        assert_eq!(fields.len(), 3);
    }

    #[test]
    fn failure_detail_extraction() {
        assert_eq!(failure_detail(r#"{"detail": "Unsupported file format"}"#), "Unsupported file format");
        assert_eq!(failure_detail(r#"{"detail": [{"msg": "field required"}]}"#), GENERIC_FAILURE);
        assert_eq!(failure_detail(r#"{"detail": ""}"#), GENERIC_FAILURE);
        assert_eq!(failure_detail("Internal Server Error"), GENERIC_FAILURE);
    }

    #[test]
    fn error_payload_with_success_status_is_a_failure() {
        let err = interpret_reply(&reply(200, r#"{"error": "OCR failed to extract text or sheet was illegible."}"#))
            .unwrap_err();
        assert_eq!(err.user_message(), "OCR failed to extract text or sheet was illegible.");
    }

    #[tokio::test]
    async fn missing_answer_sheet_never_transmits() {
        let controller = SubmissionController::new(ScriptedTransport::new(vec![]));
        let mut inputs = ready_inputs();
        inputs.clear(SlotKind::AnswerSheet);

        let err = controller.submit(&inputs.snapshot()).await.unwrap_err();
        assert!(matches!(err, EvalError::Validation(ValidationError::MissingAnswerSheet)));
        assert_eq!(controller.phase(), Phase::ValidationFailed);
        assert_eq!(controller.error_message().as_deref(), Some("Please upload an Answer Sheet."));
        assert!(controller.transport().sent().is_empty());
    }

    #[tokio::test]
    async fn success_exposes_report() {
        let controller = SubmissionController::new(ScriptedTransport::new(vec![Ok(reply(200, REPORT_BODY))]));

        let report = controller.submit(&ready_inputs().snapshot()).await.unwrap();
        assert_eq!(report.results.len(), 1);
        assert_eq!(controller.phase(), Phase::Succeeded);
        assert!(controller.error_message().is_none());

        let view = controller.view().unwrap();
        assert_eq!(view.percentage_label(), "60%");
        assert_eq!(view.rows[0].score_label(), "3 / 5");

        let attempt = controller.last_attempt().unwrap();
        assert_eq!(attempt.latency_ms, Some(7));
        assert!(attempt.finished_at.is_some());
        assert_eq!(
            controller.transport().sent(),
            vec![vec!["answer_sheet", "question_paper_text", "solution_key"]]
        );
    }

    #[tokio::test]
    async fn request_error_uses_detail() {
        let controller = SubmissionController::new(ScriptedTransport::new(vec![Ok(reply(
            400,
            r#"{"detail": "Unsupported file format"}"#,
        ))]));

        let err = controller.submit(&ready_inputs().snapshot()).await.unwrap_err();
        assert!(matches!(err, EvalError::Request(_)));
        assert_eq!(controller.phase(), Phase::Failed);
        assert_eq!(controller.error_message().as_deref(), Some("Unsupported file format"));
        assert!(controller.report().is_none());
    }

    #[tokio::test]
    async fn transport_error_surfaces_underlying_message() {
        let controller = SubmissionController::new(ScriptedTransport::new(vec![Err(EvalError::Transport(
            "error sending request: connection refused".into(),
        ))]));

        controller.submit(&ready_inputs().snapshot()).await.unwrap_err();
        assert_eq!(controller.phase(), Phase::Failed);
        assert_eq!(
            controller.error_message().as_deref(),
            Some("error sending request: connection refused")
        );
        assert_eq!(controller.last_attempt().unwrap().latency_ms, None);
    }

    #[tokio::test]
    async fn validation_failure_keeps_previous_report() {
        let controller = SubmissionController::new(ScriptedTransport::new(vec![Ok(reply(200, REPORT_BODY))]));
        controller.submit(&ready_inputs().snapshot()).await.unwrap();

        let mut inputs = ready_inputs();
        inputs.set_text(SlotKind::QuestionPaper, "");
        controller.submit(&inputs.snapshot()).await.unwrap_err();

        assert_eq!(controller.phase(), Phase::ValidationFailed);
        assert_eq!(
            controller.error_message().as_deref(),
            Some("Please provide Question Paper (File or Text).")
        );
        assert!(controller.report().is_some());
    }

    #[tokio::test]
    async fn new_attempt_clears_stale_state_and_rejects_overlap() {
        let gate = Arc::new(Notify::new());
        let mut transport = ScriptedTransport::new(vec![
            Ok(reply(500, r#"{"detail": "Model offline"}"#)),
            Ok(reply(200, REPORT_BODY)),
        ]);
        transport.gate = Some(gate.clone());
        let controller = Arc::new(SubmissionController::new(transport));
        let snapshot = ready_inputs().snapshot();

        gate.notify_one();
        controller.submit(&snapshot).await.unwrap_err();
        assert_eq!(controller.error_message().as_deref(), Some("Model offline"));

        let task = {
            let controller = controller.clone();
            let snapshot = snapshot.clone();
            tokio::spawn(async move { controller.submit(&snapshot).await })
        };
        while !controller.is_busy() {
            tokio::task::yield_now().await;
        }

        // In flight: stale error and report are gone, overlap is refused.
        assert!(controller.error_message().is_none());
        assert!(controller.report().is_none());
        assert!(matches!(controller.submit(&snapshot).await, Err(EvalError::Busy)));
        assert!(matches!(controller.reset(), Err(EvalError::Busy)));
        assert_eq!(controller.phase(), Phase::Submitting);

        gate.notify_one();
        task.await.unwrap().unwrap();
        assert_eq!(controller.phase(), Phase::Succeeded);
        assert_eq!(controller.transport().sent().len(), 2);

        controller.reset().unwrap();
        assert_eq!(controller.phase(), Phase::Idle);
        assert!(controller.report().is_none());
    }

    #[tokio::test]
    async fn dropped_submit_does_not_wedge_the_controller() {
        let mut transport = ScriptedTransport::new(vec![Ok(reply(200, REPORT_BODY))]);
        let gate = Arc::new(Notify::new());
        transport.gate = Some(gate.clone());
        let controller = SubmissionController::new(transport);
        let snapshot = ready_inputs().snapshot();

        let timed_out = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            controller.submit(&snapshot),
        )
        .await;
        assert!(timed_out.is_err());

        assert_eq!(controller.phase(), Phase::Failed);
        assert_eq!(controller.error_message().as_deref(), Some(ABANDONED));
        assert!(controller.last_attempt().unwrap().finished_at.is_some());

        gate.notify_one();
        controller.submit(&snapshot).await.unwrap();
        assert_eq!(controller.phase(), Phase::Succeeded);

        controller.reset().unwrap();
        assert_eq!(controller.phase(), Phase::Idle);
    }
}
