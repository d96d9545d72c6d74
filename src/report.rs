// src/report.rs
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt::Write as _;

use crate::errors::Result;

pub const UNIDENTIFIED_QUESTION: &str = "Unidentified Question";

/// The grading report as sent by the service. Every field is optional in
/// practice; numbers may arrive as JSON numbers or numeric strings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EvaluationReport {
    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub total_questions: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub total_marks_awarded: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub total_max_marks: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub percentage: Option<f64>,
    #[serde(default, deserialize_with = "lenient_results")]
    pub results: Vec<QuestionResult>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QuestionResult {
    /// Display-only; the service sends numbers, `"1a"` or `"UNIDENTIFIED"`.
    #[serde(default)]
    pub question_number: Value,
    #[serde(default, deserialize_with = "lenient_optional_text", skip_serializing_if = "Option::is_none")]
    pub question_text: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub student_answer: String,
    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub marks_awarded: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub max_marks: Option<f64>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub feedback: String,
}

fn value_to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

fn lenient_number<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_to_number))
}

fn lenient_optional_text<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

fn lenient_text<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    lenient_optional_text(deserializer).map(Option::unwrap_or_default)
}

fn lenient_results<'de, D>(deserializer: D) -> std::result::Result<Vec<QuestionResult>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Vec<QuestionResult>>::deserialize(deserializer).map(Option::unwrap_or_default)
}

impl EvaluationReport {
    pub fn from_json(body: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(body)?;
        Self::from_value(value)
    }

    /// Accepts both the flat report and the aggregate
    /// `{summary: {...}, details: [...]}` shape produced by the report agent.
    pub fn from_value(value: Value) -> Result<Self> {
        let is_aggregate = value.get("results").is_none()
            && (value.get("summary").is_some_and(Value::is_object)
                || value.get("details").is_some_and(Value::is_array));

        if !is_aggregate {
            return Ok(serde_json::from_value(normalize_answers(value))?);
        }

        let summary = value.get("summary").cloned().unwrap_or(Value::Null);
        let details = value
            .get("details")
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new()));
        let count = details.as_array().map_or(0, Vec::len);

        let flat = serde_json::json!({
            "total_questions": count,
            "total_marks_awarded": summary.get("total_marks_obtained"),
            "total_max_marks": summary.get("total_possible_marks"),
            "percentage": summary.get("percentage"),
            "results": details,
        });
        Ok(serde_json::from_value(normalize_answers(flat))?)
    }
}

/// Folds the report agent's `student_response` into `student_answer`.
/// When both are present `student_answer` wins.
fn normalize_answers(mut value: Value) -> Value {
    if let Some(results) = value.get_mut("results").and_then(Value::as_array_mut) {
        for entry in results.iter_mut().filter_map(Value::as_object_mut) {
            if let Some(response) = entry.remove("student_response") {
                entry.entry("student_answer").or_insert(response);
            }
        }
    }
    value
}

/// `marks_awarded >= max_marks`. Drives the binary pass/attention status.
pub fn has_full_credit(result: &QuestionResult) -> bool {
    match (result.marks_awarded, result.max_marks) {
        (Some(awarded), Some(max)) => awarded >= max,
        _ => false,
    }
}

/// `marks_awarded > 0`. Drives the accent and score pill tone.
///
/// Deliberately looser than [`has_full_credit`]; a row can be positive
/// while still needing attention.
pub fn has_partial_credit(result: &QuestionResult) -> bool {
    result.marks_awarded.is_some_and(|awarded| awarded > 0.0)
}

/// Formats a number the way a browser prints it: integers without a
/// fraction, absent values as an empty string.
pub fn format_number(value: Option<f64>) -> String {
    match value {
        None => String::new(),
        Some(v) if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 => format!("{}", v as i64),
        Some(v) => format!("{}", v),
    }
}

fn format_question_number(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditStatus {
    FullCredit,
    NeedsAttention,
}

impl std::fmt::Display for CreditStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CreditStatus::FullCredit => write!(f, "full credit"),
            CreditStatus::NeedsAttention => write!(f, "needs attention"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreTone {
    Positive,
    Negative,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuestionRow {
    pub number: String,
    pub label: String,
    pub student_answer: String,
    pub feedback: String,
    pub marks_awarded: Option<f64>,
    pub max_marks: Option<f64>,
    pub full_credit: bool,
    pub partial_credit: bool,
}

impl QuestionRow {
    pub fn from_result(result: &QuestionResult) -> Self {
        let label = result
            .question_text
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(UNIDENTIFIED_QUESTION)
            .to_string();

        Self {
            number: format_question_number(&result.question_number),
            label,
            student_answer: result.student_answer.clone(),
            feedback: result.feedback.clone(),
            marks_awarded: result.marks_awarded,
            max_marks: result.max_marks,
            full_credit: has_full_credit(result),
            partial_credit: has_partial_credit(result),
        }
    }

    pub fn heading(&self) -> String {
        format!("Q{}: {}", self.number, self.label)
    }

    pub fn score_label(&self) -> String {
        format!(
            "{} / {}",
            format_number(self.marks_awarded),
            format_number(self.max_marks)
        )
    }

    pub fn status(&self) -> CreditStatus {
        if self.full_credit {
            CreditStatus::FullCredit
        } else {
            CreditStatus::NeedsAttention
        }
    }

    pub fn tone(&self) -> ScoreTone {
        if self.partial_credit {
            ScoreTone::Positive
        } else {
            ScoreTone::Negative
        }
    }
}

/// Display-safe projection of a report. Rows keep the received order.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportView {
    pub total_questions: f64,
    pub total_marks_awarded: Option<f64>,
    pub total_max_marks: Option<f64>,
    pub percentage: Option<f64>,
    pub rows: Vec<QuestionRow>,
}

impl ReportView {
    pub fn from_report(report: &EvaluationReport) -> Self {
        Self {
            total_questions: report.total_questions.unwrap_or(0.0),
            total_marks_awarded: report.total_marks_awarded,
            total_max_marks: report.total_max_marks,
            percentage: report.percentage,
            rows: report.results.iter().map(QuestionRow::from_result).collect(),
        }
    }

    pub fn total_questions_label(&self) -> String {
        format_number(Some(self.total_questions))
    }

    pub fn total_score_label(&self) -> String {
        format!(
            "{} / {}",
            format_number(self.total_marks_awarded),
            format_number(self.total_max_marks)
        )
    }

    pub fn percentage_label(&self) -> String {
        format!("{}%", format_number(self.percentage))
    }

    /// Plain-text rendering for terminals.
    pub fn render_text(&self) -> String {
        let separator = "=".repeat(60);
        let mut out = String::new();

        let _ = writeln!(out, "{}", separator);
        let _ = writeln!(out, "📄 Evaluation Report");
        let _ = writeln!(out, "{}", separator);
        let _ = writeln!(out, "Total Questions: {}", self.total_questions_label());
        let _ = writeln!(out, "Total Score:     {}", self.total_score_label());
        let _ = writeln!(out, "Percentage:      {}", self.percentage_label());

        for row in &self.rows {
            let marker = match row.tone() {
                ScoreTone::Positive => "🟢",
                ScoreTone::Negative => "🔴",
            };
            let icon = match row.status() {
                CreditStatus::FullCredit => "✅",
                CreditStatus::NeedsAttention => "⚠️ ",
            };
            let _ = writeln!(out, "\n{} {}  [{}]", marker, row.heading(), row.score_label());
            let _ = writeln!(out, "   STUDENT ANSWER:");
            for line in row.student_answer.lines() {
                let _ = writeln!(out, "     {}", line);
            }
            let _ = writeln!(out, "   FEEDBACK: {} {}", icon, row.feedback);
        }
        let _ = writeln!(out, "{}", separator);
        out
    }
}
