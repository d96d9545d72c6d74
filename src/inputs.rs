// src/inputs.rs
use std::path::Path;
use std::sync::Arc;

use crate::errors::Result;

/// Which of the three evaluation materials a slot holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotKind {
    AnswerSheet,
    QuestionPaper,
    SolutionKey,
}

impl SlotKind {
    pub const ALL: [SlotKind; 3] = [
        SlotKind::AnswerSheet,
        SlotKind::QuestionPaper,
        SlotKind::SolutionKey,
    ];

    /// The answer sheet is a scan; only the other two can be pasted.
    pub fn accepts_text(self) -> bool {
        !matches!(self, SlotKind::AnswerSheet)
    }

    /// File-type hint for pickers. Never enforced by the core.
    pub fn accept_hint(self) -> &'static str {
        match self {
            SlotKind::AnswerSheet => "image/*, application/pdf",
            SlotKind::QuestionPaper | SlotKind::SolutionKey => "application/pdf",
        }
    }

    /// Multipart field name for the binary form of this material.
    pub fn file_field(self) -> &'static str {
        match self {
            SlotKind::AnswerSheet => "answer_sheet",
            SlotKind::QuestionPaper => "question_paper",
            SlotKind::SolutionKey => "solution_key",
        }
    }

    /// Multipart field name for the pasted-text form, if the slot has one.
    pub fn text_field(self) -> Option<&'static str> {
        match self {
            SlotKind::AnswerSheet => None,
            SlotKind::QuestionPaper => Some("question_paper_text"),
            SlotKind::SolutionKey => Some("solution_key_text"),
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            SlotKind::AnswerSheet => "Answer Sheet",
            SlotKind::QuestionPaper => "Question Paper",
            SlotKind::SolutionKey => "Solution Key",
        }
    }

    /// Whether a MIME type satisfies this slot's accept hint.
    pub fn matches_hint(self, mime: &str) -> bool {
        self.accept_hint().split(',').map(str::trim).any(|pattern| {
            match pattern.strip_suffix("/*") {
                Some(top) => mime.split('/').next() == Some(top),
                None => pattern == mime,
            }
        })
    }
}

impl std::fmt::Display for SlotKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.title())
    }
}

/// A picked file: display name plus its bytes. Cloning shares the bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct FileBlob {
    pub name: String,
    pub bytes: Arc<[u8]>,
}

impl FileBlob {
    pub fn new(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Reads a file from disk, keeping only its file name for display.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(name, bytes))
    }

    /// MIME type guessed from the file name, `application/octet-stream` if unknown.
    pub fn mime(&self) -> String {
        mime_guess::from_path(&self.name)
            .first_or_octet_stream()
            .essence_str()
            .to_string()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InputSlot {
    pub kind: SlotKind,
    pub file: Option<FileBlob>,
    pub text: Option<String>,
}

impl InputSlot {
    pub fn empty(kind: SlotKind) -> Self {
        Self {
            kind,
            file: None,
            text: None,
        }
    }

    /// Pasted text, only when non-empty.
    pub fn provided_text(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !t.is_empty())
    }

    /// True when the slot could take part in a submission.
    pub fn is_provided(&self) -> bool {
        self.file.is_some() || (self.kind.accepts_text() && self.provided_text().is_some())
    }
}

/// Immutable read of all three slots at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub answer_sheet: InputSlot,
    pub question_paper: InputSlot,
    pub solution_key: InputSlot,
}

impl Snapshot {
    pub fn slot(&self, kind: SlotKind) -> &InputSlot {
        match kind {
            SlotKind::AnswerSheet => &self.answer_sheet,
            SlotKind::QuestionPaper => &self.question_paper,
            SlotKind::SolutionKey => &self.solution_key,
        }
    }
}

/// Holds the user's materials. Never rejects input; readiness is checked at submit time.
#[derive(Debug, Clone)]
pub struct InputCollector {
    answer_sheet: InputSlot,
    question_paper: InputSlot,
    solution_key: InputSlot,
}

impl Default for InputCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl InputCollector {
    pub fn new() -> Self {
        Self {
            answer_sheet: InputSlot::empty(SlotKind::AnswerSheet),
            question_paper: InputSlot::empty(SlotKind::QuestionPaper),
            solution_key: InputSlot::empty(SlotKind::SolutionKey),
        }
    }

    fn slot_mut(&mut self, kind: SlotKind) -> &mut InputSlot {
        match kind {
            SlotKind::AnswerSheet => &mut self.answer_sheet,
            SlotKind::QuestionPaper => &mut self.question_paper,
            SlotKind::SolutionKey => &mut self.solution_key,
        }
    }

    /// Replaces the slot's file; `None` clears it.
    pub fn set_file(&mut self, kind: SlotKind, file: Option<FileBlob>) {
        if let Some(blob) = &file {
            let mime = blob.mime();
            if !kind.matches_hint(&mime) {
                log::warn!(
                    "{} '{}' has type {} (expected {})",
                    kind,
                    blob.name,
                    mime,
                    kind.accept_hint()
                );
            }
            log::debug!("{} set to '{}' ({} bytes)", kind, blob.name, blob.len());
        }
        self.slot_mut(kind).file = file;
    }

    /// Replaces the slot's pasted text. Ignored for the answer sheet.
    pub fn set_text(&mut self, kind: SlotKind, text: impl Into<String>) {
        if !kind.accepts_text() {
            log::warn!("{} only accepts a file; ignoring pasted text", kind);
            return;
        }
        self.slot_mut(kind).text = Some(text.into());
    }

    /// Removes the slot's file. Pasted text is left as is.
    pub fn clear(&mut self, kind: SlotKind) {
        self.slot_mut(kind).file = None;
    }

    /// Empties every slot.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            answer_sheet: self.answer_sheet.clone(),
            question_paper: self.question_paper.clone(),
            solution_key: self.solution_key.clone(),
        }
    }
}
