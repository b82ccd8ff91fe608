pub mod table;

use serde::{Deserialize, Serialize};

pub use table::{ReconcileOutcome, SlotTable};

/// Number of upload bays shown per course.
pub const SLOT_COUNT: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotState {
    Empty,
    Occupied,
}

/// Which slot buttons are enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotAffordances {
    pub upload: bool,
    pub view: bool,
    pub download: bool,
    pub delete: bool,
}

impl SlotAffordances {
    pub fn for_state(state: SlotState) -> Self {
        let occupied = state == SlotState::Occupied;
        Self {
            upload: !occupied,
            view: occupied,
            download: occupied,
            delete: occupied,
        }
    }
}

/// Icon family picked from a file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Pdf,
    Slides,
    Document,
    Other,
}

impl FileKind {
    pub fn from_name(name: &str) -> Self {
        let ext = name.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => FileKind::Pdf,
            "ppt" | "pptx" => FileKind::Slides,
            "doc" | "docx" => FileKind::Document,
            _ => FileKind::Other,
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            FileKind::Pdf => "📄",
            FileKind::Slides => "📊",
            FileKind::Document => "📝",
            FileKind::Other => "📁",
        }
    }
}

/// Render-ready state of one slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotView {
    pub index: usize,
    pub state: SlotState,
    pub label: String,
    pub status: String,
    pub upload_text: String,
    pub affordances: SlotAffordances,
}
