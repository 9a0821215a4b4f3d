//! Value types exchanged with the automation driver port.

use serde::{Deserialize, Serialize};

/// Cheap structural fingerprint of the rendered document.
///
/// Two consecutive identical samples mean the DOM has not changed between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct StructuralSignature {
    /// Number of elements in the document.
    pub element_count: u64,
    /// Length of the visible text content.
    pub text_length: u64,
}

impl StructuralSignature {
    pub fn new(element_count: u64, text_length: u64) -> Self {
        Self {
            element_count,
            text_length,
        }
    }
}

/// Readiness state a selector must reach before it counts as resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitState {
    /// Present in the DOM.
    Attached,
    /// Present and visible.
    #[default]
    Visible,
    /// Present but hidden, or absent.
    Hidden,
    /// Absent from the DOM.
    Detached,
}

/// An action performed on a resolved element handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    Click,
    Fill { text: String },
}

impl Action {
    /// Short name used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Click => "click",
            Action::Fill { .. } => "fill",
        }
    }
}
