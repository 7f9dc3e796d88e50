#![forbid(unsafe_code)]

//! Diagnostic messages published after each committed step.
//!
//! Everything the engine can observe about itself flows through one
//! `kind`-tagged union so diagnostic consumers (loggers, devtools, wire
//! bridges) can narrow on a single field. The serialized form is stable JSON:
//!
//! ```json
//! { "kind": "selection", "bids": [ { "thread": "pinger", "type": "ping", ... } ] }
//! { "kind": "restricted_trigger_error", "type": "nope", "error": "..." }
//! ```

use serde::{Deserialize, Serialize};

use crate::event::Detail;

/// One thread's participation in an event selection step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionBid {
    /// Thread identifier (`trigger(<type>)` for trigger-minted threads).
    pub thread: String,
    /// Whether the bid originated from an external trigger.
    pub trigger: bool,
    /// Whether this bid's event was the one selected this step.
    pub selected: bool,
    /// The requested event type.
    #[serde(rename = "type")]
    pub event_type: String,
    /// The requested event payload, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<Detail>,
    /// The bidding thread's priority (lower wins).
    pub priority: u32,
    /// The first thread blocking this bid, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_by: Option<String>,
    /// The first thread this bid would interrupt if selected, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interrupts: Option<String>,
}

/// An observable moment in the engine's execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SnapshotMessage {
    /// The full candidate/selection/blocking picture for one step, ordered
    /// ascending by priority.
    Selection { bids: Vec<SelectionBid> },

    /// A feedback handler failed while reacting to a selected event.
    FeedbackError {
        #[serde(rename = "type")]
        event_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<Detail>,
        error: String,
    },

    /// A restricted trigger rejected an event before it reached the engine.
    RestrictedTriggerError {
        #[serde(rename = "type")]
        event_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<Detail>,
        error: String,
    },

    /// A thread registration was ignored because the name is already live.
    BthreadsWarning { thread: String, warning: String },
}

impl SnapshotMessage {
    /// The selected bid of a selection snapshot, if this is one.
    #[must_use]
    pub fn selected_bid(&self) -> Option<&SelectionBid> {
        match self {
            Self::Selection { bids } => bids.iter().find(|bid| bid.selected),
            _ => None,
        }
    }
}
