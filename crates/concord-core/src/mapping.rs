//! Bidirectional status/priority mapping tables (§4.7) shared by tracker
//! clients (wire-format translation) and the conflict policy (canonical
//! comparison). Unknown values map to each target's documented default
//! (`Backlog`/`todo`/`open`, priority `Medium`/`P2`).

use crate::types::{CanonicalPriority, CanonicalStatus};

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

pub fn status_to_huly(status: CanonicalStatus) -> &'static str {
    match status {
        CanonicalStatus::Backlog => "Backlog",
        CanonicalStatus::Todo => "Todo",
        CanonicalStatus::InProgress => "In Progress",
        CanonicalStatus::InReview => "In Review",
        CanonicalStatus::Done => "Done",
        CanonicalStatus::Cancelled => "Cancelled",
    }
}

pub fn status_from_huly(raw: &str) -> CanonicalStatus {
    match raw {
        "Backlog" => CanonicalStatus::Backlog,
        "Todo" => CanonicalStatus::Todo,
        "In Progress" => CanonicalStatus::InProgress,
        "In Review" => CanonicalStatus::InReview,
        "Done" => CanonicalStatus::Done,
        "Cancelled" => CanonicalStatus::Cancelled,
        _ => CanonicalStatus::Backlog,
    }
}

pub fn status_to_vibe(status: CanonicalStatus) -> &'static str {
    match status {
        CanonicalStatus::Backlog => "todo",
        CanonicalStatus::Todo => "todo",
        CanonicalStatus::InProgress => "inprogress",
        CanonicalStatus::InReview => "inreview",
        CanonicalStatus::Done => "done",
        CanonicalStatus::Cancelled => "done",
    }
}

pub fn status_from_vibe(raw: &str) -> CanonicalStatus {
    match raw {
        "todo" => CanonicalStatus::Todo,
        "inprogress" => CanonicalStatus::InProgress,
        "inreview" => CanonicalStatus::InReview,
        "done" => CanonicalStatus::Done,
        _ => CanonicalStatus::Todo,
    }
}

/// Beads encodes status as `open`/`closed` plus an optional label for the
/// intermediate states — `(status, label)`.
pub fn status_to_beads(status: CanonicalStatus) -> (&'static str, Option<&'static str>) {
    match status {
        CanonicalStatus::Backlog => ("open", None),
        CanonicalStatus::Todo => ("open", None),
        CanonicalStatus::InProgress => ("open", Some("in-progress")),
        CanonicalStatus::InReview => ("open", Some("in-review")),
        CanonicalStatus::Done => ("closed", None),
        CanonicalStatus::Cancelled => ("closed", Some("cancelled")),
    }
}

pub fn status_from_beads(status: &str, labels: &[String]) -> CanonicalStatus {
    let has_label = |name: &str| labels.iter().any(|l| l == name);
    match status {
        "closed" if has_label("cancelled") => CanonicalStatus::Cancelled,
        "closed" => CanonicalStatus::Done,
        "open" if has_label("in-progress") => CanonicalStatus::InProgress,
        "open" if has_label("in-review") => CanonicalStatus::InReview,
        "open" => CanonicalStatus::Todo,
        _ => CanonicalStatus::Backlog,
    }
}

// ---------------------------------------------------------------------------
// Priority
// ---------------------------------------------------------------------------

pub fn priority_to_huly(priority: CanonicalPriority) -> &'static str {
    match priority {
        CanonicalPriority::NoPriority => "No priority",
        CanonicalPriority::Low => "Low",
        CanonicalPriority::Medium => "Medium",
        CanonicalPriority::High => "High",
        CanonicalPriority::Urgent => "Urgent",
    }
}

pub fn priority_from_huly(raw: &str) -> CanonicalPriority {
    match raw {
        "No priority" => CanonicalPriority::NoPriority,
        "Low" => CanonicalPriority::Low,
        "Medium" => CanonicalPriority::Medium,
        "High" => CanonicalPriority::High,
        "Urgent" => CanonicalPriority::Urgent,
        _ => CanonicalPriority::Medium,
    }
}

pub fn priority_to_vibe(priority: CanonicalPriority) -> &'static str {
    match priority {
        CanonicalPriority::NoPriority => "none",
        CanonicalPriority::Low => "low",
        CanonicalPriority::Medium => "medium",
        CanonicalPriority::High => "high",
        CanonicalPriority::Urgent => "urgent",
    }
}

pub fn priority_from_vibe(raw: &str) -> CanonicalPriority {
    match raw {
        "none" => CanonicalPriority::NoPriority,
        "low" => CanonicalPriority::Low,
        "medium" => CanonicalPriority::Medium,
        "high" => CanonicalPriority::High,
        "urgent" => CanonicalPriority::Urgent,
        _ => CanonicalPriority::Medium,
    }
}

/// Beads' `P4..P0` scale, lowest urgency first.
pub fn priority_to_beads(priority: CanonicalPriority) -> &'static str {
    match priority {
        CanonicalPriority::NoPriority => "P4",
        CanonicalPriority::Low => "P3",
        CanonicalPriority::Medium => "P2",
        CanonicalPriority::High => "P1",
        CanonicalPriority::Urgent => "P0",
    }
}

pub fn priority_from_beads(raw: &str) -> CanonicalPriority {
    match raw {
        "P4" => CanonicalPriority::NoPriority,
        "P3" => CanonicalPriority::Low,
        "P2" => CanonicalPriority::Medium,
        "P1" => CanonicalPriority::High,
        "P0" => CanonicalPriority::Urgent,
        _ => CanonicalPriority::Medium,
    }
}
