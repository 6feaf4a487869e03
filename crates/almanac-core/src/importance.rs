use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Normalized priority scale shared by every view and sort.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Importance {
    #[default]
    None,
    Low,
    Medium,
    High,
}

/// Importance as it sits in storage: rows written by the edit form carry
/// `"LOW"`-style labels, older rows carry a 0-3 code. Some exports wrote
/// that code as a float (`2.0`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawImportance {
    Code(i64),
    Float(f64),
    Text(String),
    Unknown(serde_json::Value),
}

impl Default for RawImportance {
    fn default() -> Self {
        RawImportance::Code(0)
    }
}

impl From<Importance> for RawImportance {
    fn from(value: Importance) -> Self {
        RawImportance::Text(value.as_stored().to_string())
    }
}

/// Maps either stored representation onto [`Importance`]. Anything
/// unrecognised reads as `None` so rendering can always proceed.
pub fn normalize_importance(raw: &RawImportance) -> Importance {
    let normalized = match raw {
        RawImportance::Code(code) => from_code(*code),
        RawImportance::Float(value) => from_float(*value),
        RawImportance::Text(text) => from_label(text),
        RawImportance::Unknown(_) => None,
    };

    if normalized.is_none() {
        tracing::trace!(raw = ?raw, "unrecognised importance; treating as none");
    }
    normalized.unwrap_or_default()
}

fn from_code(code: i64) -> Option<Importance> {
    match code {
        0 => Some(Importance::None),
        1 => Some(Importance::Low),
        2 => Some(Importance::Medium),
        3 => Some(Importance::High),
        _ => None,
    }
}

fn from_float(value: f64) -> Option<Importance> {
    if value.fract() != 0.0 {
        return None;
    }
    from_code(value as i64)
}

fn from_label(text: &str) -> Option<Importance> {
    match text.trim().to_ascii_lowercase().as_str() {
        "none" => Some(Importance::None),
        "low" => Some(Importance::Low),
        "medium" => Some(Importance::Medium),
        "high" => Some(Importance::High),
        _ => None,
    }
}

impl Importance {
    /// Card label; `None` renders without a badge.
    pub fn label(self) -> &'static str {
        match self {
            Self::None => "",
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }

    pub fn color_key(self) -> &'static str {
        match self {
            Self::None => "gray",
            Self::Low => "blue",
            Self::Medium => "yellow",
            Self::High => "red",
        }
    }

    /// ANSI foreground used by the terminal renderer.
    pub fn ansi_code(self) -> &'static str {
        match self {
            Self::None => "90",
            Self::Low => "34",
            Self::Medium => "33",
            Self::High => "31",
        }
    }

    pub fn as_stored(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }
}

impl fmt::Display for Importance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_stored())
    }
}

/// Strict parse for user input: unlike [`normalize_importance`], a typo is
/// an error rather than a silent `None`.
impl FromStr for Importance {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(code) = s.trim().parse::<i64>() {
            return from_code(code)
                .ok_or_else(|| CoreError::invalid("importance", s, "expected 0-3"));
        }
        from_label(s).ok_or_else(|| {
            CoreError::invalid("importance", s, "expected none, low, medium or high")
        })
    }
}

/// Display classification of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStatus {
    Event,
    OpenTask,
    CompletedTask,
    Archived,
}

impl ItemStatus {
    pub fn classify(is_task: bool, complete: bool, archived: bool) -> Self {
        if archived {
            Self::Archived
        } else if !is_task {
            Self::Event
        } else if complete {
            Self::CompletedTask
        } else {
            Self::OpenTask
        }
    }

    pub fn marker(self) -> &'static str {
        match self {
            Self::Event => "•",
            Self::OpenTask => "[ ]",
            Self::CompletedTask => "[x]",
            Self::Archived => "~",
        }
    }
}
