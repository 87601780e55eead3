//! Verification reports.
//!
//! Reports are plain serde values: the CLI prints them as text or JSON, and
//! callers inspect `ok` plus the itemized findings. Nothing here ever fails.

use afterlife_client::Integrity;
use afterlife_core::{Entity, SelfHead, SelfSnapshot, TxRecord};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ResolveHead,
    ValidateHead,
    ValidateSnapshot,
    ValidateIdeas,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::ResolveHead => "resolve-head",
            Stage::ValidateHead => "validate-head",
            Stage::ValidateSnapshot => "validate-snapshot",
            Stage::ValidateIdeas => "validate-ideas",
        })
    }
}

/// One error or warning, attributed to the stage and transaction it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub stage: Stage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_id: Option<String>,
    pub message: String,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tx_id {
            Some(tx) => write!(f, "[{}] {}: {}", self.stage, tx, self.message),
            None => write!(f, "[{}] {}", self.stage, self.message),
        }
    }
}

/// Errors and warnings collected while checking a single document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Findings {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl Findings {
    pub fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// A chain document that was located, with whatever could be parsed from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainDocument<T> {
    pub tx_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<TxRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<Integrity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<T>,
}

impl<T> ChainDocument<T> {
    pub fn new(tx_id: impl Into<String>) -> Self {
        Self {
            tx_id: tx_id.into(),
            record: None,
            integrity: None,
            document: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdeaReport {
    pub idea_id: String,
    pub tx_id: String,
    pub ok: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<Integrity>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainReport {
    pub self_id: String,
    /// True iff `errors` is empty. Idea errors are copied into `errors`.
    pub ok: bool,
    pub errors: Vec<Finding>,
    pub warnings: Vec<Finding>,
    pub head: Option<ChainDocument<SelfHead>>,
    pub snapshot: Option<ChainDocument<SelfSnapshot>>,
    pub ideas: Vec<IdeaReport>,
}

impl ChainReport {
    pub fn new(self_id: &str) -> Self {
        Self {
            self_id: self_id.to_string(),
            ok: false,
            errors: Vec::new(),
            warnings: Vec::new(),
            head: None,
            snapshot: None,
            ideas: Vec::new(),
        }
    }

    pub fn error(&mut self, stage: Stage, tx_id: Option<&str>, message: impl Into<String>) {
        self.errors.push(Finding {
            stage,
            tx_id: tx_id.map(str::to_string),
            message: message.into(),
        });
    }

    pub fn warn(&mut self, stage: Stage, tx_id: Option<&str>, message: impl Into<String>) {
        self.warnings.push(Finding {
            stage,
            tx_id: tx_id.map(str::to_string),
            message: message.into(),
        });
    }

    /// Fold a single document's findings into the chain report.
    pub fn absorb(&mut self, stage: Stage, tx_id: &str, findings: Findings) {
        for message in findings.errors {
            self.error(stage, Some(tx_id), message);
        }
        for message in findings.warnings {
            self.warn(stage, Some(tx_id), message);
        }
    }

    pub fn finish(mut self) -> Self {
        self.ok = self.errors.is_empty();
        self
    }
}

/// Result of checking one transaction on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentReport {
    pub tx_id: String,
    pub entity: Option<Entity>,
    pub ok: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<TxRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<Integrity>,
}

impl DocumentReport {
    pub fn new(tx_id: &str) -> Self {
        Self {
            tx_id: tx_id.to_string(),
            entity: None,
            ok: false,
            errors: Vec::new(),
            warnings: Vec::new(),
            record: None,
            integrity: None,
        }
    }

    pub fn finish(mut self, findings: Findings) -> Self {
        self.errors.extend(findings.errors);
        self.warnings.extend(findings.warnings);
        self.ok = self.errors.is_empty();
        self
    }
}
