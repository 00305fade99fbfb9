//! Result types returned by the analysis operations.
//!
//! Field names on the wire follow what the model is instructed to produce
//! (`requisito`, `status`, `justificativa`, `sao_diferentes`, `diferencas`),
//! so the same types deserialize model output and serialize CLI `--json`
//! output.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Verdict for one requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequirementStatus {
    #[serde(rename = "Atendido")]
    Met,
    #[serde(rename = "Não Atendido", alias = "Nao Atendido", alias = "NãoAtendido")]
    NotMet,
    #[serde(
        rename = "Não Aplicável",
        alias = "Nao Aplicavel",
        alias = "Não Aplicavel",
        alias = "NãoAplicável"
    )]
    NotApplicable,
}

impl RequirementStatus {
    pub fn label(&self) -> &'static str {
        match self {
            RequirementStatus::Met => "Atendido",
            RequirementStatus::NotMet => "Não Atendido",
            RequirementStatus::NotApplicable => "Não Aplicável",
        }
    }
}

impl fmt::Display for RequirementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One row of a compliance checklist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementItem {
    pub requisito: String,
    pub status: RequirementStatus,
    #[serde(default)]
    pub justificativa: String,
}

/// Per-status totals of a checklist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub met: usize,
    pub not_met: usize,
    pub not_applicable: usize,
}

impl StatusCounts {
    pub fn tally(items: &[RequirementItem]) -> Self {
        items.iter().fold(Self::default(), |mut acc, item| {
            match item.status {
                RequirementStatus::Met => acc.met += 1,
                RequirementStatus::NotMet => acc.not_met += 1,
                RequirementStatus::NotApplicable => acc.not_applicable += 1,
            }
            acc
        })
    }
}

/// Structured difference report between two pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DifferenceReport {
    #[serde(rename = "sao_diferentes")]
    pub are_different: bool,
    #[serde(rename = "diferencas", default)]
    pub differences: Vec<String>,
}

/// Free-text same/different verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnifiedComparison {
    /// Derived from `summary` by phrase matching; see
    /// [`crate::config::AnalysisConfig::equality_phrase`].
    pub has_differences: bool,
    pub summary: String,
}

/// Words present in one document's text layer but not the other's.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordDiff {
    /// Words in the second document missing from the first.
    pub missing_from_first: Vec<String>,
    /// Words in the first document missing from the second.
    pub missing_from_second: Vec<String>,
}

impl WordDiff {
    pub fn is_empty(&self) -> bool {
        self.missing_from_first.is_empty() && self.missing_from_second.is_empty()
    }
}
