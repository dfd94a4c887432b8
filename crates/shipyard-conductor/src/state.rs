use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

// ── Stage ──

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idle,
    ParsingIntent,
    FetchingArtifacts,
    ExecutingArtifacts,
    Aggregating,
    Done,
    Aborted,
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Done | Stage::Aborted)
    }
}

// ── Valid transitions ──

const VALID_TRANSITIONS: &[(Stage, &[Stage])] = &[
    (
        Stage::Idle,
        &[Stage::ParsingIntent, Stage::FetchingArtifacts, Stage::Aborted],
    ),
    (
        Stage::ParsingIntent,
        // delete and generate paths execute without fetching
        &[
            Stage::FetchingArtifacts,
            Stage::ExecutingArtifacts,
            Stage::Aborted,
        ],
    ),
    (
        Stage::FetchingArtifacts,
        // show lists artifacts without executing them
        &[
            Stage::ExecutingArtifacts,
            Stage::Aggregating,
            Stage::Aborted,
        ],
    ),
    // partial failure is data: execution always reaches aggregation
    (Stage::ExecutingArtifacts, &[Stage::Aggregating]),
    (Stage::Aggregating, &[Stage::Done]),
    // Done and Aborted are terminal
];

fn is_valid_transition(from: Stage, to: Stage) -> bool {
    VALID_TRANSITIONS
        .iter()
        .any(|(f, targets)| *f == from && targets.contains(&to))
}

// ── Run state ──

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageRecord {
    pub stage: Stage,
    pub at: String,
}

/// Progress of one request through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    pub stage: Stage,
    pub history: Vec<StageRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
    #[serde(default)]
    pub version: u32,
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

impl RunState {
    pub fn new() -> Self {
        Self {
            stage: Stage::Idle,
            history: vec![StageRecord {
                stage: Stage::Idle,
                at: shipyard_core::now_rfc3339(),
            }],
            abort_reason: None,
            version: 0,
        }
    }

    pub fn stages(&self) -> Vec<Stage> {
        self.history.iter().map(|r| r.stage).collect()
    }
}

// ── CAS-guarded transition ──

/// Move the run from `from` to `to`, recording `reason` when aborting.
/// Returns Ok(true) on success, Ok(false) on CAS miss (current != from).
pub fn transition(
    state: &mut RunState,
    from: Stage,
    to: Stage,
    reason: Option<String>,
) -> Result<bool> {
    if state.stage != from {
        return Ok(false); // CAS miss
    }
    if !is_valid_transition(from, to) {
        bail!("invalid transition: {from:?} → {to:?}");
    }
    state.stage = to;
    state.history.push(StageRecord {
        stage: to,
        at: shipyard_core::now_rfc3339(),
    });
    if to == Stage::Aborted {
        state.abort_reason = reason;
    }
    state.version += 1;
    tracing::debug!(?from, ?to, "stage transition");
    Ok(true)
}
