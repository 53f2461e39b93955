//! Pipeline controller state machine and its static description.

use std::fmt;

use serde::Serialize;
use tracing::debug;

use gazette_shared::{GazetteError, Result};

/// Controller state. `Done` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Joining,
    Assembling,
    Persisting,
    Done,
    Failed,
}

impl PipelineState {
    pub const ALL: [PipelineState; 6] = [
        Self::Idle,
        Self::Joining,
        Self::Assembling,
        Self::Persisting,
        Self::Done,
        Self::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Joining => "Joining",
            Self::Assembling => "Assembling",
            Self::Persisting => "Persisting",
            Self::Done => "Done",
            Self::Failed => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One edge of the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub from: PipelineState,
    pub to: PipelineState,
    pub trigger: &'static str,
}

const TRANSITIONS: &[Transition] = &[
    Transition {
        from: PipelineState::Idle,
        to: PipelineState::Joining,
        trigger: "run started",
    },
    Transition {
        from: PipelineState::Joining,
        to: PipelineState::Assembling,
        trigger: "at least one source succeeded",
    },
    Transition {
        from: PipelineState::Joining,
        to: PipelineState::Failed,
        trigger: "all sources failed or run cancelled",
    },
    Transition {
        from: PipelineState::Assembling,
        to: PipelineState::Persisting,
        trigger: "document assembled",
    },
    Transition {
        from: PipelineState::Persisting,
        to: PipelineState::Done,
        trigger: "at least one artifact persisted",
    },
    Transition {
        from: PipelineState::Persisting,
        to: PipelineState::Failed,
        trigger: "no artifact persisted",
    },
];

/// Whether `from -> to` is an edge of the state machine.
pub fn can_transition(from: PipelineState, to: PipelineState) -> bool {
    TRANSITIONS.iter().any(|t| t.from == from && t.to == to)
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

/// Current state plus every state visited so far in one run.
#[derive(Debug, Clone)]
pub(crate) struct StateTracker {
    history: Vec<PipelineState>,
}

impl StateTracker {
    pub(crate) fn new() -> Self {
        Self {
            history: vec![PipelineState::Idle],
        }
    }

    pub(crate) fn current(&self) -> PipelineState {
        self.history
            .last()
            .copied()
            .unwrap_or(PipelineState::Idle)
    }

    /// Move to `to`, rejecting edges the machine does not have.
    pub(crate) fn advance(&mut self, to: PipelineState) -> Result<PipelineState> {
        let from = self.current();
        if !can_transition(from, to) {
            return Err(GazetteError::validation(format!(
                "illegal pipeline transition {from} -> {to}"
            )));
        }
        debug!(%from, %to, "pipeline transition");
        self.history.push(to);
        Ok(to)
    }

    pub(crate) fn history(&self) -> &[PipelineState] {
        &self.history
    }
}

// ---------------------------------------------------------------------------
// Introspection
// ---------------------------------------------------------------------------

/// Static listing of states and transitions. Building it executes nothing.
#[derive(Debug, Clone, Serialize)]
pub struct StateMachineShape {
    pub initial: PipelineState,
    pub terminal: Vec<PipelineState>,
    pub states: Vec<PipelineState>,
    pub transitions: Vec<Transition>,
}

impl StateMachineShape {
    pub fn describe() -> Self {
        Self {
            initial: PipelineState::Idle,
            terminal: PipelineState::ALL
                .iter()
                .copied()
                .filter(PipelineState::is_terminal)
                .collect(),
            states: PipelineState::ALL.to_vec(),
            transitions: TRANSITIONS.to_vec(),
        }
    }

    /// Mermaid `stateDiagram-v2` source.
    pub fn to_mermaid(&self) -> String {
        let mut out = String::from("stateDiagram-v2\n");
        out.push_str(&format!("    [*] --> {}\n", self.initial));
        for t in &self.transitions {
            out.push_str(&format!("    {} --> {}: {}\n", t.from, t.to, t.trigger));
        }
        for state in &self.terminal {
            out.push_str(&format!("    {state} --> [*]\n"));
        }
        out
    }
}

impl fmt::Display for StateMachineShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let states: Vec<&str> = self.states.iter().map(PipelineState::as_str).collect();
        let terminal: Vec<&str> = self.terminal.iter().map(PipelineState::as_str).collect();
        writeln!(f, "States:      {}", states.join(", "))?;
        writeln!(f, "Initial:     {}", self.initial)?;
        writeln!(f, "Terminal:    {}", terminal.join(", "))?;
        writeln!(f, "Transitions:")?;
        for t in &self.transitions {
            writeln!(f, "  {:<11} -> {:<11} {}", t.from.as_str(), t.to.as_str(), t.trigger)?;
        }
        Ok(())
    }
}
