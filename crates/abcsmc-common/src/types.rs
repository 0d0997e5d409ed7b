//! Small value types shared by every other crate in the workspace.

use serde::{Deserialize, Serialize};

/// The four scheduled-event kinds a simulator accepts, fixed by spec §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[repr(u8)]
pub enum EventKind {
    Exit = 0,
    Enter = 1,
    IntTransfer = 2,
    ExtTransfer = 3,
}

impl EventKind {
    /// Maps the fixed string labels from spec §6 onto their integer codes.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "exit" => Some(EventKind::Exit),
            "enter" => Some(EventKind::Enter),
            "intTrans" => Some(EventKind::IntTransfer),
            "extTrans" => Some(EventKind::ExtTransfer),
            _ => None,
        }
    }

    /// Integer code as used in the table's `event` column.
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(EventKind::Exit),
            1 => Some(EventKind::Enter),
            2 => Some(EventKind::IntTransfer),
            3 => Some(EventKind::ExtTransfer),
            _ => None,
        }
    }

    /// The string label this kind was rendered from/to, for round-tripping
    /// tables whose `event` column was originally strings (spec §4.1).
    pub fn label(self) -> &'static str {
        match self {
            EventKind::Exit => "exit",
            EventKind::Enter => "enter",
            EventKind::IntTransfer => "intTrans",
            EventKind::ExtTransfer => "extTrans",
        }
    }
}

/// Which parameter space a `PriorSet` (or a single proposal) writes into.
/// A `PriorSet` must bind every one of its parameters to the same target;
/// mixing the two is a construction error (spec §3, §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterTarget {
    /// A single global parameter vector (`gdata`), one value per particle.
    GData,
    /// A per-node parameter matrix (`ldata`), replicated across nodes via
    /// `ReplicationAdapter`.
    LData,
}

/// The four prior families spec §3 allows. `(p1, p2)` are the family's two
/// standard parameters; see `abcsmc-math` for their exact meaning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorFamily {
    Uniform,
    Normal,
    LogNormal,
    Gamma,
}

impl PriorFamily {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "uniform" => Some(PriorFamily::Uniform),
            "normal" => Some(PriorFamily::Normal),
            "lognormal" => Some(PriorFamily::LogNormal),
            "gamma" => Some(PriorFamily::Gamma),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PriorFamily::Uniform => "uniform",
            PriorFamily::Normal => "normal",
            PriorFamily::LogNormal => "lognormal",
            PriorFamily::Gamma => "gamma",
        }
    }
}
