use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Target size for the "expand ROM" tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RomExpansion {
    /// 32 MBit (4 MiB)
    Mbit32,
    /// 48 MBit (6 MiB, ExHiROM)
    Mbit48,
}

impl RomExpansion {
    pub fn label(self) -> &'static str {
        match self {
            RomExpansion::Mbit32 => "32 MBit",
            RomExpansion::Mbit48 => "48 MBit",
        }
    }
}

/// A single engine invocation with all of its arguments bound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    Decompile {
        rom: PathBuf,
        project: PathBuf,
    },
    Compile {
        project: PathBuf,
        base_rom: PathBuf,
        output_rom: PathBuf,
    },
    Upgrade {
        base_rom: PathBuf,
        project: PathBuf,
    },
    ExtractDialogue {
        rom: PathBuf,
        project: PathBuf,
    },
    ExpandRom {
        rom: PathBuf,
        expansion: RomExpansion,
    },
    AddHeader {
        rom: PathBuf,
    },
    StripHeader {
        rom: PathBuf,
    },
}

/// Directory inside a project that receives extracted dialogue scripts.
pub const SCRIPT_DIR: &str = "ccscript";

impl Operation {
    /// Short human-readable name used in status lines and logs.
    pub fn label(&self) -> String {
        match self {
            Operation::Decompile { .. } => "Decompile".into(),
            Operation::Compile { .. } => "Compile".into(),
            Operation::Upgrade { .. } => "Upgrade".into(),
            Operation::ExtractDialogue { .. } => "Dialogue extraction".into(),
            Operation::ExpandRom { expansion, .. } => format!("Expand ROM to {}", expansion.label()),
            Operation::AddHeader { .. } => "Add header".into(),
            Operation::StripHeader { .. } => "Remove header".into(),
        }
    }

    /// Whether this operation needs the third-party dialogue extractor.
    pub fn needs_extractor(&self) -> bool {
        matches!(self, Operation::ExtractDialogue { .. })
    }

    /// Output directory for dialogue extraction.
    pub fn script_dir(project: &Path) -> PathBuf {
        project.join(SCRIPT_DIR)
    }
}

/// An operation handed to the controller, tagged with the session-unique id
/// used to match progress and completion events back to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationRequest {
    pub id: u64,
    pub operation: Operation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OperationOutcome {
    Success {
        #[serde(with = "duration_secs")]
        elapsed: Duration,
    },
    Failure {
        reason: String,
    },
}

impl OperationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, OperationOutcome::Success { .. })
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs.max(0.0)))
    }
}

/// Why a submission was turned away before any worker started.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("{0} is required")]
    MissingInput(&'static str),
    #[error("another operation is still running")]
    Busy,
    #[error("dialogue extractor not installed; set it with --extractor or the \"extractor\" preference")]
    ToolMissing,
    #[error("ROM not found: {}", .0.display())]
    RomNotFound(PathBuf),
    #[error("the operation controller has stopped")]
    ControllerGone,
}

/// Events flowing from the controller and workers back to the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
    Started {
        id: u64,
        label: String,
    },
    Progress {
        id: u64,
        percent: f64,
    },
    /// One line of console output (engine output or forwarded log records).
    Console(String),
    Info(InfoEvent),
    Completed {
        id: u64,
        operation: Operation,
        outcome: OperationOutcome,
    },
    Rejected {
        id: u64,
        reason: Rejection,
    },
}

/// Structured info events emitted outside of an operation's own output.
#[derive(Debug, Clone, PartialEq)]
pub enum InfoEvent {
    WaitingForOperation { label: String },
}

impl InfoEvent {
    /// Render a human-readable message for UI/CLI layers.
    pub fn to_message(&self) -> String {
        match self {
            InfoEvent::WaitingForOperation { label } => {
                format!("Waiting for {label} to finish before exiting…")
            }
        }
    }
}
