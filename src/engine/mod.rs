//! Engine collaborators.
//!
//! The decompile/compile/upgrade pipelines and the dialogue extractor are
//! external programs. This module defines the blocking contracts the
//! controller drives and the adapters that shell out to the real tools.

mod process;

pub use process::{locate_program, ExternalEngine, ExternalExtractor};

use crate::model::{Operation, RomExpansion, TaskEvent};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} exited with {}{}", exit_label(.code), detail_suffix(.detail))]
    Exited {
        program: String,
        code: Option<i32>,
        detail: String,
    },
    #[error("dialogue extractor is not installed")]
    ToolMissing,
    #[error("worker panicked: {0}")]
    Panicked(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("status {c}"),
        None => "a signal".to_string(),
    }
}

fn detail_suffix(detail: &str) -> String {
    if detail.is_empty() {
        String::new()
    } else {
        format!(": {detail}")
    }
}

/// Receives output from a running engine call. Implementations must be cheap;
/// they are called once per output line.
pub trait Reporter: Send + Sync {
    fn line(&self, text: &str);
    fn progress(&self, percent: f64);
}

/// The ROM-processing engine. Every call blocks until the work is done.
pub trait Engine: Send + Sync {
    fn decompile_rom(&self, rom: &Path, project: &Path, reporter: &dyn Reporter)
        -> Result<(), EngineError>;

    fn compile_project(
        &self,
        project: &Path,
        base_rom: &Path,
        output_rom: &Path,
        reporter: &dyn Reporter,
    ) -> Result<(), EngineError>;

    fn upgrade_project(
        &self,
        project: &Path,
        base_rom: &Path,
        reporter: &dyn Reporter,
    ) -> Result<(), EngineError>;

    fn expand_rom(
        &self,
        rom: &Path,
        expansion: RomExpansion,
        reporter: &dyn Reporter,
    ) -> Result<(), EngineError>;

    fn add_header(&self, rom: &Path, reporter: &dyn Reporter) -> Result<(), EngineError>;

    fn strip_header(&self, rom: &Path, reporter: &dyn Reporter) -> Result<(), EngineError>;
}

/// Third-party tool that dumps a ROM's dialogue as editable scripts.
pub trait DialogueExtractor: Send + Sync {
    fn extract(&self, rom: &Path, output_dir: &Path, reporter: &dyn Reporter)
        -> Result<(), EngineError>;
}

/// The set of collaborators a controller dispatches operations to.
#[derive(Clone)]
pub struct Toolchain {
    engine: Arc<dyn Engine>,
    extractor: Option<Arc<dyn DialogueExtractor>>,
}

impl Toolchain {
    pub fn new(engine: Arc<dyn Engine>, extractor: Option<Arc<dyn DialogueExtractor>>) -> Self {
        Self { engine, extractor }
    }

    pub fn has_extractor(&self) -> bool {
        self.extractor.is_some()
    }

    /// Run one operation to completion on the calling thread.
    pub fn run(&self, operation: &Operation, reporter: &dyn Reporter) -> Result<(), EngineError> {
        match operation {
            Operation::Decompile { rom, project } => {
                self.engine.decompile_rom(rom, project, reporter)
            }
            Operation::Compile {
                project,
                base_rom,
                output_rom,
            } => self
                .engine
                .compile_project(project, base_rom, output_rom, reporter),
            Operation::Upgrade { base_rom, project } => {
                self.engine.upgrade_project(project, base_rom, reporter)
            }
            Operation::ExtractDialogue { rom, project } => {
                let extractor = self.extractor.as_ref().ok_or(EngineError::ToolMissing)?;
                let out_dir = Operation::script_dir(project);
                std::fs::create_dir_all(&out_dir)?;
                let start = std::time::Instant::now();
                extractor.extract(rom, &out_dir, reporter)?;
                reporter.line(&format!(
                    "Complete. Time: {:.2}s",
                    start.elapsed().as_secs_f64()
                ));
                Ok(())
            }
            Operation::ExpandRom { rom, expansion } => {
                self.engine.expand_rom(rom, *expansion, reporter)
            }
            Operation::AddHeader { rom } => self.engine.add_header(rom, reporter),
            Operation::StripHeader { rom } => self.engine.strip_header(rom, reporter),
        }
    }
}

/// Forwards engine output for one request onto the UI event channel.
pub struct EventReporter {
    id: u64,
    event_tx: UnboundedSender<TaskEvent>,
}

impl EventReporter {
    pub fn new(id: u64, event_tx: UnboundedSender<TaskEvent>) -> Self {
        Self { id, event_tx }
    }
}

impl Reporter for EventReporter {
    fn line(&self, text: &str) {
        let _ = self.event_tx.send(TaskEvent::Console(text.to_string()));
    }

    fn progress(&self, percent: f64) {
        let _ = self.event_tx.send(TaskEvent::Progress {
            id: self.id,
            percent,
        });
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory collaborators for controller and session tests.

    use super::*;
    use std::path::PathBuf;
    use std::sync::{Condvar, Mutex};

    /// Records every call; optionally fails or blocks until released.
    #[derive(Default)]
    pub struct FakeEngine {
        pub calls: Mutex<Vec<String>>,
        pub fail_with: Option<String>,
        pub gate: Option<Arc<Gate>>,
        pub panic: bool,
    }

    /// A latch the test opens to let a blocked fake engine return.
    #[derive(Default)]
    pub struct Gate {
        open: Mutex<bool>,
        cv: Condvar,
    }

    impl Gate {
        pub fn open(&self) {
            let mut open = self.open.lock().unwrap();
            *open = true;
            self.cv.notify_all();
        }

        fn wait(&self) {
            let mut open = self.open.lock().unwrap();
            while !*open {
                open = self.cv.wait(open).unwrap();
            }
        }
    }

    impl FakeEngine {
        pub fn failing(reason: &str) -> Self {
            Self {
                fail_with: Some(reason.to_string()),
                ..Default::default()
            }
        }

        pub fn gated(gate: Arc<Gate>) -> Self {
            Self {
                gate: Some(gate),
                ..Default::default()
            }
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String, reporter: &dyn Reporter) -> Result<(), EngineError> {
            self.calls.lock().unwrap().push(call);
            if let Some(gate) = &self.gate {
                gate.wait();
            }
            if self.panic {
                panic!("engine blew up");
            }
            reporter.progress(50.0);
            reporter.line("working");
            match &self.fail_with {
                Some(detail) => Err(EngineError::Exited {
                    program: "fake-engine".into(),
                    code: Some(1),
                    detail: detail.clone(),
                }),
                None => Ok(()),
            }
        }
    }

    fn show(p: &Path) -> String {
        p.display().to_string()
    }

    impl Engine for FakeEngine {
        fn decompile_rom(
            &self,
            rom: &Path,
            project: &Path,
            reporter: &dyn Reporter,
        ) -> Result<(), EngineError> {
            self.record(format!("decompile_rom({}, {})", show(rom), show(project)), reporter)
        }

        fn compile_project(
            &self,
            project: &Path,
            base_rom: &Path,
            output_rom: &Path,
            reporter: &dyn Reporter,
        ) -> Result<(), EngineError> {
            self.record(
                format!(
                    "compile_project({}, {}, {})",
                    show(project),
                    show(base_rom),
                    show(output_rom)
                ),
                reporter,
            )
        }

        fn upgrade_project(
            &self,
            project: &Path,
            base_rom: &Path,
            reporter: &dyn Reporter,
        ) -> Result<(), EngineError> {
            self.record(
                format!("upgrade_project({}, {})", show(project), show(base_rom)),
                reporter,
            )
        }

        fn expand_rom(
            &self,
            rom: &Path,
            expansion: RomExpansion,
            reporter: &dyn Reporter,
        ) -> Result<(), EngineError> {
            self.record(format!("expand_rom({}, {:?})", show(rom), expansion), reporter)
        }

        fn add_header(&self, rom: &Path, reporter: &dyn Reporter) -> Result<(), EngineError> {
            self.record(format!("add_header({})", show(rom)), reporter)
        }

        fn strip_header(&self, rom: &Path, reporter: &dyn Reporter) -> Result<(), EngineError> {
            self.record(format!("strip_header({})", show(rom)), reporter)
        }
    }

    #[derive(Default)]
    pub struct FakeExtractor {
        pub calls: Mutex<Vec<(PathBuf, PathBuf)>>,
    }

    impl DialogueExtractor for FakeExtractor {
        fn extract(
            &self,
            rom: &Path,
            output_dir: &Path,
            _reporter: &dyn Reporter,
        ) -> Result<(), EngineError> {
            self.calls
                .lock()
                .unwrap()
                .push((rom.to_path_buf(), output_dir.to_path_buf()));
            Ok(())
        }
    }

    /// Collects reporter output in memory.
    #[derive(Default)]
    pub struct RecordingReporter {
        pub lines: Mutex<Vec<String>>,
        pub progress: Mutex<Vec<f64>>,
    }

    impl Reporter for RecordingReporter {
        fn line(&self, text: &str) {
            self.lines.lock().unwrap().push(text.to_string());
        }

        fn progress(&self, percent: f64) {
            self.progress.lock().unwrap().push(percent);
        }
    }
}
