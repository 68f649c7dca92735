//! UI-thread side of the task runner.
//!
//! [`UiContext`] bundles everything a submission touches on the UI thread: the
//! console, the preferences record, the input state of the controls, and the
//! progress indicator. `submit` performs the pre-dispatch steps and hands the
//! request to the controller; `apply_event` performs the post-completion steps
//! when the controller reports back.

use super::controller::UiCommand;
use crate::console::Console;
use crate::model::{
    Operation, OperationOutcome, OperationRequest, Rejection, RomExpansion, TaskEvent,
};
use crate::preferences::{keys, Preferences};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputState {
    Enabled,
    Disabled,
}

/// Progress indicator, 0–100.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Progress {
    value: f64,
}

impl Progress {
    pub const MIN: f64 = 0.0;
    pub const MAX: f64 = 100.0;

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn reset(&mut self) {
        self.value = Self::MIN;
    }

    pub fn set(&mut self, value: f64) {
        self.value = value.clamp(Self::MIN, Self::MAX);
    }

    pub fn ratio(&self) -> f64 {
        self.value / Self::MAX
    }
}

/// A user-triggerable engine action. Each one reads its inputs from a fixed set
/// of preference-keyed fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Decompile,
    Compile,
    Upgrade,
    ExtractDialogue,
    Expand32,
    Expand48,
    AddHeader,
    StripHeader,
}

impl Action {
    /// `(preference key, field label)` for each required input, in form order.
    pub fn fields(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Action::Decompile => &[(keys::EXPORT_ROM, "ROM"), (keys::EXPORT_PROJ, "Output Directory")],
            Action::Compile => &[
                (keys::IMPORT_BASEROM, "Base ROM"),
                (keys::IMPORT_PROJ, "Project"),
                (keys::IMPORT_ROM, "Output ROM"),
            ],
            Action::Upgrade => &[(keys::UPGRADE_ROM, "Base ROM"), (keys::UPGRADE_PROJ, "Project")],
            Action::ExtractDialogue => &[(keys::SCRIPT_ROM, "ROM"), (keys::SCRIPT_PROJ, "Project")],
            Action::Expand32 | Action::Expand48 | Action::AddHeader | Action::StripHeader => {
                &[(keys::TOOLS_ROM, "ROM")]
            }
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Action::Decompile => "Decompile",
            Action::Compile => "Compile",
            Action::Upgrade => "Upgrade",
            Action::ExtractDialogue => "Decompile Script",
            Action::Expand32 => "Expand ROM to 32 MBit",
            Action::Expand48 => "Expand ROM to 48 MBit",
            Action::AddHeader => "Add Header to ROM",
            Action::StripHeader => "Remove Header from ROM",
        }
    }

    /// Bind field values into an operation. Callers validate first.
    fn build(self, values: &FieldValues) -> Operation {
        let path = |key: &str| PathBuf::from(values.get(key).map(|v| v.trim()).unwrap_or(""));
        match self {
            Action::Decompile => Operation::Decompile {
                rom: path(keys::EXPORT_ROM),
                project: path(keys::EXPORT_PROJ),
            },
            Action::Compile => Operation::Compile {
                project: path(keys::IMPORT_PROJ),
                base_rom: path(keys::IMPORT_BASEROM),
                output_rom: path(keys::IMPORT_ROM),
            },
            Action::Upgrade => Operation::Upgrade {
                base_rom: path(keys::UPGRADE_ROM),
                project: path(keys::UPGRADE_PROJ),
            },
            Action::ExtractDialogue => Operation::ExtractDialogue {
                rom: path(keys::SCRIPT_ROM),
                project: path(keys::SCRIPT_PROJ),
            },
            Action::Expand32 => Operation::ExpandRom {
                rom: path(keys::TOOLS_ROM),
                expansion: RomExpansion::Mbit32,
            },
            Action::Expand48 => Operation::ExpandRom {
                rom: path(keys::TOOLS_ROM),
                expansion: RomExpansion::Mbit48,
            },
            Action::AddHeader => Operation::AddHeader {
                rom: path(keys::TOOLS_ROM),
            },
            Action::StripHeader => Operation::StripHeader {
                rom: path(keys::TOOLS_ROM),
            },
        }
    }
}

/// Current text of the form fields, keyed by preference key.
pub type FieldValues = BTreeMap<&'static str, String>;

#[derive(Debug, Clone)]
struct ActiveOperation {
    id: u64,
    label: String,
    started: Instant,
}

/// What `apply_event` did with an event.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    /// Event updated console/progress/status only.
    Updated,
    /// The active operation finished; controls are enabled again.
    Finished(OperationOutcome),
    /// The controller turned the active submission away.
    Rejected(Rejection),
    /// Event belonged to no active operation and was ignored.
    Ignored,
}

/// Session-scoped UI state shared by every tab.
pub struct UiContext {
    pub console: Console,
    pub preferences: Preferences,
    pub status: String,
    input: InputState,
    progress: Progress,
    active: Option<ActiveOperation>,
    next_id: u64,
    extractor_available: bool,
    cmd_tx: UnboundedSender<UiCommand>,
}

impl UiContext {
    pub(crate) fn new(
        preferences: Preferences,
        extractor_available: bool,
        cmd_tx: UnboundedSender<UiCommand>,
    ) -> Self {
        Self {
            console: Console::default(),
            preferences,
            status: String::new(),
            input: InputState::Enabled,
            progress: Progress::default(),
            active: None,
            next_id: 1,
            extractor_available,
            cmd_tx,
        }
    }

    pub fn input(&self) -> InputState {
        self.input
    }

    pub fn progress(&self) -> Progress {
        self.progress
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    /// Label of the running operation, if any.
    pub fn active_label(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.label.as_str())
    }

    /// Validate, persist, disable controls, and dispatch `action`.
    ///
    /// Rejections leave every piece of UI state untouched and start no worker,
    /// except when the controller stops between the liveness check and the
    /// send; then the controls are re-enabled and `ControllerGone` returned.
    pub fn submit(&mut self, action: Action, values: &FieldValues) -> Result<u64, Rejection> {
        if self.input == InputState::Disabled {
            return Err(Rejection::Busy);
        }
        for &(key, label) in action.fields() {
            let filled = values.get(key).is_some_and(|v| !v.trim().is_empty());
            if !filled {
                return Err(Rejection::MissingInput(label));
            }
        }
        let operation = action.build(values);
        if operation.needs_extractor() {
            if !self.extractor_available {
                return Err(Rejection::ToolMissing);
            }
            if let Operation::ExtractDialogue { rom, .. } = &operation {
                if !rom.is_file() {
                    return Err(Rejection::RomNotFound(rom.clone()));
                }
            }
        }

        if self.cmd_tx.is_closed() {
            return Err(Rejection::ControllerGone);
        }

        self.console.clear();
        self.input = InputState::Disabled;
        for &(key, _) in action.fields() {
            if let Some(value) = values.get(key) {
                self.preferences.set(key, value.as_str());
            }
        }
        if let Err(e) = self.preferences.save() {
            warn!("could not save preferences: {e:#}");
        }
        self.progress.reset();

        let id = self.next_id;
        self.next_id += 1;
        let label = operation.label();
        let request = OperationRequest { id, operation };
        if self.cmd_tx.send(UiCommand::Submit(request)).is_err() {
            self.input = InputState::Enabled;
            return Err(Rejection::ControllerGone);
        }
        self.status = format!("{label}…");
        self.active = Some(ActiveOperation {
            id,
            label,
            started: Instant::now(),
        });
        Ok(id)
    }

    /// Apply a controller/worker event on the UI thread.
    pub fn apply_event(&mut self, ev: TaskEvent) -> Applied {
        match ev {
            TaskEvent::Console(line) => {
                self.console.push(&line);
                Applied::Updated
            }
            TaskEvent::Info(info) => {
                self.status = info.to_message();
                Applied::Updated
            }
            TaskEvent::Started { id, label } => {
                if !self.is_active(id) {
                    return Applied::Ignored;
                }
                self.status = format!("{label} running…");
                Applied::Updated
            }
            TaskEvent::Progress { id, percent } => {
                if !self.is_active(id) {
                    return Applied::Ignored;
                }
                self.progress.set(percent);
                Applied::Updated
            }
            TaskEvent::Completed { id, outcome, .. } => {
                let Some(active) = self.finish(id) else {
                    return Applied::Ignored;
                };
                match &outcome {
                    OperationOutcome::Success { elapsed } => {
                        self.status = format!(
                            "{} finished in {}",
                            active.label,
                            humantime::format_duration(super::controller::round_ms(*elapsed))
                        );
                    }
                    OperationOutcome::Failure { reason } => {
                        self.console.push(&format!("Error: {reason}"));
                        self.status = format!("{} failed: {reason}", active.label);
                    }
                }
                info!(
                    id,
                    ui_elapsed_ms = active.started.elapsed().as_millis() as u64,
                    success = outcome.is_success(),
                    "controls restored"
                );
                Applied::Finished(outcome)
            }
            TaskEvent::Rejected { id, reason } => {
                let Some(active) = self.finish(id) else {
                    return Applied::Ignored;
                };
                self.status = format!("{} not started: {reason}", active.label);
                Applied::Rejected(reason)
            }
        }
    }

    fn is_active(&self, id: u64) -> bool {
        self.active.as_ref().is_some_and(|a| a.id == id)
    }

    /// Post-operation steps: reset progress, re-enable controls. Runs at most
    /// once per submission because the active slot is taken here.
    fn finish(&mut self, id: u64) -> Option<ActiveOperation> {
        if !self.is_active(id) {
            return None;
        }
        let active = self.active.take();
        self.progress.reset();
        self.input = InputState::Enabled;
        active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{FakeEngine, FakeExtractor, Gate};
    use crate::engine::Toolchain;
    use crate::orchestrator::controller::run_controller;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn values(pairs: &[(&'static str, &str)]) -> FieldValues {
        pairs.iter().map(|(k, v)| (*k, v.to_string())).collect()
    }

    fn context(dir: &tempfile::TempDir) -> (UiContext, mpsc::UnboundedReceiver<UiCommand>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let prefs = Preferences::empty(dir.path().join("preferences.json"));
        (UiContext::new(prefs, false, cmd_tx), cmd_rx)
    }

    #[test]
    fn empty_field_is_a_silent_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let (mut ctx, mut cmd_rx) = context(&dir);
        ctx.console.push("previous output");

        let res = ctx.submit(
            Action::Decompile,
            &values(&[(keys::EXPORT_ROM, "game.smc"), (keys::EXPORT_PROJ, "  ")]),
        );

        assert_eq!(res, Err(Rejection::MissingInput("Output Directory")));
        assert_eq!(ctx.input(), InputState::Enabled);
        assert_eq!(ctx.console.len(), 1);
        assert!(!ctx.is_running());
        assert!(cmd_rx.try_recv().is_err());
        assert!(!dir.path().join("preferences.json").exists());
    }

    #[test]
    fn submit_runs_pre_dispatch_steps_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let (mut ctx, mut cmd_rx) = context(&dir);
        ctx.console.push("stale");

        let id = ctx
            .submit(
                Action::Decompile,
                &values(&[(keys::EXPORT_ROM, "game.smc"), (keys::EXPORT_PROJ, "/tmp/proj")]),
            )
            .unwrap();

        assert!(ctx.console.is_empty());
        assert_eq!(ctx.input(), InputState::Disabled);
        assert_eq!(ctx.progress().value(), Progress::MIN);

        let saved = Preferences::load(dir.path().join("preferences.json")).unwrap();
        assert_eq!(saved.get(keys::EXPORT_ROM), Some("game.smc"));
        assert_eq!(saved.get(keys::EXPORT_PROJ), Some("/tmp/proj"));

        match cmd_rx.try_recv().unwrap() {
            UiCommand::Submit(req) => {
                assert_eq!(req.id, id);
                assert_eq!(
                    req.operation,
                    Operation::Decompile {
                        rom: "game.smc".into(),
                        project: "/tmp/proj".into()
                    }
                );
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn stopped_controller_is_rejected_before_any_side_effect() {
        let dir = tempfile::tempdir().unwrap();
        let (mut ctx, cmd_rx) = context(&dir);
        drop(cmd_rx);
        ctx.console.push("previous output");

        let res = ctx.submit(
            Action::Decompile,
            &values(&[(keys::EXPORT_ROM, "game.smc"), (keys::EXPORT_PROJ, "/tmp/proj")]),
        );

        assert_eq!(res, Err(Rejection::ControllerGone));
        assert_eq!(ctx.input(), InputState::Enabled);
        assert_eq!(ctx.console.len(), 1);
        assert!(!ctx.is_running());
        assert!(!dir.path().join("preferences.json").exists());
    }

    #[test]
    fn field_values_are_persisted_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let (mut ctx, mut cmd_rx) = context(&dir);

        ctx.submit(
            Action::Decompile,
            &values(&[(keys::EXPORT_ROM, " game.smc "), (keys::EXPORT_PROJ, "/tmp/proj")]),
        )
        .unwrap();

        let saved = Preferences::load(dir.path().join("preferences.json")).unwrap();
        assert_eq!(saved.get(keys::EXPORT_ROM), Some(" game.smc "));
        // The operation itself still gets the trimmed path.
        match cmd_rx.try_recv().unwrap() {
            UiCommand::Submit(req) => assert_eq!(
                req.operation,
                Operation::Decompile {
                    rom: "game.smc".into(),
                    project: "/tmp/proj".into()
                }
            ),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn second_submit_while_running_is_busy() {
        let dir = tempfile::tempdir().unwrap();
        let (mut ctx, mut cmd_rx) = context(&dir);
        let fields = values(&[(keys::TOOLS_ROM, "game.smc")]);

        ctx.submit(Action::AddHeader, &fields).unwrap();
        assert_eq!(ctx.submit(Action::StripHeader, &fields), Err(Rejection::Busy));

        assert!(cmd_rx.try_recv().is_ok());
        assert!(cmd_rx.try_recv().is_err());
    }

    #[test]
    fn completion_restores_controls_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let (mut ctx, _cmd_rx) = context(&dir);
        let id = ctx
            .submit(Action::AddHeader, &values(&[(keys::TOOLS_ROM, "game.smc")]))
            .unwrap();
        ctx.apply_event(TaskEvent::Progress { id, percent: 64.0 });
        assert_eq!(ctx.progress().value(), 64.0);

        let done = TaskEvent::Completed {
            id,
            operation: Operation::AddHeader {
                rom: "game.smc".into(),
            },
            outcome: OperationOutcome::Failure {
                reason: "boom".into(),
            },
        };
        assert!(matches!(ctx.apply_event(done.clone()), Applied::Finished(_)));
        assert_eq!(ctx.input(), InputState::Enabled);
        assert_eq!(ctx.progress().value(), Progress::MIN);
        assert!(ctx.console.lines().any(|l| l == "Error: boom"));
        assert!(ctx.status.contains("boom"));

        assert_eq!(ctx.apply_event(done), Applied::Ignored);
    }

    #[test]
    fn extraction_requires_tool_before_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        let (mut ctx, mut cmd_rx) = context(&dir);
        let res = ctx.submit(
            Action::ExtractDialogue,
            &values(&[(keys::SCRIPT_ROM, "game.smc"), (keys::SCRIPT_PROJ, "/tmp/proj")]),
        );
        assert_eq!(res, Err(Rejection::ToolMissing));
        assert_eq!(ctx.input(), InputState::Enabled);
        assert!(cmd_rx.try_recv().is_err());
    }

    #[test]
    fn extraction_rejects_missing_rom() {
        let dir = tempfile::tempdir().unwrap();
        let (cmd_tx, _cmd_rx) = mpsc::unbounded_channel();
        let prefs = Preferences::empty(dir.path().join("preferences.json"));
        let mut ctx = UiContext::new(prefs, true, cmd_tx);
        let rom = dir.path().join("missing.smc");
        let res = ctx.submit(
            Action::ExtractDialogue,
            &values(&[
                (keys::SCRIPT_ROM, rom.to_str().unwrap()),
                (keys::SCRIPT_PROJ, "/tmp/proj"),
            ]),
        );
        assert_eq!(res, Err(Rejection::RomNotFound(rom)));
    }

    /// Drive the real controller with a fake engine through a full
    /// Enabled → Disabled → Enabled cycle.
    async fn run_cycle(
        engine: Arc<FakeEngine>,
        gate: Option<Arc<Gate>>,
    ) -> (UiContext, OperationOutcome, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let toolchain = Toolchain::new(engine, Some(Arc::new(FakeExtractor::default())));
        let controller = tokio::spawn(run_controller(toolchain, event_tx, cmd_rx));

        let prefs = Preferences::empty(dir.path().join("preferences.json"));
        let mut ctx = UiContext::new(prefs, true, cmd_tx.clone());
        assert_eq!(ctx.input(), InputState::Enabled);

        ctx.submit(
            Action::Decompile,
            &values(&[(keys::EXPORT_ROM, "game.smc"), (keys::EXPORT_PROJ, "/tmp/proj")]),
        )
        .unwrap();
        assert_eq!(ctx.input(), InputState::Disabled);

        if let Some(gate) = gate {
            // Controls stay disabled for as long as the worker is blocked.
            match event_rx.recv().await.unwrap() {
                ev @ TaskEvent::Started { .. } => {
                    ctx.apply_event(ev);
                }
                other => panic!("unexpected event: {other:?}"),
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            while let Ok(ev) = event_rx.try_recv() {
                ctx.apply_event(ev);
            }
            assert_eq!(ctx.input(), InputState::Disabled);
            gate.open();
        }

        let outcome = loop {
            let ev = event_rx.recv().await.unwrap();
            if let Applied::Finished(outcome) = ctx.apply_event(ev) {
                break outcome;
            }
        };

        cmd_tx.send(UiCommand::Quit).unwrap();
        controller.await.unwrap().unwrap();
        (ctx, outcome, dir)
    }

    #[tokio::test]
    async fn decompile_success_scenario() {
        let engine = Arc::new(FakeEngine::default());
        let gate = Arc::new(Gate::default());
        let engine_gated = Arc::new(FakeEngine::gated(gate.clone()));

        let (ctx, outcome, _dir) = run_cycle(engine.clone(), None).await;
        assert!(outcome.is_success());
        assert_eq!(engine.calls(), vec!["decompile_rom(game.smc, /tmp/proj)"]);
        assert_eq!(ctx.input(), InputState::Enabled);
        assert_eq!(ctx.progress().value(), 0.0);
        assert!(ctx.console.lines().any(|l| l == "working"));

        let (ctx, outcome, _dir) = run_cycle(engine_gated.clone(), Some(gate)).await;
        assert!(outcome.is_success());
        assert_eq!(ctx.input(), InputState::Enabled);
    }

    #[tokio::test]
    async fn decompile_failure_scenario() {
        let engine = Arc::new(FakeEngine::failing("invalid ROM"));
        let (ctx, outcome, dir) = run_cycle(engine.clone(), None).await;

        assert!(matches!(outcome, OperationOutcome::Failure { .. }));
        assert_eq!(engine.calls(), vec!["decompile_rom(game.smc, /tmp/proj)"]);
        assert_eq!(ctx.input(), InputState::Enabled);
        assert_eq!(ctx.progress().value(), 0.0);
        assert!(ctx.status.contains("invalid ROM"));

        // Fields were persisted even though the engine failed.
        let saved = Preferences::load(dir.path().join("preferences.json")).unwrap();
        assert_eq!(saved.get(keys::EXPORT_ROM), Some("game.smc"));
    }
}
