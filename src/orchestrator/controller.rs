//! Operation lifecycle controller.
//!
//! Owns the single worker slot: accepts submissions from the UI, runs each on a
//! blocking worker, and reports completion back to presentation layers.

use crate::engine::{EngineError, EventReporter, Toolchain};
use crate::model::{
    InfoEvent, Operation, OperationOutcome, OperationRequest, Rejection, TaskEvent,
};
use anyhow::Result;
use std::time::Instant;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{info, warn};

/// Commands emitted by UI layers.
#[derive(Debug, Clone)]
pub(crate) enum UiCommand {
    Submit(OperationRequest),
    /// Stop accepting work; exit once the running operation (if any) finishes.
    Quit,
}

/// Internal handle for the running operation.
struct RunCtx {
    id: u64,
    operation: Operation,
    started: Instant,
    handle: Option<tokio::task::JoinHandle<Result<(), EngineError>>>,
}

/// Spawn the engine call for `request` on the blocking pool.
fn start_run(
    toolchain: &Toolchain,
    request: OperationRequest,
    event_tx: UnboundedSender<TaskEvent>,
) -> RunCtx {
    let label = request.operation.label();
    info!(id = request.id, operation = %label, "starting operation");
    let _ = event_tx.send(TaskEvent::Started {
        id: request.id,
        label,
    });

    let toolchain = toolchain.clone();
    let operation = request.operation.clone();
    let id = request.id;
    let handle = tokio::task::spawn_blocking(move || {
        let reporter = EventReporter::new(id, event_tx);
        toolchain.run(&operation, &reporter)
    });
    RunCtx {
        id: request.id,
        operation: request.operation,
        started: Instant::now(),
        handle: Some(handle),
    }
}

/// Turn a worker's join result into the outcome reported to the UI.
fn outcome_of(
    join_res: std::result::Result<Result<(), EngineError>, tokio::task::JoinError>,
    started: Instant,
) -> OperationOutcome {
    match join_res {
        Ok(Ok(())) => OperationOutcome::Success {
            elapsed: started.elapsed(),
        },
        Ok(Err(e)) => OperationOutcome::Failure {
            reason: e.to_string(),
        },
        Err(e) => {
            let reason = if e.is_panic() {
                EngineError::Panicked(panic_message(e.into_panic())).to_string()
            } else {
                format!("worker join failed: {e}")
            };
            OperationOutcome::Failure { reason }
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run operations as the UI submits them and emit events back to it.
///
/// At most one operation runs at a time; a submission that arrives while one is
/// active is answered with [`Rejection::Busy`]. There is no cancellation: quit
/// waits for the active operation to finish.
pub(crate) async fn run_controller(
    toolchain: Toolchain,
    event_tx: UnboundedSender<TaskEvent>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<()> {
    let mut run_ctx: Option<RunCtx> = None;
    let mut quit_pending = false;
    let mut cmd_open = true;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv(), if cmd_open => {
                match cmd {
                    Some(UiCommand::Submit(request)) => {
                        if quit_pending {
                            let _ = event_tx.send(TaskEvent::Rejected {
                                id: request.id,
                                reason: Rejection::ControllerGone,
                            });
                        } else if let Some(ctx) = &run_ctx {
                            warn!(
                                id = request.id,
                                active = ctx.id,
                                "rejecting submission while another operation runs"
                            );
                            let _ = event_tx.send(TaskEvent::Rejected {
                                id: request.id,
                                reason: Rejection::Busy,
                            });
                        } else {
                            run_ctx = Some(start_run(&toolchain, request, event_tx.clone()));
                        }
                    }
                    other => {
                        // Channel closed means the UI is gone; treat it as quit.
                        cmd_open = other.is_some();
                        quit_pending = true;
                        match &run_ctx {
                            Some(ctx) => {
                                let _ = event_tx.send(TaskEvent::Info(
                                    InfoEvent::WaitingForOperation {
                                        label: ctx.operation.label(),
                                    },
                                ));
                            }
                            None => break,
                        }
                    }
                }
            }
            // Do not take the JoinHandle before this branch wins; otherwise it can be dropped
            // if another select branch is chosen, and we'll never observe completion.
            maybe_done = async {
                if let Some(ctx) = &mut run_ctx {
                    if let Some(h) = ctx.handle.as_mut() {
                        return Some(h.await);
                    }
                }
                futures::future::pending().await
            } => {
                if let (Some(join_res), Some(ctx)) = (maybe_done, run_ctx.take()) {
                    let outcome = outcome_of(join_res, ctx.started);
                    match &outcome {
                        OperationOutcome::Success { elapsed } => info!(
                            id = ctx.id,
                            operation = %ctx.operation.label(),
                            elapsed = %humantime::format_duration(round_ms(*elapsed)),
                            "operation finished"
                        ),
                        OperationOutcome::Failure { reason } => warn!(
                            id = ctx.id,
                            operation = %ctx.operation.label(),
                            %reason,
                            "operation failed"
                        ),
                    }
                    let _ = event_tx.send(TaskEvent::Completed {
                        id: ctx.id,
                        operation: ctx.operation,
                        outcome,
                    });
                    if quit_pending {
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}

/// Truncate to whole milliseconds so log output stays readable.
pub(crate) fn round_ms(d: std::time::Duration) -> std::time::Duration {
    std::time::Duration::from_millis(d.as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{FakeEngine, Gate};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn decompile(id: u64) -> OperationRequest {
        OperationRequest {
            id,
            operation: Operation::Decompile {
                rom: "game.smc".into(),
                project: "/tmp/proj".into(),
            },
        }
    }

    async fn next_completed(rx: &mut mpsc::UnboundedReceiver<TaskEvent>) -> TaskEvent {
        loop {
            let ev = rx.recv().await.expect("event channel closed");
            if matches!(ev, TaskEvent::Completed { .. } | TaskEvent::Rejected { .. }) {
                return ev;
            }
        }
    }

    #[tokio::test]
    async fn successful_run_reports_completion_then_quits() {
        let engine = Arc::new(FakeEngine::default());
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let controller = tokio::spawn(run_controller(
            Toolchain::new(engine.clone(), None),
            event_tx,
            cmd_rx,
        ));

        cmd_tx.send(UiCommand::Submit(decompile(1))).unwrap();
        match next_completed(&mut event_rx).await {
            TaskEvent::Completed { id, outcome, .. } => {
                assert_eq!(id, 1);
                assert!(outcome.is_success());
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(engine.calls(), vec!["decompile_rom(game.smc, /tmp/proj)"]);

        cmd_tx.send(UiCommand::Quit).unwrap();
        controller.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn engine_failure_carries_reason() {
        let engine = Arc::new(FakeEngine::failing("not a valid ROM"));
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_controller(Toolchain::new(engine, None), event_tx, cmd_rx));

        cmd_tx.send(UiCommand::Submit(decompile(7))).unwrap();
        match next_completed(&mut event_rx).await {
            TaskEvent::Completed {
                id,
                outcome: OperationOutcome::Failure { reason },
                ..
            } => {
                assert_eq!(id, 7);
                assert!(reason.contains("not a valid ROM"), "{reason}");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn worker_panic_becomes_failure() {
        let engine = Arc::new(FakeEngine {
            panic: true,
            ..Default::default()
        });
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_controller(Toolchain::new(engine, None), event_tx, cmd_rx));

        cmd_tx.send(UiCommand::Submit(decompile(2))).unwrap();
        match next_completed(&mut event_rx).await {
            TaskEvent::Completed {
                outcome: OperationOutcome::Failure { reason },
                ..
            } => assert!(reason.contains("engine blew up"), "{reason}"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn second_submission_while_running_is_rejected() {
        let gate = Arc::new(Gate::default());
        let engine = Arc::new(FakeEngine::gated(gate.clone()));
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_controller(
            Toolchain::new(engine.clone(), None),
            event_tx,
            cmd_rx,
        ));

        cmd_tx.send(UiCommand::Submit(decompile(1))).unwrap();
        cmd_tx.send(UiCommand::Submit(decompile(2))).unwrap();

        assert_eq!(
            next_completed(&mut event_rx).await,
            TaskEvent::Rejected {
                id: 2,
                reason: Rejection::Busy
            }
        );

        gate.open();
        match next_completed(&mut event_rx).await {
            TaskEvent::Completed { id, .. } => assert_eq!(id, 1),
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(engine.calls().len(), 1);
    }

    #[tokio::test]
    async fn quit_waits_for_running_operation() {
        let gate = Arc::new(Gate::default());
        let engine = Arc::new(FakeEngine::gated(gate.clone()));
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let controller = tokio::spawn(run_controller(
            Toolchain::new(engine, None),
            event_tx,
            cmd_rx,
        ));

        cmd_tx.send(UiCommand::Submit(decompile(1))).unwrap();
        cmd_tx.send(UiCommand::Quit).unwrap();

        loop {
            match event_rx.recv().await.unwrap() {
                TaskEvent::Info(InfoEvent::WaitingForOperation { label }) => {
                    assert_eq!(label, "Decompile");
                    break;
                }
                _ => continue,
            }
        }
        assert!(!controller.is_finished());

        gate.open();
        assert!(matches!(
            next_completed(&mut event_rx).await,
            TaskEvent::Completed { id: 1, .. }
        ));
        controller.await.unwrap().unwrap();
    }
}
