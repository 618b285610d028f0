//! Event loop hosting the controller.
//!
//! A generic `BackgroundWorker<R>` drains an unbounded channel through a
//! `BackgroundRunnable` and calls its tick hook at a fixed interval. The
//! controller runs inside one such worker: triggers, externally submitted
//! action lists and routing-engine acknowledgements all arrive as
//! [`ControllerEvent`]s, and the tick drives request deadlines. Everything the
//! controller does therefore happens on one task.

use std::collections::HashMap;

use async_trait::async_trait;
use routing_core::{
    ActionDescriptor, ControlResult, Handle, ListKind, PolicySend, Trigger,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::controller::{Controller, JobReport, Ticket};

// ---------------------------------------------------------------------------
// BackgroundRunnable trait
// ---------------------------------------------------------------------------

/// Task handler executed by `BackgroundWorker`.
#[async_trait]
pub trait BackgroundRunnable: Send + 'static {
    type Task: Send + 'static;

    async fn run(&mut self, task: Self::Task);

    /// Called on each tick interval. Default is a no-op.
    async fn on_tick(&mut self) {}

    /// Called once when the worker stops. Default is a no-op.
    async fn shutdown(&mut self) {}
}

// ---------------------------------------------------------------------------
// BackgroundWorker
// ---------------------------------------------------------------------------

/// Spawned task draining an unbounded channel into a runnable.
///
/// The channel is created by the caller so that senders (for example a
/// routing engine that acknowledges through it) can exist before the
/// runnable does.
pub struct BackgroundWorker<R: BackgroundRunnable> {
    tx: Option<mpsc::UnboundedSender<R::Task>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl<R: BackgroundRunnable> BackgroundWorker<R> {
    /// Spawns the worker loop. The first tick fires one interval after start.
    pub fn start(
        mut runnable: R,
        tx: mpsc::UnboundedSender<R::Task>,
        mut rx: mpsc::UnboundedReceiver<R::Task>,
        tick_interval_ms: u64,
    ) -> Self {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut tick_interval =
                tokio::time::interval(std::time::Duration::from_millis(tick_interval_ms.max(1)));
            tick_interval.tick().await;

            loop {
                tokio::select! {
                    task = rx.recv() => {
                        match task {
                            Some(t) => runnable.run(t).await,
                            None => break,
                        }
                    }
                    _ = tick_interval.tick() => {
                        runnable.on_tick().await;
                    }
                    _ = &mut shutdown_rx => {
                        break;
                    }
                }
            }

            runnable.shutdown().await;
        });

        Self {
            tx: Some(tx),
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Queues a task.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker has been stopped.
    pub fn submit(&self, task: R::Task) -> anyhow::Result<()> {
        match &self.tx {
            Some(tx) => tx
                .send(task)
                .map_err(|_| anyhow::anyhow!("worker channel closed")),
            None => Err(anyhow::anyhow!("worker not running")),
        }
    }

    /// Sender feeding the worker, or `None` once stopped.
    #[must_use]
    pub fn sender(&self) -> Option<mpsc::UnboundedSender<R::Task>> {
        self.tx.clone()
    }

    /// Stops the worker and waits for its shutdown hook to finish.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

// ---------------------------------------------------------------------------
// Controller events
// ---------------------------------------------------------------------------

/// Input to the controller worker task.
#[derive(Debug)]
pub enum ControllerEvent {
    /// An external event. The report is sent on `reply` when the trigger's
    /// job finishes.
    Trigger {
        trigger: Trigger,
        reply: Option<oneshot::Sender<JobReport>>,
    },
    /// An action list submitted directly, bypassing policy.
    Actions {
        actions: Vec<ActionDescriptor>,
        list: ListKind,
    },
    /// Acknowledgement from the routing engine.
    Ack {
        handle: Handle,
        result: ControlResult<()>,
    },
}

/// Runs a [`Controller`] inside a worker.
pub struct ControllerRunnable {
    controller: Controller,
    replies: HashMap<Ticket, oneshot::Sender<JobReport>>,
}

impl ControllerRunnable {
    #[must_use]
    pub fn new(controller: Controller) -> Self {
        Self {
            controller,
            replies: HashMap::new(),
        }
    }

    fn deliver(&mut self) {
        for report in self.controller.take_reports() {
            let reply = report.ticket.and_then(|t| self.replies.remove(&t));
            match reply {
                Some(tx) => {
                    if tx.send(report).is_err() {
                        debug!("report receiver dropped");
                    }
                }
                None => debug!(list = %report.list, outcome = report.outcome.label(), "unclaimed report"),
            }
        }
    }
}

#[async_trait]
impl BackgroundRunnable for ControllerRunnable {
    type Task = ControllerEvent;

    async fn run(&mut self, task: ControllerEvent) {
        match task {
            ControllerEvent::Trigger { trigger, reply } => {
                let ticket = self.controller.submit(trigger);
                if let Some(reply) = reply {
                    self.replies.insert(ticket, reply);
                }
            }
            ControllerEvent::Actions { actions, list } => {
                if let Err(err) = self.controller.set_list_actions(actions, list) {
                    warn!(%list, %err, "action list rejected");
                }
            }
            ControllerEvent::Ack { handle, result } => self.controller.notify(handle, result),
        }
        self.deliver();
    }

    async fn on_tick(&mut self) {
        if self.controller.check_timeouts() > 0 {
            self.deliver();
        }
    }

    async fn shutdown(&mut self) {
        if let Some(path) = self.controller.config().volume_store_path.clone() {
            if let Err(err) = self.controller.volumes().save(&path) {
                warn!(path = %path.display(), error = %err, "could not save volume snapshot");
            }
        }
        self.replies.clear();
        info!(controller = ?self.controller, "controller stopped");
    }
}

/// Starts `controller` on a worker fed by `rx`. `tx` must be the sender of
/// the same channel.
#[must_use]
pub fn spawn(
    controller: Controller,
    tx: mpsc::UnboundedSender<ControllerEvent>,
    rx: mpsc::UnboundedReceiver<ControllerEvent>,
) -> (BackgroundWorker<ControllerRunnable>, ControllerHandle) {
    let tick = controller.config().timeout_check_interval_ms;
    let handle = ControllerHandle { tx: tx.clone() };
    let worker = BackgroundWorker::start(ControllerRunnable::new(controller), tx, rx, tick);
    (worker, handle)
}

/// Cloneable client of a running controller.
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    tx: mpsc::UnboundedSender<ControllerEvent>,
}

impl ControllerHandle {
    /// Submits `trigger` and waits for its report.
    ///
    /// # Errors
    ///
    /// Returns an error if the controller has stopped.
    pub async fn trigger(&self, trigger: Trigger) -> anyhow::Result<JobReport> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ControllerEvent::Trigger {
                trigger,
                reply: Some(reply),
            })
            .map_err(|_| anyhow::anyhow!("controller stopped"))?;
        rx.await
            .map_err(|_| anyhow::anyhow!("controller stopped before reporting"))
    }

    /// Submits an action list without waiting for it.
    ///
    /// # Errors
    ///
    /// Returns an error if the controller has stopped.
    pub fn submit_actions(&self, actions: Vec<ActionDescriptor>, list: ListKind) -> anyhow::Result<()> {
        self.tx
            .send(ControllerEvent::Actions { actions, list })
            .map_err(|_| anyhow::anyhow!("controller stopped"))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use routing_core::{ActionType, InMemoryDatabase, SystemClock, param};

    use super::*;
    use crate::config::Settings;
    use crate::controller::JobOutcome;
    use crate::policy::config::Policy;
    use crate::routing::LoopbackRouting;
    use crate::testing::{settings, topology_triggers};
    use crate::volume_store::VolumeSnapshot;

    struct CountingRunnable {
        run_count: Arc<AtomicU32>,
        tick_count: Arc<AtomicU32>,
        shutdown_called: Arc<AtomicU32>,
    }

    impl CountingRunnable {
        fn new() -> Self {
            Self {
                run_count: Arc::new(AtomicU32::new(0)),
                tick_count: Arc::new(AtomicU32::new(0)),
                shutdown_called: Arc::new(AtomicU32::new(0)),
            }
        }
    }

    #[async_trait]
    impl BackgroundRunnable for CountingRunnable {
        type Task = u32;

        async fn run(&mut self, _task: u32) {
            self.run_count.fetch_add(1, Ordering::SeqCst);
        }

        async fn on_tick(&mut self) {
            self.tick_count.fetch_add(1, Ordering::SeqCst);
        }

        async fn shutdown(&mut self) {
            self.shutdown_called.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counting_worker(tick_ms: u64) -> (BackgroundWorker<CountingRunnable>, [Arc<AtomicU32>; 3]) {
        let runnable = CountingRunnable::new();
        let counters = [
            runnable.run_count.clone(),
            runnable.tick_count.clone(),
            runnable.shutdown_called.clone(),
        ];
        let (tx, rx) = mpsc::unbounded_channel();
        (BackgroundWorker::start(runnable, tx, rx, tick_ms), counters)
    }

    #[tokio::test]
    async fn start_submit_and_stop() {
        let (mut worker, [runs, _, shutdowns]) = counting_worker(60_000);
        for task in 0..3 {
            worker.submit(task).unwrap();
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);

        worker.stop().await;
        assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
        assert!(worker.submit(4).is_err());
        assert!(worker.sender().is_none());
    }

    #[tokio::test]
    async fn tick_fires_periodically() {
        let (mut worker, [_, ticks, _]) = counting_worker(20);
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        worker.stop().await;
        assert!(ticks.load(Ordering::SeqCst) >= 2);
    }

    fn loopback_controller(settings: &Settings) -> (BackgroundWorker<ControllerRunnable>, ControllerHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let controller = Controller::new(
            settings,
            Box::new(InMemoryDatabase::new()),
            Box::new(LoopbackRouting::new(tx.clone())),
            Arc::new(SystemClock),
        )
        .unwrap();
        spawn(controller, tx, rx)
    }

    fn connect_settings() -> Settings {
        let mut settings = settings();
        settings.policy.policies = serde_json::from_str::<Vec<Policy>>(
            r#"[{
                "name": "connect",
                "triggers": ["USER_CONNECTION_REQUEST"],
                "rules": [{"actions": [{"type": "ACTION_CONNECT", "params": {
                    "className": "REQUESTING", "sourceName": "REQUESTING", "sinkName": "REQUESTING"}}]}]
            }]"#,
        )
        .unwrap();
        settings
    }

    #[tokio::test]
    async fn loopback_connect_reports_done() {
        let (mut worker, handle) = loopback_controller(&connect_settings());
        for trigger in topology_triggers() {
            let report = handle.trigger(trigger).await.unwrap();
            assert_eq!(report.outcome, JobOutcome::NoChange);
        }

        let report = handle
            .trigger(Trigger::UserConnectionRequest {
                class_name: "BASE".into(),
                source_name: "MediaPlayer".into(),
                sink_name: "AMP".into(),
            })
            .await
            .unwrap();
        assert_eq!(report.outcome, JobOutcome::Done);
        assert_eq!(report.actions[0].name, "Connect");

        // Same request again: the connection already exists.
        let again = handle
            .trigger(Trigger::UserConnectionRequest {
                class_name: "BASE".into(),
                source_name: "MediaPlayer".into(),
                sink_name: "AMP".into(),
            })
            .await
            .unwrap();
        assert_eq!(again.outcome, JobOutcome::Done);

        worker.stop().await;
        assert!(handle
            .trigger(Trigger::SystemUnregisterSink {
                sink_name: "AMP".into()
            })
            .await
            .is_err());
    }

    #[tokio::test]
    async fn submitted_actions_run_without_a_report() {
        let (mut worker, handle) = loopback_controller(&connect_settings());
        for trigger in topology_triggers() {
            handle.trigger(trigger).await.unwrap();
        }
        handle
            .submit_actions(
                vec![ActionDescriptor::new(ActionType::SetVolume)
                    .with_param(param::SINK_NAME, "AMP")
                    .with_param(param::VOLUME, -700)],
                ListKind::System,
            )
            .unwrap();
        // Events are processed in order, so the next report comes after.
        let report = handle
            .trigger(Trigger::SystemUnregisterSink {
                sink_name: "PhoneSpeaker".into(),
            })
            .await
            .unwrap();
        assert_eq!(report.outcome, JobOutcome::NoChange);
        worker.stop().await;
    }

    #[tokio::test]
    async fn shutdown_saves_volume_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("volumes.json");
        let mut settings = settings();
        settings.controller.volume_store_path = Some(path.clone());

        let mut snapshot = VolumeSnapshot::default();
        snapshot.record("BASE", "AMP", -900);
        let (tx, rx) = mpsc::unbounded_channel();
        let mut controller = Controller::new(
            &settings,
            Box::new(InMemoryDatabase::new()),
            Box::new(LoopbackRouting::new(tx.clone())),
            Arc::new(SystemClock),
        )
        .unwrap();
        controller.elements_mut().set_volumes(snapshot.clone());
        let (mut worker, _handle) = spawn(controller, tx, rx);

        worker.stop().await;
        assert_eq!(VolumeSnapshot::load(&path).unwrap(), snapshot);
    }
}
