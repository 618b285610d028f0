//! Job dispatcher.
//!
//! The controller owns the registries, the routing engine and the policy
//! engine. Triggers are queued and evaluated one at a time, and only while no
//! job is active, so policy always sees the state the previous job left
//! behind. Each evaluation that yields actions becomes one job: a sequential
//! composite of the built actions. `SYSTEM` jobs run before queued `NORMAL`
//! jobs.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use routing_core::descriptor::param;
use routing_core::{
    ActionDescriptor, ActionType, ClockSource, ControlError, ControlResult, Database, Handle,
    ListKind, PolicySend, RoutingControl, Trigger, TriggerType,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::action::{Action, ActionContext, ActionId, ActionIds, ActionStatus, CompositeAction, Outcome};
use crate::config::{ControllerConfig, Settings};
use crate::elements::ElementRegistry;
use crate::factory;
use crate::handles::HandleRegistry;
use crate::policy::PolicyEngine;
use crate::volume_store::VolumeSnapshot;

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Receipt for a submitted trigger; its report carries the same ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Ticket(pub u64);

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Final result of one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "error", rename_all = "snake_case")]
pub enum JobOutcome {
    Done,
    /// Policy produced no action for the trigger.
    NoChange,
    Failed(ControlError),
}

impl JobOutcome {
    /// Short name used in logs and metric labels.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            JobOutcome::Done => "done",
            JobOutcome::NoChange => "no_change",
            JobOutcome::Failed(_) => "failed",
        }
    }
}

/// Flattened view of one action node for reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionSummary {
    pub name: String,
    pub status: ActionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ControlError>,
}

/// Completion report for one trigger or one externally submitted job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket: Option<Ticket>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger: Option<TriggerType>,
    pub list: ListKind,
    #[serde(flatten)]
    pub outcome: JobOutcome,
    pub actions: Vec<ActionSummary>,
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

struct Job {
    ticket: Option<Ticket>,
    trigger: Option<TriggerType>,
    list: ListKind,
    root: CompositeAction,
}

impl Job {
    fn root_id(&self) -> ActionId {
        self.root.id()
    }
}

/// Single-threaded core: queues triggers, runs one job at a time and
/// feeds routing acknowledgements back into the active action tree.
pub struct Controller {
    elements: ElementRegistry,
    handles: HandleRegistry,
    routing: Box<dyn RoutingControl>,
    config: ControllerConfig,
    policy: PolicyEngine,
    clock: Arc<dyn ClockSource>,
    ids: ActionIds,
    next_ticket: u64,
    triggers: VecDeque<(Ticket, Trigger)>,
    system_jobs: VecDeque<Job>,
    normal_jobs: VecDeque<Job>,
    active: Option<Job>,
    reports: Vec<JobReport>,
}

impl Controller {
    /// Builds a controller over `database` and `routing`: configured classes
    /// and initial system properties are entered first.
    ///
    /// # Errors
    ///
    /// Returns the database error if a class or system property cannot be
    /// entered.
    pub fn new(
        settings: &Settings,
        database: Box<dyn Database>,
        routing: Box<dyn RoutingControl>,
        clock: Arc<dyn ClockSource>,
    ) -> ControlResult<Self> {
        let mut elements = ElementRegistry::new(database);
        for class in &settings.policy.classes {
            elements.add_class(class)?;
        }
        for property in &settings.policy.system_properties {
            elements.set_system_property(*property)?;
        }
        Ok(Self {
            elements,
            handles: HandleRegistry::new(),
            routing,
            config: settings.controller.clone(),
            policy: PolicyEngine::new(&settings.policy),
            clock,
            ids: ActionIds::default(),
            next_ticket: 0,
            triggers: VecDeque::new(),
            system_jobs: VecDeque::new(),
            normal_jobs: VecDeque::new(),
            active: None,
            reports: Vec::new(),
        })
    }

    #[must_use]
    pub fn elements(&self) -> &ElementRegistry {
        &self.elements
    }

    /// Direct access to the registry, bypassing the job queue.
    pub fn elements_mut(&mut self) -> &mut ElementRegistry {
        &mut self.elements
    }

    /// Requests the active job is waiting on.
    #[must_use]
    pub fn handles(&self) -> &HandleRegistry {
        &self.handles
    }

    #[must_use]
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    #[must_use]
    pub fn volumes(&self) -> &VolumeSnapshot {
        self.elements.volumes()
    }

    /// Whether no job is running and nothing is queued.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.active.is_none()
            && self.triggers.is_empty()
            && self.system_jobs.is_empty()
            && self.normal_jobs.is_empty()
    }

    /// Reports produced since the last call, in completion order.
    pub fn take_reports(&mut self) -> Vec<JobReport> {
        std::mem::take(&mut self.reports)
    }

    /// Queues `trigger` and runs whatever can run now.
    pub fn submit(&mut self, trigger: Trigger) -> Ticket {
        self.next_ticket += 1;
        let ticket = Ticket(self.next_ticket);
        debug!(%ticket, trigger = %trigger.trigger_type(), "trigger queued");
        self.triggers.push_back((ticket, trigger));
        self.pump();
        ticket
    }

    /// Delivers the acknowledgement of `handle`. Unknown, released and
    /// already delivered handles are ignored.
    pub fn notify(&mut self, handle: Handle, result: ControlResult<()>) {
        let Some(entry) = self.handles.take(handle) else {
            warn!(%handle, "acknowledgement for unknown handle ignored");
            metrics::counter!("routing_stale_acks_total").increment(1);
            return;
        };
        let Some(mut job) = self.active.take() else {
            warn!(%handle, root = %entry.root, "acknowledgement without an active job");
            return;
        };
        if job.root_id() != entry.root {
            warn!(%handle, root = %entry.root, "acknowledgement for another job ignored");
            self.active = Some(job);
            return;
        }
        let outcome = self.with_context(entry.root, |ctx| {
            job.root.on_async_result(ctx, entry.owner, handle, result)
        });
        self.settle(job, outcome);
        self.pump();
    }

    /// Expires every request whose deadline has passed. Returns how many
    /// expired.
    pub fn check_timeouts(&mut self) -> usize {
        let expired = self.handles.take_expired(self.clock.now());
        for entry in &expired {
            warn!(handle = %entry.handle, owner = %entry.owner, "routing request timed out");
            metrics::counter!("routing_request_timeouts_total").increment(1);
            let Some(mut job) = self.active.take() else {
                self.abort_orphan(entry.handle);
                continue;
            };
            if job.root_id() != entry.root {
                self.active = Some(job);
                self.abort_orphan(entry.handle);
                continue;
            }
            let outcome = self.with_context(entry.root, |ctx| {
                job.root.on_timeout(ctx, entry.owner, entry.handle)
            });
            self.settle(job, outcome);
        }
        self.pump();
        expired.len()
    }

    /// Withdraws an expired request no running job is waiting for.
    fn abort_orphan(&mut self, handle: Handle) {
        debug!(%handle, "aborting request without a waiting job");
        if let Err(err) = self.routing.abort(handle) {
            debug!(%handle, %err, "routing engine did not abort request");
        }
    }

    /// Queues a `SYSTEM` job restoring the recorded volumes of every class
    /// with a recorded sink, limited to sinks of `domain` when given.
    /// Returns the number of classes queued.
    pub fn restore_volumes(&mut self, domain: Option<&str>) -> usize {
        let count = self.queue_restore(domain);
        self.pump();
        count
    }

    fn queue_restore(&mut self, domain: Option<&str>) -> usize {
        let descriptors = self.restore_descriptors(domain);
        let count = descriptors.len();
        if count > 0 {
            info!(classes = count, domain = domain.unwrap_or("*"), "restoring volumes");
            self.enqueue(&descriptors, ListKind::System, None, None);
        }
        count
    }

    fn restore_descriptors(&self, domain: Option<&str>) -> Vec<ActionDescriptor> {
        let volumes = self.elements.volumes();
        self.elements
            .classes()
            .filter(|class| {
                volumes.class_volumes(&class.name).is_some_and(|sinks| {
                    sinks.keys().any(|sink| {
                        self.elements
                            .sink(sink)
                            .is_ok_and(|s| domain.map_or(true, |d| s.domain == d))
                    })
                })
            })
            .map(|class| {
                ActionDescriptor::new(ActionType::RestoreVolume)
                    .with_param(param::CLASS_NAME, &class.name)
            })
            .collect()
    }

    // -----------------------------------------------------------------------
    // Scheduling
    // -----------------------------------------------------------------------

    /// Starts queued jobs, then evaluates queued triggers, until a job waits
    /// or nothing is left.
    fn pump(&mut self) {
        while self.active.is_none() {
            if let Some(job) = self
                .system_jobs
                .pop_front()
                .or_else(|| self.normal_jobs.pop_front())
            {
                self.start(job);
            } else if let Some((ticket, trigger)) = self.triggers.pop_front() {
                self.evaluate(ticket, &trigger);
            } else {
                break;
            }
        }
    }

    fn start(&mut self, mut job: Job) {
        let root = job.root_id();
        debug!(%root, list = %job.list, actions = job.root.children().len(), "job started");
        let outcome = self.with_context(root, |ctx| job.root.execute(ctx));
        self.settle(job, outcome);
    }

    fn settle(&mut self, job: Job, outcome: Outcome) {
        match outcome {
            Outcome::Waiting => self.active = Some(job),
            Outcome::Done => self.finish(job, JobOutcome::Done),
            Outcome::Failed(err) => self.finish(job, JobOutcome::Failed(err)),
        }
    }

    fn finish(&mut self, job: Job, outcome: JobOutcome) {
        for handle in self.handles.release_root(job.root_id()) {
            debug!(%handle, "releasing request of finished job");
            if let Err(err) = self.routing.abort(handle) {
                debug!(%handle, %err, "routing engine did not abort request");
            }
        }
        metrics::counter!("routing_jobs_total", "outcome" => outcome.label()).increment(1);
        info!(
            ticket = ?job.ticket,
            trigger = ?job.trigger,
            list = %job.list,
            outcome = outcome.label(),
            "job finished"
        );
        let actions = job
            .root
            .children()
            .iter()
            .map(|action| ActionSummary {
                name: action.name().to_string(),
                status: action.status(),
                error: action.error().cloned(),
            })
            .collect();
        self.reports.push(JobReport {
            ticket: job.ticket,
            trigger: job.trigger,
            list: job.list,
            outcome,
            actions,
        });
    }

    fn report(&mut self, ticket: Ticket, trigger: TriggerType, outcome: JobOutcome) {
        metrics::counter!("routing_jobs_total", "outcome" => outcome.label()).increment(1);
        info!(%ticket, %trigger, outcome = outcome.label(), "trigger finished without a job");
        self.reports.push(JobReport {
            ticket: Some(ticket),
            trigger: Some(trigger),
            list: ListKind::Normal,
            outcome,
            actions: Vec::new(),
        });
    }

    fn enqueue(
        &mut self,
        descriptors: &[ActionDescriptor],
        list: ListKind,
        ticket: Option<Ticket>,
        trigger: Option<TriggerType>,
    ) {
        let children: Vec<Box<dyn Action>> = descriptors
            .iter()
            .map(|descriptor| factory::build(descriptor, &self.config, &mut self.ids))
            .collect();
        let mut root = CompositeAction::sequential(self.ids.next(), "Job", children);
        if self.config.rollback_on_failure {
            root.set_undo_required(true);
        }
        let job = Job {
            ticket,
            trigger,
            list,
            root,
        };
        match list {
            ListKind::System => self.system_jobs.push_back(job),
            ListKind::Normal => self.normal_jobs.push_back(job),
        }
    }

    fn with_context<T>(
        &mut self,
        root: ActionId,
        f: impl FnOnce(&mut ActionContext<'_>) -> T,
    ) -> T {
        let mut ctx = ActionContext {
            elements: &mut self.elements,
            handles: &mut self.handles,
            routing: self.routing.as_mut(),
            config: &self.config,
            ids: &mut self.ids,
            now_ms: self.clock.now(),
            root,
        };
        f(&mut ctx)
    }

    // -----------------------------------------------------------------------
    // Trigger evaluation
    // -----------------------------------------------------------------------

    fn evaluate(&mut self, ticket: Ticket, trigger: &Trigger) {
        let trigger_type = trigger.trigger_type();
        match self.apply_side_effects(trigger) {
            Ok(()) => {}
            Err(ControlError::NoChange) => debug!(%ticket, "trigger changed no element state"),
            Err(err) => {
                warn!(%ticket, trigger = %trigger_type, %err, "trigger rejected");
                self.report(ticket, trigger_type, JobOutcome::Failed(err));
                return;
            }
        }
        match self.policy.process_trigger(trigger, &self.elements) {
            Ok(descriptors) => {
                self.enqueue(&descriptors, ListKind::Normal, Some(ticket), Some(trigger_type));
            }
            Err(ControlError::NoChange) => self.report(ticket, trigger_type, JobOutcome::NoChange),
            Err(err) => self.report(ticket, trigger_type, JobOutcome::Failed(err)),
        }
    }

    /// Registry changes a trigger implies regardless of policy.
    fn apply_side_effects(&mut self, trigger: &Trigger) -> ControlResult<()> {
        let elements = &mut self.elements;
        match trigger {
            Trigger::SystemRegisterDomain { domain } => elements.register_domain(domain).map(drop),
            Trigger::SystemRegisterSource { source } => elements.register_source(source).map(drop),
            Trigger::SystemRegisterSink { sink } => elements.register_sink(sink).map(drop),
            Trigger::SystemRegisterGateway { gateway } => {
                elements.register_gateway(gateway).map(drop)
            }
            Trigger::SystemUnregisterDomain { domain_name } => {
                elements.unregister_domain(domain_name)
            }
            Trigger::SystemUnregisterSource { source_name } => {
                elements.unregister_source(source_name)
            }
            Trigger::SystemUnregisterSink { sink_name } => elements.unregister_sink(sink_name),
            Trigger::SystemUnregisterGateway { gateway_name } => {
                elements.unregister_gateway(gateway_name)
            }
            Trigger::SystemDomainRegistrationComplete { domain_name } => {
                elements.domain_registration_complete(domain_name)?;
                self.queue_restore(Some(domain_name));
                Ok(())
            }
            Trigger::SystemSinkAvailabilityChanged {
                sink_name,
                availability,
            } => elements.set_sink_availability(sink_name, *availability),
            Trigger::SystemSourceAvailabilityChanged {
                source_name,
                availability,
            } => elements.set_source_availability(source_name, *availability),
            Trigger::SystemInterruptStateChanged {
                source_name,
                interrupt_state,
            } => elements.set_interrupt_state(source_name, *interrupt_state),
            _ => Ok(()),
        }
    }
}

impl PolicySend for Controller {
    fn set_list_actions(
        &mut self,
        actions: Vec<ActionDescriptor>,
        kind: ListKind,
    ) -> ControlResult<()> {
        if actions.is_empty() {
            return Ok(());
        }
        self.enqueue(&actions, kind, None, None);
        self.pump();
        Ok(())
    }
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("active", &self.active.as_ref().map(Job::root_id))
            .field("queued_triggers", &self.triggers.len())
            .field("system_jobs", &self.system_jobs.len())
            .field("normal_jobs", &self.normal_jobs.len())
            .field("outstanding", &self.handles.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use routing_core::types::{ConnectionState, SourceState};
    use routing_core::{InMemoryDatabase, ManualClock, RequestKind};

    use super::*;
    use crate::policy::config::Policy;
    use crate::routing::RecordingRouting;
    use crate::testing::{settings, topology_triggers};

    const POLICIES: &str = r#"[
        {
            "name": "connect",
            "triggers": ["USER_CONNECTION_REQUEST"],
            "rules": [{"actions": [{"type": "ACTION_CONNECT", "params": {
                "className": "REQUESTING", "sourceName": "REQUESTING", "sinkName": "REQUESTING"}}]}]
        },
        {
            "name": "disconnect",
            "triggers": ["USER_DISCONNECTION_REQUEST"],
            "rules": [{"actions": [{"type": "ACTION_DISCONNECT", "params": {
                "connectionName": {"op": "trigger", "field": "connectionName"}}}]}]
        },
        {
            "name": "volume",
            "triggers": ["USER_SET_VOLUME"],
            "rules": [{"actions": [{"type": "ACTION_SET_VOLUME", "params": {
                "sinkName": "REQUESTING", "volume": -500}}]}]
        }
    ]"#;

    struct Rig {
        controller: Controller,
        routing: RecordingRouting,
        clock: ManualClock,
    }

    impl Rig {
        fn new(rollback: bool) -> Self {
            let mut settings = settings();
            settings.policy.policies = serde_json::from_str::<Vec<Policy>>(POLICIES).unwrap();
            settings.controller.rollback_on_failure = rollback;
            let routing = RecordingRouting::new();
            let clock = ManualClock::new(10_000);
            let mut controller = Controller::new(
                &settings,
                Box::new(InMemoryDatabase::new()),
                Box::new(routing.clone()),
                Arc::new(clock.clone()),
            )
            .unwrap();
            for trigger in topology_triggers() {
                controller.submit(trigger);
            }
            let reports = controller.take_reports();
            assert!(reports.iter().all(|r| r.outcome == JobOutcome::NoChange));
            Self {
                controller,
                routing,
                clock,
            }
        }

        fn connect_request(&mut self, sink: &str) -> Ticket {
            self.controller.submit(Trigger::UserConnectionRequest {
                class_name: "BASE".into(),
                source_name: "MediaPlayer".into(),
                sink_name: sink.into(),
            })
        }

        fn outstanding(&self) -> Vec<Handle> {
            self.routing
                .issued()
                .into_iter()
                .filter(|h| self.controller.handles().contains(*h))
                .collect()
        }

        fn ack_all(&mut self) {
            loop {
                let outstanding = self.outstanding();
                if outstanding.is_empty() {
                    return;
                }
                for handle in outstanding {
                    self.controller.notify(handle, Ok(()));
                }
            }
        }

        fn connection_state(&self, name: &str) -> Option<ConnectionState> {
            self.controller
                .elements()
                .connection_by_name(name)
                .map(|c| c.state())
        }
    }

    #[test]
    fn connect_request_runs_to_connected_with_source_on() {
        let mut rig = Rig::new(false);
        let ticket = rig.connect_request("Gateway0");
        let h1 = rig.routing.last().unwrap();
        assert_eq!(h1.kind, RequestKind::Connect);
        assert!(rig.controller.take_reports().is_empty());

        rig.controller.notify(h1, Ok(()));
        let h2 = rig.routing.last().unwrap();
        assert_eq!(h2.kind, RequestKind::SetSourceState);
        rig.controller.notify(h2, Ok(()));

        let reports = rig.controller.take_reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].ticket, Some(ticket));
        assert_eq!(reports[0].outcome, JobOutcome::Done);
        assert_eq!(reports[0].actions[0].name, "Connect");
        assert_eq!(
            rig.connection_state("MediaPlayer:Gateway0"),
            Some(ConnectionState::Connected)
        );
        assert_eq!(
            rig.controller.elements().source("MediaPlayer").unwrap().state,
            SourceState::On
        );
        assert!(rig.controller.handles().is_empty());
        assert!(rig.controller.is_idle());
    }

    #[test]
    fn failed_activation_reports_error_and_leaves_connecting() {
        let mut rig = Rig::new(false);
        rig.connect_request("Gateway0");
        rig.controller.notify(rig.routing.last().unwrap(), Ok(()));
        let error = ControlError::Communication("source refused".into());
        rig.controller
            .notify(rig.routing.last().unwrap(), Err(error.clone()));

        let reports = rig.controller.take_reports();
        assert_eq!(reports[0].outcome, JobOutcome::Failed(error.clone()));
        assert_eq!(reports[0].actions[0].status, ActionStatus::ErrorStopped);
        assert_eq!(reports[0].actions[0].error, Some(error));
        assert_eq!(
            rig.connection_state("MediaPlayer:Gateway0"),
            Some(ConnectionState::Connecting)
        );
    }

    #[test]
    fn rollback_on_failure_tears_down_and_forgets_connection() {
        let mut rig = Rig::new(true);
        rig.connect_request("Gateway0");
        rig.controller.notify(rig.routing.last().unwrap(), Ok(()));
        rig.controller.notify(
            rig.routing.last().unwrap(),
            Err(ControlError::Communication("source refused".into())),
        );
        // The routed hop is disconnected before the job reports.
        let teardown = rig.routing.last().unwrap();
        assert_eq!(teardown.kind, RequestKind::Disconnect);
        assert!(rig.controller.take_reports().is_empty());

        rig.controller.notify(teardown, Ok(()));
        let reports = rig.controller.take_reports();
        assert!(matches!(reports[0].outcome, JobOutcome::Failed(ControlError::Communication(_))));
        assert_eq!(rig.connection_state("MediaPlayer:Gateway0"), None);
        assert!(rig.controller.handles().is_empty());
    }

    #[test]
    fn stale_and_repeated_acknowledgements_are_ignored() {
        let mut rig = Rig::new(false);
        rig.connect_request("Gateway0");
        let h1 = rig.routing.last().unwrap();
        rig.controller.notify(h1, Ok(()));
        rig.controller.notify(h1, Ok(()));
        rig.controller
            .notify(Handle::new(RequestKind::SetSinkVolume, 999), Ok(()));
        assert_eq!(rig.outstanding().len(), 1);
        assert!(rig.controller.take_reports().is_empty());
    }

    #[test]
    fn timeout_fails_job_and_aborts_request() {
        let mut rig = Rig::new(false);
        rig.connect_request("Gateway0");
        let h1 = rig.routing.last().unwrap();
        assert_eq!(rig.controller.check_timeouts(), 0);

        rig.clock
            .advance(rig.controller.config().default_action_timeout_ms);
        assert_eq!(rig.controller.check_timeouts(), 1);
        let reports = rig.controller.take_reports();
        assert_eq!(reports[0].outcome, JobOutcome::Failed(ControlError::Timeout(h1)));
        assert_eq!(rig.routing.aborted(), vec![h1]);

        // A late acknowledgement finds nothing.
        rig.controller.notify(h1, Ok(()));
        assert!(rig.controller.take_reports().is_empty());
    }

    #[test]
    fn expired_request_of_another_job_is_aborted() {
        let mut rig = Rig::new(false);
        rig.connect_request("Gateway0");
        let h1 = rig.routing.last().unwrap();
        let stray = Handle::new(RequestKind::SetSinkVolume, 900);
        let deadline = rig.clock.now() + 10;
        rig.controller
            .handles
            .register(stray, ActionId(900), ActionId(900), deadline)
            .unwrap();

        rig.clock.advance(10);
        assert_eq!(rig.controller.check_timeouts(), 1);
        assert_eq!(rig.routing.aborted(), vec![stray]);
        assert!(rig.controller.handles().contains(h1));
        assert!(rig.controller.take_reports().is_empty());
    }

    #[test]
    fn triggers_wait_for_the_active_job() {
        let mut rig = Rig::new(false);
        let first = rig.connect_request("Gateway0");
        let second = rig.controller.submit(Trigger::UserDisconnectionRequest {
            class_name: "BASE".into(),
            source_name: "MediaPlayer".into(),
            sink_name: "Gateway0".into(),
        });
        assert_eq!(rig.routing.issued().len(), 1);

        rig.ack_all();
        let reports = rig.controller.take_reports();
        let tickets: Vec<_> = reports.iter().map(|r| r.ticket).collect();
        assert_eq!(tickets, vec![Some(first), Some(second)]);
        assert!(reports.iter().all(|r| r.outcome == JobOutcome::Done));
        // The disconnect saw the connection the first job made.
        assert_eq!(reports[1].actions[0].name, "Disconnect");
        assert_eq!(rig.connection_state("MediaPlayer:Gateway0"), None);
    }

    #[test]
    fn system_jobs_run_before_queued_normal_jobs() {
        let mut rig = Rig::new(false);
        rig.connect_request("Gateway0");
        rig.controller
            .set_list_actions(
                vec![ActionDescriptor::new(ActionType::SetVolume)
                    .with_param(param::SINK_NAME, "AMP")
                    .with_param(param::VOLUME, -100)],
                ListKind::Normal,
            )
            .unwrap();
        rig.controller
            .set_list_actions(
                vec![ActionDescriptor::new(ActionType::SetVolume)
                    .with_param(param::SINK_NAME, "PhoneSpeaker")
                    .with_param(param::VOLUME, -200)],
                ListKind::System,
            )
            .unwrap();

        rig.ack_all();
        let lists: Vec<ListKind> = rig
            .controller
            .take_reports()
            .iter()
            .map(|r| r.list)
            .collect();
        assert_eq!(lists, vec![ListKind::Normal, ListKind::System, ListKind::Normal]);
    }

    #[test]
    fn trigger_without_policy_reports_no_change() {
        let mut rig = Rig::new(false);
        let ticket = rig.controller.submit(Trigger::UserSetSinkMuteState {
            class_name: None,
            sink_name: "AMP".into(),
            mute_state: routing_core::types::MuteState::Muted,
        });
        let reports = rig.controller.take_reports();
        assert_eq!(reports[0].ticket, Some(ticket));
        assert_eq!(reports[0].outcome, JobOutcome::NoChange);
        assert!(rig.routing.issued().is_empty());
    }

    #[test]
    fn failed_side_effect_is_reported() {
        let mut rig = Rig::new(false);
        rig.controller.submit(Trigger::SystemUnregisterSink {
            sink_name: "Nowhere".into(),
        });
        let reports = rig.controller.take_reports();
        assert!(matches!(
            reports[0].outcome,
            JobOutcome::Failed(ControlError::OutOfRange { .. })
        ));
    }

    #[test]
    fn domain_completion_restores_recorded_volumes() {
        let mut rig = Rig::new(false);
        let mut snapshot = VolumeSnapshot::default();
        snapshot.record("PHONE", "PhoneSpeaker", -400);
        rig.controller.elements_mut().set_volumes(snapshot);

        rig.controller.submit(Trigger::SystemDomainRegistrationComplete {
            domain_name: "Amplifier".into(),
        });
        let handle = rig.routing.last().unwrap();
        assert_eq!(handle.kind, RequestKind::SetSinkVolume);
        rig.ack_all();

        // The trigger itself has no policy; the restore job runs after.
        let reports = rig.controller.take_reports();
        assert_eq!(reports[0].outcome, JobOutcome::NoChange);
        assert_eq!(reports[1].list, ListKind::System);
        assert_eq!(reports[1].actions[0].name, "RestoreVolume");
        assert_eq!(reports[1].outcome, JobOutcome::Done);
        assert_eq!(
            rig.controller.elements().sink("PhoneSpeaker").unwrap().volume,
            -400
        );
    }
}
