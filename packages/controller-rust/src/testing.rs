//! Test bed shared by the unit tests: a registry over the in-memory
//! database with a small two-domain topology, a recording routing engine and
//! scripted leaf steps.
//!
//! Topology:
//!
//! ```text
//! Applications: source MediaPlayer (off), sink Gateway0
//! Amplifier:    source Gateway0 (unknown), source Phone (priority 5),
//!               sinks AMP and PhoneSpeaker
//! Gateway0:     Applications -> Amplifier
//! Classes:      BASE  = MediaPlayer -> {AMP, Gateway0}
//!               PHONE = Phone -> {AMP, PhoneSpeaker}
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use routing_core::types::{
    ClassDirection, ConnectionFormat, DomainSpec, GatewaySpec, MainConnectionId, SinkSpec,
    SourceSpec, SourceState,
};
use routing_core::{ControlError, ControlResult, FaultInjector, Handle, InMemoryDatabase, Trigger};

use crate::action::{Action, ActionContext, ActionId, ActionIds, LeafStep, Outcome, Step};
use crate::config::{ControllerConfig, Settings};
use crate::elements::ElementRegistry;
use crate::handles::HandleRegistry;
use crate::policy::config::{ClassConfig, PolicyConfig};
use crate::routing::RecordingRouting;

// ---------------------------------------------------------------------------
// Topology
// ---------------------------------------------------------------------------

pub fn classes() -> Vec<ClassConfig> {
    vec![
        ClassConfig {
            name: "BASE".into(),
            priority: 1,
            direction: ClassDirection::default(),
            sources: vec!["MediaPlayer".into()],
            sinks: vec!["AMP".into(), "Gateway0".into()],
        },
        ClassConfig {
            name: "PHONE".into(),
            priority: 2,
            direction: ClassDirection::default(),
            sources: vec!["Phone".into()],
            sinks: vec!["AMP".into(), "PhoneSpeaker".into()],
        },
    ]
}

pub fn settings() -> Settings {
    Settings {
        controller: ControllerConfig::default(),
        policy: PolicyConfig {
            classes: classes(),
            ..PolicyConfig::default()
        },
    }
}

fn domain(name: &str) -> DomainSpec {
    DomainSpec {
        name: name.into(),
        bus_name: "test".into(),
        node_name: name.to_lowercase(),
        early: false,
        complete: false,
    }
}

fn sources() -> Vec<SourceSpec> {
    let mut gateway = SourceSpec::new("Gateway0", "Amplifier");
    gateway.state = SourceState::Unknown;
    let mut phone = SourceSpec::new("Phone", "Amplifier");
    phone.priority = 5;
    vec![SourceSpec::new("MediaPlayer", "Applications"), gateway, phone]
}

fn sinks() -> Vec<SinkSpec> {
    vec![
        SinkSpec::new("Gateway0", "Applications"),
        SinkSpec::new("AMP", "Amplifier"),
        SinkSpec::new("PhoneSpeaker", "Amplifier"),
    ]
}

fn gateway() -> GatewaySpec {
    GatewaySpec {
        name: "Gateway0".into(),
        sink_name: "Gateway0".into(),
        source_name: "Gateway0".into(),
        control_domain_name: "Applications".into(),
    }
}

/// Registration triggers that build the topology through a controller.
pub fn topology_triggers() -> Vec<Trigger> {
    let mut triggers = vec![
        Trigger::SystemRegisterDomain {
            domain: domain("Applications"),
        },
        Trigger::SystemRegisterDomain {
            domain: domain("Amplifier"),
        },
    ];
    triggers.extend(sources().into_iter().map(|source| Trigger::SystemRegisterSource { source }));
    triggers.extend(sinks().into_iter().map(|sink| Trigger::SystemRegisterSink { sink }));
    triggers.push(Trigger::SystemRegisterGateway { gateway: gateway() });
    triggers
}

// ---------------------------------------------------------------------------
// TestBed
// ---------------------------------------------------------------------------

pub struct TestBed {
    pub elements: ElementRegistry,
    pub handles: HandleRegistry,
    pub routing: RecordingRouting,
    pub ids: ActionIds,
    pub config: ControllerConfig,
    pub now_ms: u64,
    /// Failure switchboard of the bed's database.
    pub faults: FaultInjector,
}

impl TestBed {
    pub fn new() -> Self {
        let db = InMemoryDatabase::new();
        let faults = db.faults();
        let mut elements = ElementRegistry::new(Box::new(db));
        for class in classes() {
            elements.add_class(&class).unwrap();
        }
        for name in ["Applications", "Amplifier"] {
            elements.register_domain(&domain(name)).unwrap();
        }
        for source in sources() {
            elements.register_source(&source).unwrap();
        }
        for sink in sinks() {
            elements.register_sink(&sink).unwrap();
        }
        elements.register_gateway(&gateway()).unwrap();
        Self {
            elements,
            handles: HandleRegistry::new(),
            routing: RecordingRouting::new(),
            ids: ActionIds::default(),
            config: ControllerConfig::default(),
            now_ms: 1_000,
            faults,
        }
    }

    /// Runs `f` with a context over the bed, as the controller would for
    /// one call into a job.
    pub fn run<T>(&mut self, f: impl FnOnce(&mut ActionContext<'_>) -> T) -> T {
        let mut ctx = ActionContext {
            elements: &mut self.elements,
            handles: &mut self.handles,
            routing: &mut self.routing,
            config: &self.config,
            ids: &mut self.ids,
            now_ms: self.now_ms,
            root: ActionId(0),
        };
        f(&mut ctx)
    }

    pub fn connection(&mut self, class: &str, source: &str, sink: &str) -> MainConnectionId {
        self.elements
            .create_connection(class, source, sink, ConnectionFormat::Stereo)
            .unwrap()
    }

    pub fn journal(&self) -> Journal {
        Journal::default()
    }

    /// Delivers `result` for `handle` the way the controller's notify does.
    pub fn acknowledge(
        &mut self,
        action: &mut dyn Action,
        handle: Handle,
        result: ControlResult<()>,
    ) -> Outcome {
        let entry = self.handles.take(handle).unwrap();
        self.run(|ctx| action.on_async_result(ctx, entry.owner, handle, result))
    }

    /// Acknowledges every outstanding request successfully, in issue order,
    /// until nothing is outstanding. Returns the last outcome, or `Waiting`
    /// if nothing was outstanding.
    pub fn settle(&mut self, action: &mut dyn Action) -> Outcome {
        let mut outcome = Outcome::Waiting;
        loop {
            let outstanding: Vec<Handle> = self
                .routing
                .issued()
                .into_iter()
                .filter(|h| self.handles.contains(*h))
                .collect();
            if outstanding.is_empty() {
                return outcome;
            }
            for handle in outstanding {
                if self.handles.contains(handle) {
                    outcome = self.acknowledge(action, handle, Ok(()));
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Scripted steps
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    fn push(&self, entry: String) {
        self.0.lock().push(entry);
    }
}

#[derive(Debug, Clone)]
enum Script {
    Sync,
    Pending(Handle),
    Fail(ControlError),
}

impl Script {
    fn start(&self) -> ControlResult<Step> {
        match self {
            Script::Sync => Ok(Step::Complete),
            Script::Pending(handle) => Ok(Step::Pending(*handle)),
            Script::Fail(err) => Err(err.clone()),
        }
    }
}

/// Leaf step with a fixed forward and undo behaviour that counts its calls
/// and optionally writes `do <label>` / `undo <label>` to a journal.
#[derive(Debug)]
pub struct ScriptedStep {
    forward: Script,
    backward: Script,
    journal: Option<(String, Journal)>,
    pub confirmed: usize,
    pub failures: usize,
    pub undone: usize,
}

impl ScriptedStep {
    fn with(forward: Script) -> Self {
        Self {
            forward,
            backward: Script::Sync,
            journal: None,
            confirmed: 0,
            failures: 0,
            undone: 0,
        }
    }

    pub fn sync() -> Self {
        Self::with(Script::Sync)
    }

    pub fn pending(handle: Handle) -> Self {
        Self::with(Script::Pending(handle))
    }

    pub fn failing(error: ControlError) -> Self {
        Self::with(Script::Fail(error))
    }

    pub fn undo_pending(mut self, handle: Handle) -> Self {
        self.backward = Script::Pending(handle);
        self
    }

    pub fn undo_failing(mut self, error: ControlError) -> Self {
        self.backward = Script::Fail(error);
        self
    }

    pub fn journaled(mut self, label: &str, journal: &Journal) -> Self {
        self.journal = Some((label.to_string(), journal.clone()));
        self
    }

    fn note(&self, verb: &str) {
        if let Some((label, journal)) = &self.journal {
            journal.push(format!("{verb} {label}"));
        }
    }
}

impl LeafStep for ScriptedStep {
    fn name(&self) -> &'static str {
        "Scripted"
    }

    fn start(&mut self, _ctx: &mut ActionContext<'_>) -> ControlResult<Step> {
        self.note("do");
        self.forward.start()
    }

    fn confirm(&mut self, _ctx: &mut ActionContext<'_>) -> ControlResult<()> {
        self.confirmed += 1;
        Ok(())
    }

    fn on_failure(&mut self, _ctx: &mut ActionContext<'_>, _error: &ControlError) {
        self.failures += 1;
    }

    fn start_undo(&mut self, _ctx: &mut ActionContext<'_>) -> ControlResult<Step> {
        self.note("undo");
        self.undone += 1;
        self.backward.start()
    }
}
