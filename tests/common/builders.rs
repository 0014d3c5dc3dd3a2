//! Test nodes and registry/manager builders

use crossbeam_channel::{unbounded, Receiver, Sender};
use pipegraph::node::Param;
use pipegraph::{
    Data, DataType, EngineConfig, Manager, ManagerOptions, Node, NodeContext, NodeError,
    NodeRegistry, Outputs, ParamTree, SlotDescriptor, Transport,
};

static ARRAY_OUT: &[SlotDescriptor] = &[SlotDescriptor::new("out", DataType::Array)];
static ARRAY_IN: &[SlotDescriptor] = &[SlotDescriptor::new("data", DataType::Array)];

/// Emits `[start, start + 1, start + 2]` with `sfreq = 100` whenever
/// `emit.go` is triggered.
#[derive(Debug, Default)]
pub struct Emitter;

impl Node for Emitter {
    fn output_slots(&self) -> &[SlotDescriptor] {
        ARRAY_OUT
    }

    fn params(&self) -> ParamTree {
        ParamTree::new().group(
            "emit",
            [
                ("go", Param::trigger()),
                ("start", Param::float(1.0, None, None)),
            ],
        )
    }

    fn process(&mut self, ctx: &mut NodeContext) -> Result<Option<Outputs>, NodeError> {
        if !ctx.params.take_trigger("emit", "go") {
            return Ok(None);
        }
        let start = ctx.params.float("emit", "start").unwrap_or(1.0);
        let data = Data::array(vec![start, start + 1.0, start + 2.0]).with_meta("sfreq", 100.0);
        Ok(Some(Outputs::from([("out".to_string(), data)])))
    }
}

/// Reports the content of its `data` slot on every step. `record.snap`
/// forces a step without new data.
pub struct Recorder {
    tx: Sender<Option<Data>>,
}

impl Node for Recorder {
    fn input_slots(&self) -> &[SlotDescriptor] {
        ARRAY_IN
    }

    fn params(&self) -> ParamTree {
        ParamTree::new().group("record", [("snap", Param::trigger())])
    }

    fn process(&mut self, ctx: &mut NodeContext) -> Result<Option<Outputs>, NodeError> {
        ctx.params.take_trigger("record", "snap");
        let _ = self.tx.send(ctx.inputs.get("data").cloned());
        Ok(None)
    }
}

/// Forwards arrays unchanged, but panics on a negative first value and fails
/// on an empty array.
#[derive(Debug, Default)]
pub struct Flaky;

impl Node for Flaky {
    fn input_slots(&self) -> &[SlotDescriptor] {
        ARRAY_IN
    }

    fn output_slots(&self) -> &[SlotDescriptor] {
        ARRAY_OUT
    }

    fn process(&mut self, ctx: &mut NodeContext) -> Result<Option<Outputs>, NodeError> {
        let data = ctx.input("data")?;
        let array = data
            .as_array()
            .ok_or_else(|| NodeError::invalid_input("data", "expected an array"))?;
        match array.values().first() {
            None => Err(NodeError::processing("empty array")),
            Some(v) if *v < 0.0 => panic!("negative input {v}"),
            Some(_) => Ok(Some(Outputs::from([("out".to_string(), data.clone())]))),
        }
    }
}

/// Registry with the bundled nodes plus `emitter`, `recorder` and `flaky`.
/// Every recorder created from it reports into the returned receiver.
pub fn test_registry() -> (NodeRegistry, Receiver<Option<Data>>) {
    let (tx, rx) = unbounded();
    let mut registry = NodeRegistry::builtin();
    registry
        .register_default::<Emitter>("emitter")
        .register_default::<Flaky>("flaky")
        .register("recorder", move || {
            Ok(Box::new(Recorder { tx: tx.clone() }) as Box<dyn Node>)
        });
    (registry, rx)
}

/// Builder for managers with short timeouts
pub struct ManagerBuilder {
    config: EngineConfig,
}

impl ManagerBuilder {
    pub fn new() -> Self {
        let mut config = EngineConfig::default();
        config.runtime.idle_wait_ms = 10;
        config.manager.ping_timeout_ms = 1000;
        config.manager.shutdown_grace_ms = 1000;
        Self { config }
    }

    pub fn transport(mut self, transport: Transport) -> Self {
        self.config.manager.transport = transport;
        self
    }

    pub fn max_frequency(mut self, hz: f64) -> Self {
        self.config.runtime.default_max_frequency = hz;
        self
    }

    pub fn options(&self) -> ManagerOptions {
        ManagerOptions::from(&self.config)
    }

    /// Manager over `test_registry()`, plus the recorder receiver.
    pub fn build(self) -> (Manager, Receiver<Option<Data>>) {
        let (registry, rx) = test_registry();
        (Manager::new(registry, self.options()), rx)
    }
}

impl Default for ManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

