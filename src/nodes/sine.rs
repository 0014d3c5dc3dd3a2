//! SineNode: periodic sine-wave source.
//!
//! Emits one chunk of `chunk_size` samples per step, continuing the phase
//! from the previous chunk. Changing `sfreq` re-runs setup, which resets the
//! phase.

use crate::node::params::{AUTOTRIGGER, COMMON_GROUP};
use crate::node::{Node, NodeContext, NodeError, Outputs, Param, ParamTree, SlotDescriptor};
use crate::protocol::{Data, DataType};
use std::f64::consts::PI;

static OUTPUTS: &[SlotDescriptor] = &[SlotDescriptor::new("out", DataType::Array)];

const GROUP: &str = "sine";

#[derive(Debug, Default)]
pub struct SineNode {
    /// Index of the next sample to emit.
    sample: u64,
    sfreq: f64,
}

impl Node for SineNode {
    fn output_slots(&self) -> &[SlotDescriptor] {
        OUTPUTS
    }

    fn params(&self) -> ParamTree {
        ParamTree::new()
            .group(
                GROUP,
                [
                    (
                        "frequency",
                        Param::float(1.0, Some(0.0), Some(500.0)).doc("Tone frequency in Hz"),
                    ),
                    ("amplitude", Param::float(1.0, Some(0.0), None)),
                    (
                        "sfreq",
                        Param::float(1000.0, Some(1.0), Some(100_000.0))
                            .doc("Sampling rate in Hz")
                            .requires_setup(),
                    ),
                    ("chunk_size", Param::int(10, Some(1), Some(10_000))),
                ],
            )
            .group(COMMON_GROUP, [(AUTOTRIGGER, Param::bool(true))])
    }

    fn setup(&mut self, params: &ParamTree) -> Result<(), NodeError> {
        self.sfreq = params
            .float(GROUP, "sfreq")
            .ok_or_else(|| NodeError::setup("sfreq is not set"))?;
        self.sample = 0;
        Ok(())
    }

    fn process(&mut self, ctx: &mut NodeContext) -> Result<Option<Outputs>, NodeError> {
        let frequency = ctx.params.float(GROUP, "frequency").unwrap_or(1.0);
        let amplitude = ctx.params.float(GROUP, "amplitude").unwrap_or(1.0);
        let chunk = ctx.params.int(GROUP, "chunk_size").unwrap_or(10).max(1) as u64;

        let values = (self.sample..self.sample + chunk)
            .map(|n| amplitude * (2.0 * PI * frequency * n as f64 / self.sfreq).sin())
            .collect();
        self.sample += chunk;

        let out = Data::array(values).with_meta("sfreq", self.sfreq);
        Ok(Some(Outputs::from([("out".to_string(), out)])))
    }
}
