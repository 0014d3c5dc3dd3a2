//! ScaleNode: multiplies an array by a constant factor.

use crate::node::{Node, NodeContext, NodeError, Outputs, Param, ParamTree, SlotDescriptor};
use crate::protocol::{Data, DataType};

static INPUTS: &[SlotDescriptor] = &[SlotDescriptor::new("data", DataType::Array)];
static OUTPUTS: &[SlotDescriptor] = &[SlotDescriptor::new("out", DataType::Array)];

#[derive(Debug, Default)]
pub struct ScaleNode;

impl Node for ScaleNode {
    fn input_slots(&self) -> &[SlotDescriptor] {
        INPUTS
    }

    fn output_slots(&self) -> &[SlotDescriptor] {
        OUTPUTS
    }

    fn params(&self) -> ParamTree {
        ParamTree::new().group("scale", [("factor", Param::float(1.0, None, None))])
    }

    fn process(&mut self, ctx: &mut NodeContext) -> Result<Option<Outputs>, NodeError> {
        let Some(data) = ctx.inputs.get("data") else {
            return Ok(None);
        };
        let array = data
            .as_array()
            .ok_or_else(|| NodeError::invalid_input("data", "expected an array"))?;
        let factor = ctx.params.float("scale", "factor").unwrap_or(1.0);

        let out = Data::new(array.map(|v| v * factor).into(), data.meta.clone());
        Ok(Some(Outputs::from([("out".to_string(), out)])))
    }
}
