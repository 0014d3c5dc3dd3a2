//! TableSelectStringNode: picks one string entry out of a table.

use crate::node::params::{AUTOTRIGGER, COMMON_GROUP};
use crate::node::{Node, NodeContext, NodeError, Outputs, Param, ParamTree, SlotDescriptor};
use crate::protocol::{Data, DataType};

static INPUTS: &[SlotDescriptor] = &[SlotDescriptor::new("input_table", DataType::Table)];
static OUTPUTS: &[SlotDescriptor] = &[SlotDescriptor::new("output_string", DataType::String)];

#[derive(Debug, Default)]
pub struct TableSelectStringNode;

impl Node for TableSelectStringNode {
    fn input_slots(&self) -> &[SlotDescriptor] {
        INPUTS
    }

    fn output_slots(&self) -> &[SlotDescriptor] {
        OUTPUTS
    }

    fn params(&self) -> ParamTree {
        ParamTree::new()
            .group("selection", [("key", Param::string("default_key"))])
            .group(COMMON_GROUP, [(AUTOTRIGGER, Param::bool(true))])
    }

    fn process(&mut self, ctx: &mut NodeContext) -> Result<Option<Outputs>, NodeError> {
        let Some(input) = ctx.inputs.get("input_table") else {
            return Ok(None);
        };
        let table = input
            .as_table()
            .ok_or_else(|| NodeError::invalid_input("input_table", "expected a table"))?;
        let key = ctx.params.string("selection", "key").unwrap_or_default();

        let entry = table
            .get(key)
            .ok_or_else(|| NodeError::processing(format!("`{key}` not found in the input table")))?;
        let value = entry
            .as_str()
            .ok_or_else(|| NodeError::processing(format!("the value for `{key}` is not a string")))?;

        let out = Data::string(value).with_meta_from(&input.meta);
        Ok(Some(Outputs::from([("output_string".to_string(), out)])))
    }
}
