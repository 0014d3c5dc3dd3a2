//! Bundled node implementations.

pub mod psd;
pub mod scale;
pub mod sine;
pub mod table_select_string;

pub use psd::PsdNode;
pub use scale::ScaleNode;
pub use sine::SineNode;
pub use table_select_string::TableSelectStringNode;

use crate::node::NodeRegistry;

/// Register every bundled node type.
pub fn register_builtin(registry: &mut NodeRegistry) {
    registry
        .register_default::<SineNode>("sine")
        .register_default::<ScaleNode>("scale")
        .register_default::<PsdNode>("psd")
        .register_default::<TableSelectStringNode>("tableselectstring");
}
