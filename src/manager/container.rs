//! Registry of live node references, in insertion order.

use crate::error::{EngineError, Result};
use crate::manager::node_ref::NodeRef;

/// Live nodes keyed by unique names of the form `<base><n>`.
///
/// A name present in the container always refers to a node that has not been
/// terminated; `remove` terminates before deleting.
#[derive(Debug, Default)]
pub struct NodeContainer {
    nodes: Vec<(String, NodeRef)>,
}

impl NodeContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The name `add` would assign for `base` right now: `base` followed by
    /// the smallest non-negative integer not in use.
    pub fn next_name(&self, base: &str) -> String {
        (0u64..)
            .map(|i| format!("{base}{i}"))
            .find(|candidate| !self.contains(candidate))
            .unwrap_or_else(|| base.to_string())
    }

    /// Register `node` and return its assigned name.
    pub fn add(&mut self, base: &str, node: NodeRef) -> String {
        let name = self.next_name(base);
        self.nodes.push((name.clone(), node));
        name
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.iter().any(|(n, _)| n == name)
    }

    pub fn get(&self, name: &str) -> Result<&NodeRef> {
        self.nodes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, node)| node)
            .ok_or_else(|| EngineError::NotFound(format!("node `{name}`")))
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut NodeRef> {
        self.nodes
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, node)| node)
            .ok_or_else(|| EngineError::NotFound(format!("node `{name}`")))
    }

    /// Terminate the node and delete it.
    pub fn remove(&mut self, name: &str) -> Result<()> {
        self.detach(name)?.join();
        Ok(())
    }

    /// Signal the node to terminate and take it out of the container without
    /// waiting for its thread. The caller joins the returned reference.
    pub fn detach(&mut self, name: &str) -> Result<NodeRef> {
        let index = self
            .nodes
            .iter()
            .position(|(n, _)| n == name)
            .ok_or_else(|| EngineError::NotFound(format!("node `{name}`")))?;
        let (_, mut node) = self.nodes.remove(index);
        node.signal_terminate();
        Ok(node)
    }

    /// Signal every node, then empty the container. Nodes are signalled
    /// before any is joined so one slow node does not delay the others'
    /// TERMINATE.
    pub fn detach_all(&mut self) -> Vec<NodeRef> {
        let mut nodes: Vec<NodeRef> = self.nodes.drain(..).map(|(_, node)| node).collect();
        for node in &mut nodes {
            node.signal_terminate();
        }
        nodes
    }

    /// Terminate every node, then empty the container.
    pub fn terminate_all(&mut self) {
        for mut node in self.detach_all() {
            node.join();
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &NodeRef)> {
        self.nodes.iter().map(|(n, node)| (n.as_str(), node))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::local;
    use crate::node::ParamTree;

    fn node() -> NodeRef {
        let (manager_side, _node_side) = local::pair();
        NodeRef::new("test", manager_side, &[], &[], ParamTree::new())
    }

    #[test]
    fn test_names_get_smallest_free_suffix() {
        let mut c = NodeContainer::new();
        assert_eq!(c.add("sine", node()), "sine0");
        assert_eq!(c.add("sine", node()), "sine1");
        assert_eq!(c.add("scale", node()), "scale0");
        c.remove("sine0").unwrap();
        assert_eq!(c.add("sine", node()), "sine0");
        assert_eq!(c.names().collect::<Vec<_>>(), vec!["sine1", "scale0", "sine0"]);
    }

    #[test]
    fn test_remove_absent_is_not_found_and_leaves_container() {
        let mut c = NodeContainer::new();
        c.add("sine", node());
        let err = c.remove("sine7").unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn test_lookup_absent_is_not_found() {
        let c = NodeContainer::new();
        assert!(c.get("x0").unwrap_err().is_not_found());
    }

    #[test]
    fn test_detach_signals_and_removes() {
        let (manager_side, node_side) = local::pair();
        let mut c = NodeContainer::new();
        let name = c.add("sine", NodeRef::new("sine", manager_side, &[], &[], ParamTree::new()));
        let node = c.detach(&name).unwrap();
        assert!(node.is_terminated());
        assert!(!c.contains(&name));
        assert!(!node_side.poll());
        assert!(c.detach(&name).unwrap_err().is_not_found());
    }

    #[test]
    fn test_terminate_all_empties() {
        let mut c = NodeContainer::new();
        c.add("a", node());
        c.add("b", node());
        c.terminate_all();
        assert!(c.is_empty());
    }
}
