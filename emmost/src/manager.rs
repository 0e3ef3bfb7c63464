//! Node object pool

use heapless::Vec;

use crate::addr::AddressRegistry;
use crate::core::{NodeAddress, NodePosition};
use crate::node::Node;
use crate::time::Duration;

/// Creates and looks up [`Node`] objects by address
///
/// Nodes are allocated lazily from a pool of `N` slots and reused for the lifetime of the
/// manager. The root node is stored under `NodeAddress::LOCAL`; lookups by its learned ring
/// address resolve to that entry.
pub struct NodeManager<'a, const N: usize> {
    nodes: Vec<Node<'a>, N>,
    script_timeout: Duration,
}

impl<'a, const N: usize> NodeManager<'a, N> {
    pub(crate) fn new(script_timeout: Duration) -> Self {
        Self {
            nodes: Vec::new(),
            script_timeout,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the node for `address`, creating it on first use.
    ///
    /// The root position teaches the registry its own address. Returns `None` if the pool is
    /// exhausted.
    pub(crate) fn create_node(
        &mut self,
        address: NodeAddress,
        position: NodePosition,
        registry: &mut AddressRegistry,
    ) -> Option<&mut Node<'a>> {
        let key = if position.is_root() {
            registry.notify_own_address(address);
            NodeAddress::LOCAL
        } else {
            address
        };

        let index = match self.index_of(key) {
            Some(index) => index,
            None => {
                if self.nodes.push(Node::new(key, self.script_timeout)).is_err() {
                    error!("cannot create node object {:#x}", key.into_u16());
                    return None;
                }
                info!("node object {:#x} created", key.into_u16());
                self.nodes.len() - 1
            }
        };
        self.nodes.get_mut(index)
    }

    pub(crate) fn find_node(
        &mut self,
        address: NodeAddress,
        registry: &AddressRegistry,
    ) -> Option<&mut Node<'a>> {
        let key = if registry.is_own_address(address) {
            NodeAddress::LOCAL
        } else {
            address
        };
        let node = self.nodes.iter_mut().find(|node| node.address() == key);
        if node.is_none() {
            debug!("no node object for {:#x}", address.into_u16());
        }
        node
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut Node<'a>> {
        self.nodes.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node<'a>> {
        self.nodes.iter()
    }

    fn index_of(&self, key: NodeAddress) -> Option<usize> {
        self.nodes.iter().position(|node| node.address() == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REMOTE: NodeAddress = NodeAddress::new(0x0210);
    const ROOT_ADDRESS: NodeAddress = NodeAddress::new(0x0500);

    fn manager<const N: usize>() -> NodeManager<'static, N> {
        NodeManager::new(Duration::from_millis(100))
    }

    #[test]
    fn test_create_is_idempotent() {
        let mut registry = AddressRegistry::new();
        let mut nodes = manager::<4>();

        assert!(nodes.create_node(REMOTE, NodePosition::new(0x0401), &mut registry).is_some());
        assert!(nodes.create_node(REMOTE, NodePosition::new(0x0401), &mut registry).is_some());
        assert_eq!(nodes.len(), 1);
        assert_eq!(registry.own_address(), None);
        assert_eq!(nodes.find_node(REMOTE, &registry).map(|n| n.address()), Some(REMOTE));
    }

    #[test]
    fn test_root_node_is_local() {
        let mut registry = AddressRegistry::new();
        let mut nodes = manager::<4>();

        let node = nodes.create_node(ROOT_ADDRESS, NodePosition::ROOT, &mut registry);
        assert_eq!(node.map(|n| n.address()), Some(NodeAddress::LOCAL));
        assert!(registry.is_own_address(ROOT_ADDRESS));

        let found = nodes.find_node(ROOT_ADDRESS, &registry).map(|n| n.address());
        assert_eq!(found, Some(NodeAddress::LOCAL));
        let found = nodes.find_node(NodeAddress::LOCAL, &registry).map(|n| n.address());
        assert_eq!(found, Some(NodeAddress::LOCAL));
    }

    #[test]
    fn test_pool_exhaustion() {
        let mut registry = AddressRegistry::new();
        let mut nodes = manager::<1>();

        assert!(nodes.create_node(REMOTE, NodePosition::new(0x0401), &mut registry).is_some());
        let other = NodeAddress::new(0x0211);
        assert!(nodes.create_node(other, NodePosition::new(0x0402), &mut registry).is_none());
        assert!(nodes.find_node(other, &registry).is_none());
    }
}
