//! Container data structures for the JWZ threading algorithm
//!
//! The JWZ algorithm uses a "container" abstraction to represent both real messages
//! and dummy messages (messages referenced but never seen in the batch).
//!
//! Containers live in a single arena and refer to each other by [`ContainerId`].
//! Each container has at most one parent and an ordered list of children; the
//! arena is owned by one threading run and dropped with it.

use std::ops::Index;

use crate::models::Message;

/// Handle of a container inside a [`ContainerArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerId(usize);

/// A node in the thread tree.
///
/// ## Dummy Containers
///
/// Dummy containers carry no message. They are created for ids that appear in a
/// References header before (or without) the message itself, and for grouping
/// roots that share a subject.
#[derive(Debug, Clone)]
pub struct Container {
    pub message: Option<Message>,
    pub parent: Option<ContainerId>,
    pub children: Vec<ContainerId>,
}

impl Container {
    fn new(message: Option<Message>) -> Self {
        Container {
            message,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn is_dummy(&self) -> bool {
        self.message.is_none()
    }
}

/// Index-addressed storage for every container of one threading run.
#[derive(Debug, Default)]
pub struct ContainerArena {
    nodes: Vec<Container>,
}

impl ContainerArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a container; `None` creates a dummy.
    pub fn alloc(&mut self, message: Option<Message>) -> ContainerId {
        self.nodes.push(Container::new(message));
        ContainerId(self.nodes.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All container ids in allocation order.
    pub fn ids(&self) -> impl Iterator<Item = ContainerId> + use<> {
        (0..self.nodes.len()).map(ContainerId)
    }

    pub fn is_dummy(&self, id: ContainerId) -> bool {
        self[id].is_dummy()
    }

    pub fn parent(&self, id: ContainerId) -> Option<ContainerId> {
        self[id].parent
    }

    pub fn children(&self, id: ContainerId) -> &[ContainerId] {
        &self[id].children
    }

    pub fn set_message(&mut self, id: ContainerId, message: Message) {
        self.nodes[id.0].message = Some(message);
    }

    pub fn take_message(&mut self, id: ContainerId) -> Option<Message> {
        self.nodes[id.0].message.take()
    }

    /// Make `child` the last child of `parent`, detaching it from any prior parent.
    ///
    /// No cycle check is done here; callers guard with
    /// [`would_create_cycle`](super::algorithm::would_create_cycle).
    pub fn add_child(&mut self, parent: ContainerId, child: ContainerId) {
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    /// Remove `child` from its parent's child list, leaving it parentless.
    pub fn detach(&mut self, child: ContainerId) {
        if let Some(old_parent) = self.nodes[child.0].parent.take() {
            self.nodes[old_parent.0].children.retain(|&c| c != child);
        }
    }

    pub(crate) fn set_parent(&mut self, id: ContainerId, parent: Option<ContainerId>) {
        self.nodes[id.0].parent = parent;
    }

    pub(crate) fn replace_children(
        &mut self,
        id: ContainerId,
        children: Vec<ContainerId>,
    ) -> Vec<ContainerId> {
        std::mem::replace(&mut self.nodes[id.0].children, children)
    }

    /// Subject of the container: its message's subject, or for a dummy the
    /// subject of its first descendant along first children.
    pub fn subject(&self, id: ContainerId) -> &str {
        let mut current = id;
        loop {
            let container = &self[current];
            if let Some(message) = &container.message {
                return &message.subject;
            }
            match container.children.first() {
                Some(&first) => current = first,
                None => return "",
            }
        }
    }
}

impl Index<ContainerId> for ContainerArena {
    type Output = Container;

    fn index(&self, id: ContainerId) -> &Container {
        &self.nodes[id.0]
    }
}
