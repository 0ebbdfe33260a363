//! Routing of operations to the naming context that owns their target DN.
//!
//! Workflows form a forest keyed by base DN: every node's base DN lies
//! beneath its parent's, and siblings never share a base DN. Nodes live in
//! an arena addressed by generation-checked [`NodeId`]s so parent links are
//! plain indices and re-parenting never touches reference counts.
//!
//! Routing takes the read lock only long enough to pick a node or snapshot
//! its subordinates; handlers always run with the lock released.

mod result;

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use thiserror::Error;
use tracing::debug;

use dirsrv_types::{Dn, ResultCode, SearchScope};

use crate::operation::{Operation, OperationType};

use self::result::AggregateResult;

pub(crate) const WORKFLOW_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::workflow");

/// Backend logic serving one naming context.
///
/// Implementations set the operation's result code and, on success, attach
/// [`crate::operation::LocalOperation`] records describing what changed.
pub trait WorkflowHandler: Send + Sync {
    /// Executes the operation against this naming context.
    fn execute(&self, operation: &mut Operation);
}

/// Errors raised while reshaping the routing tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    /// A workflow is already registered for the base DN.
    #[error("a workflow is already registered for '{base_dn}'")]
    Duplicate {
        /// Conflicting base DN.
        base_dn: Dn,
    },
    /// No workflow is registered for the base DN.
    #[error("no workflow is registered for '{base_dn}'")]
    NotFound {
        /// Requested base DN.
        base_dn: Dn,
    },
}

/// Stable handle to a node in the routing tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: usize,
    generation: u64,
}

/// A routing decision: the node that owns a DN and its handler.
#[derive(Clone)]
pub struct Workflow {
    id: NodeId,
    base_dn: Dn,
    handler: Arc<dyn WorkflowHandler>,
}

impl Workflow {
    /// Node the workflow was resolved from.
    #[must_use]
    pub const fn id(&self) -> NodeId {
        self.id
    }

    /// Base DN of the naming context.
    #[must_use]
    pub const fn base_dn(&self) -> &Dn {
        &self.base_dn
    }
}

impl fmt::Debug for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workflow")
            .field("id", &self.id)
            .field("base_dn", &self.base_dn)
            .finish_non_exhaustive()
    }
}

struct Node {
    base_dn: Dn,
    parent: Option<usize>,
    subordinates: Vec<usize>,
    handler: Arc<dyn WorkflowHandler>,
}

#[derive(Default)]
struct Slot {
    generation: u64,
    node: Option<Node>,
}

#[derive(Default)]
struct Arena {
    slots: Vec<Slot>,
    free: Vec<usize>,
    roots: Vec<usize>,
}

impl Arena {
    fn node(&self, index: usize) -> Option<&Node> {
        self.slots.get(index).and_then(|slot| slot.node.as_ref())
    }

    fn node_mut(&mut self, index: usize) -> Option<&mut Node> {
        self.slots.get_mut(index).and_then(|slot| slot.node.as_mut())
    }

    fn live(&self, id: NodeId) -> Option<&Node> {
        self.slots
            .get(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    fn workflow(&self, index: usize) -> Option<Workflow> {
        let slot = self.slots.get(index)?;
        let node = slot.node.as_ref()?;
        Some(Workflow {
            id: NodeId {
                index,
                generation: slot.generation,
            },
            base_dn: node.base_dn.clone(),
            handler: Arc::clone(&node.handler),
        })
    }

    /// Walks down from the roots, following the first subordinate whose base
    /// DN contains `dn` at each level.
    fn deepest_containing(&self, dn: &Dn) -> Option<usize> {
        let mut owner = None;
        let mut level = &self.roots;
        while let Some(&index) = level.iter().find(|&&index| {
            self.node(index)
                .is_some_and(|node| node.base_dn.is_ancestor_of(dn))
        }) {
            owner = Some(index);
            match self.node(index) {
                Some(node) => level = &node.subordinates,
                None => break,
            }
        }
        owner
    }

    fn siblings_mut(&mut self, parent: Option<usize>) -> &mut Vec<usize> {
        match parent {
            Some(index) => match self.slots.get_mut(index).and_then(|slot| slot.node.as_mut()) {
                Some(node) => &mut node.subordinates,
                None => &mut self.roots,
            },
            None => &mut self.roots,
        }
    }

    fn allocate(&mut self, node: Node) -> usize {
        if let Some(index) = self.free.pop()
            && let Some(slot) = self.slots.get_mut(index)
        {
            slot.node = Some(node);
            return index;
        }
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        self.slots.len() - 1
    }

    fn release(&mut self, index: usize) -> Option<Node> {
        let slot = self.slots.get_mut(index)?;
        let node = slot.node.take()?;
        slot.generation += 1;
        self.free.push(index);
        Some(node)
    }

    fn collect_depth_first(&self, level: &[usize], out: &mut Vec<Dn>) {
        for &index in level {
            if let Some(node) = self.node(index) {
                out.push(node.base_dn.clone());
                self.collect_depth_first(&node.subordinates, out);
            }
        }
    }
}

/// The routing forest of registered workflows.
#[derive(Default)]
pub struct WorkflowTree {
    arena: RwLock<Arena>,
}

impl fmt::Debug for WorkflowTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowTree")
            .field("naming_contexts", &self.naming_contexts())
            .finish()
    }
}

impl WorkflowTree {
    /// Creates an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Arena> {
        self.arena.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Arena> {
        self.arena.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the most specific workflow whose base DN is an
    /// ancestor-or-equal of `dn`.
    #[must_use]
    pub fn candidate(&self, dn: &Dn) -> Option<Workflow> {
        let arena = self.read();
        arena
            .deepest_containing(dn)
            .and_then(|index| arena.workflow(index))
    }

    /// Registers `handler` for `base_dn`.
    ///
    /// Existing siblings that fall beneath `base_dn` become subordinates of
    /// the new node, keeping their relative order.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Duplicate`] when `base_dn` is already
    /// registered.
    pub fn insert(
        &self,
        base_dn: Dn,
        handler: Arc<dyn WorkflowHandler>,
    ) -> Result<Workflow, WorkflowError> {
        let mut arena = self.write();
        let parent = arena.deepest_containing(&base_dn);
        if let Some(existing) = parent.and_then(|index| arena.node(index))
            && existing.base_dn == base_dn
        {
            return Err(WorkflowError::Duplicate { base_dn });
        }

        let siblings = arena.siblings_mut(parent).clone();
        let (adopted, kept): (Vec<usize>, Vec<usize>) =
            siblings.into_iter().partition(|&index| {
                arena
                    .node(index)
                    .is_some_and(|node| base_dn.is_strict_ancestor_of(&node.base_dn))
            });

        let index = arena.allocate(Node {
            base_dn: base_dn.clone(),
            parent,
            subordinates: adopted.clone(),
            handler,
        });
        for &child in &adopted {
            if let Some(node) = arena.node_mut(child) {
                node.parent = Some(index);
            }
        }
        let siblings = arena.siblings_mut(parent);
        *siblings = kept;
        siblings.push(index);

        debug!(
            target: WORKFLOW_TARGET,
            base_dn = %base_dn,
            adopted = adopted.len(),
            "workflow registered"
        );
        arena
            .workflow(index)
            .ok_or(WorkflowError::NotFound { base_dn })
    }

    /// Unregisters the workflow for `base_dn`.
    ///
    /// Its subordinates take its place under its former parent.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::NotFound`] when nothing is registered for
    /// `base_dn`.
    pub fn remove(&self, base_dn: &Dn) -> Result<(), WorkflowError> {
        let mut arena = self.write();
        let Some(index) = arena
            .deepest_containing(base_dn)
            .filter(|&index| arena.node(index).is_some_and(|node| node.base_dn == *base_dn))
        else {
            return Err(WorkflowError::NotFound {
                base_dn: base_dn.clone(),
            });
        };
        let Some(node) = arena.release(index) else {
            return Err(WorkflowError::NotFound {
                base_dn: base_dn.clone(),
            });
        };

        for &child in &node.subordinates {
            if let Some(child_node) = arena.node_mut(child) {
                child_node.parent = node.parent;
            }
        }
        let siblings = arena.siblings_mut(node.parent);
        let position = siblings
            .iter()
            .position(|&sibling| sibling == index)
            .unwrap_or(siblings.len());
        siblings.retain(|&sibling| sibling != index);
        let position = position.min(siblings.len());
        siblings.splice(position..position, node.subordinates.iter().copied());

        debug!(
            target: WORKFLOW_TARGET,
            base_dn = %base_dn,
            promoted = node.subordinates.len(),
            "workflow removed"
        );
        Ok(())
    }

    /// Registered base DNs in depth-first registration order.
    #[must_use]
    pub fn naming_contexts(&self) -> Vec<Dn> {
        let arena = self.read();
        let mut contexts = Vec::new();
        arena.collect_depth_first(&arena.roots, &mut contexts);
        contexts
    }

    /// Number of registered workflows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read()
            .slots
            .iter()
            .filter(|slot| slot.node.is_some())
            .count()
    }

    /// Returns `true` when no workflow is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn subordinates(&self, id: NodeId) -> Vec<Workflow> {
        let arena = self.read();
        arena
            .live(id)
            .map(|node| {
                node.subordinates
                    .iter()
                    .filter_map(|&index| arena.workflow(index))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Executes `operation` on `workflow`, fanning searches out to the
    /// subordinate naming contexts their scope reaches.
    ///
    /// Subordinates see the operation with their own base DN and a rewritten
    /// scope; the original base DN and scope are restored before returning,
    /// and the result code is the merge of every node that ran.
    pub fn execute(&self, workflow: &Workflow, operation: &mut Operation) {
        workflow.handler.execute(operation);

        let original_scope = operation.scope();
        if operation.operation_type() != OperationType::Search
            || original_scope == SearchScope::BaseObject
        {
            return;
        }
        let Some(original_base) = operation.dn().cloned() else {
            return;
        };
        let subordinates = self.subordinates(workflow.id);
        if subordinates.is_empty() {
            return;
        }

        let rewritten = match original_scope {
            SearchScope::SingleLevel => SearchScope::BaseObject,
            _ => SearchScope::WholeSubtree,
        };
        let mut aggregate = AggregateResult::new(operation.result_code(), operation.error_message());
        for subordinate in subordinates {
            if !in_fan_out_scope(&original_base, rewritten, subordinate.base_dn()) {
                continue;
            }
            debug!(
                target: WORKFLOW_TARGET,
                base_dn = %subordinate.base_dn(),
                scope = %rewritten,
                "delegating search to subordinate naming context"
            );
            operation.set_dn(subordinate.base_dn.clone());
            operation.set_scope(rewritten);
            operation.set_result(ResultCode::Undefined, "");
            self.execute(&subordinate, operation);
            aggregate.merge(operation.result_code(), operation.error_message());
        }

        operation.set_dn(original_base);
        operation.set_scope(original_scope);
        let (code, message) = aggregate.into_parts();
        operation.set_result(code, message);
    }
}

/// Decides whether a subordinate naming context takes part in a fanned-out
/// search. Single-level searches only reach naming contexts directly below
/// the original base.
fn in_fan_out_scope(original_base: &Dn, rewritten: SearchScope, subordinate: &Dn) -> bool {
    if !original_base.is_ancestor_of(subordinate) {
        return false;
    }
    rewritten != SearchScope::BaseObject || subordinate.is_child_of(original_base)
}
