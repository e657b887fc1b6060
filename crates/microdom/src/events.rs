//! Event registry - per-node event targets with bubbling
//!
//! Design: the registry lives next to the arena, not inside it. Bubbling is
//! an explicit walk up the parent links; nothing is dispatched implicitly by
//! tree mutations.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::rc::Rc;

use crate::arena::DomArena;
use crate::error::{DomError, Result};
use crate::types::{Change, NodeId};

/// Events that can be dispatched through a tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    NodeInserted,
    NodeRemoved,
    NodeReplaced,
    TextChanged,
    AttributeChanged,
}

/// A single event, built once per dispatch and reused on every bubble step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomEvent {
    pub event_type: EventType,
    /// Node the event originated from
    pub source: NodeId,
    /// Node the event is about
    pub target: NodeId,
    /// Node whose targets are currently being invoked
    pub current: NodeId,
}

/// Receiver of dispatched events.
///
/// Targets may read or edit attributes and text through the arena, but must
/// not change the tree structure: dispatch fails fast if they do.
pub trait EventTarget {
    fn handle_event(&self, event: &DomEvent, arena: &mut DomArena);
}

impl<F> EventTarget for F
where
    F: Fn(&DomEvent, &mut DomArena),
{
    fn handle_event(&self, event: &DomEvent, arena: &mut DomArena) {
        self(event, arena)
    }
}

/// Shared handle to a target. Identity is the identity of the allocation.
pub type EventTargetHandle = Rc<dyn EventTarget>;

type NodeTargets = AHashMap<EventType, Vec<EventTargetHandle>>;

/// Event targets of all nodes of one arena
#[derive(Default)]
pub struct EventRegistry {
    targets: AHashMap<NodeId, NodeTargets>,
}

impl std::fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRegistry")
            .field("nodes", &self.targets.len())
            .finish()
    }
}

fn same_target(a: &EventTargetHandle, b: &EventTargetHandle) -> bool {
    std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a target; registering the same handle twice is a no-op
    pub fn register_event_target(
        &mut self,
        node_id: NodeId,
        event_type: EventType,
        target: EventTargetHandle,
    ) -> Change {
        let handles = self
            .targets
            .entry(node_id)
            .or_default()
            .entry(event_type)
            .or_default();

        if handles.iter().any(|h| same_target(h, &target)) {
            return Change::Unchanged;
        }
        handles.push(target);
        Change::Changed
    }

    pub fn unregister_event_target(
        &mut self,
        node_id: NodeId,
        event_type: EventType,
        target: &EventTargetHandle,
    ) -> Change {
        let Some(by_type) = self.targets.get_mut(&node_id) else {
            return Change::Unchanged;
        };
        let Some(handles) = by_type.get_mut(&event_type) else {
            return Change::Unchanged;
        };

        let before = handles.len();
        handles.retain(|h| !same_target(h, target));
        let change = Change::from_bool(handles.len() != before);

        if handles.is_empty() {
            by_type.remove(&event_type);
        }
        if by_type.is_empty() {
            self.targets.remove(&node_id);
        }
        change
    }

    pub fn target_count(&self, node_id: NodeId, event_type: EventType) -> usize {
        self.targets
            .get(&node_id)
            .and_then(|by_type| by_type.get(&event_type))
            .map_or(0, Vec::len)
    }

    /// Drop every registration of a node, e.g. after `DomArena::release`
    pub fn forget(&mut self, node_id: NodeId) -> Change {
        Change::from_bool(self.targets.remove(&node_id).is_some())
    }

    /// Invoke the targets registered for `event_type` on `source`, then on
    /// each ancestor up to the root. Returns the number of invocations.
    pub fn dispatch(
        &self,
        arena: &mut DomArena,
        event_type: EventType,
        source: NodeId,
        target: NodeId,
    ) -> Result<usize> {
        arena.get(target)?;
        let mut event = DomEvent {
            event_type,
            source,
            target,
            current: source,
        };
        let mut invoked = 0;
        let mut current = Some(source);

        while let Some(node_id) = current {
            let parent_id = arena.parent(node_id)?;

            if let Some(handles) = self.targets.get(&node_id).and_then(|t| t.get(&event_type)) {
                event.current = node_id;
                let generation = arena.generation();
                for handle in handles {
                    handle.handle_event(&event, arena);
                    invoked += 1;
                    if arena.generation() != generation {
                        return Err(DomError::ConcurrentModification { node: node_id });
                    }
                }
            }

            current = parent_id;
        }

        Ok(invoked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn recorder(log: &Rc<RefCell<Vec<String>>>, name: &'static str) -> EventTargetHandle {
        let log = Rc::clone(log);
        Rc::new(move |event: &DomEvent, _: &mut DomArena| {
            log.borrow_mut().push(format!("{}@{}", name, event.current));
        })
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut registry = EventRegistry::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let target = recorder(&log, "a");

        assert!(registry
            .register_event_target(1, EventType::NodeInserted, Rc::clone(&target))
            .is_changed());
        assert!(registry
            .register_event_target(1, EventType::NodeInserted, Rc::clone(&target))
            .is_unchanged());
        assert_eq!(registry.target_count(1, EventType::NodeInserted), 1);

        assert!(registry
            .unregister_event_target(1, EventType::NodeInserted, &target)
            .is_changed());
        assert!(registry
            .unregister_event_target(1, EventType::NodeInserted, &target)
            .is_unchanged());
        assert_eq!(registry.target_count(1, EventType::NodeInserted), 0);
    }

    #[test]
    fn test_dispatch_bubbles_to_root_in_order() {
        let mut arena = DomArena::new();
        let root = arena.create_element("root");
        let middle = arena.create_element("middle");
        let leaf = arena.create_text("leaf");
        arena.append_child(root, middle).unwrap();
        arena.append_child(middle, leaf).unwrap();

        let log = Rc::new(RefCell::new(Vec::new()));
        let mut registry = EventRegistry::new();
        let _ = registry.register_event_target(leaf, EventType::TextChanged, recorder(&log, "first"));
        let _ = registry.register_event_target(leaf, EventType::TextChanged, recorder(&log, "second"));
        let _ = registry.register_event_target(root, EventType::TextChanged, recorder(&log, "root"));
        let _ = registry.register_event_target(middle, EventType::NodeRemoved, recorder(&log, "other"));

        let invoked = registry
            .dispatch(&mut arena, EventType::TextChanged, leaf, leaf)
            .unwrap();

        assert_eq!(invoked, 3);
        assert_eq!(
            *log.borrow(),
            vec![
                format!("first@{leaf}"),
                format!("second@{leaf}"),
                format!("root@{root}")
            ]
        );
    }

    #[test]
    fn test_targets_may_edit_attributes() {
        let mut arena = DomArena::new();
        let root = arena.create_element("root");
        let mut registry = EventRegistry::new();
        let _ = registry.register_event_target(
            root,
            EventType::AttributeChanged,
            Rc::new(|event: &DomEvent, arena: &mut DomArena| {
                let _ = arena.set_attribute(event.current, "seen", "yes");
            }),
        );

        registry
            .dispatch(&mut arena, EventType::AttributeChanged, root, root)
            .unwrap();
        assert_eq!(arena.attribute(root, "seen").unwrap(), Some("yes"));
    }

    #[test]
    fn test_structural_change_during_dispatch_fails_fast() {
        let mut arena = DomArena::new();
        let root = arena.create_element("root");
        let child = arena.create_element("child");
        arena.append_child(root, child).unwrap();

        let mut registry = EventRegistry::new();
        let _ = registry.register_event_target(
            child,
            EventType::NodeInserted,
            Rc::new(|event: &DomEvent, arena: &mut DomArena| {
                let extra = arena.create_element("extra");
                let _ = arena.append_child(event.current, extra);
            }),
        );
        let log = Rc::new(RefCell::new(Vec::new()));
        let _ = registry.register_event_target(root, EventType::NodeInserted, recorder(&log, "root"));

        let err = registry
            .dispatch(&mut arena, EventType::NodeInserted, child, child)
            .unwrap_err();
        assert!(matches!(err, DomError::ConcurrentModification { node } if node == child));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_forget_after_release() {
        let mut arena = DomArena::new();
        let node = arena.create_element("gone");
        let mut registry = EventRegistry::new();
        let _ = registry.register_event_target(
            node,
            EventType::NodeRemoved,
            Rc::new(|_: &DomEvent, _: &mut DomArena| {}),
        );

        for id in arena.release(node).unwrap() {
            let _ = registry.forget(id);
        }
        assert_eq!(registry.target_count(node, EventType::NodeRemoved), 0);
    }
}
