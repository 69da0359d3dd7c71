// src/containers.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The single-threaded containers the harness drives
//!
//! None of these are thread-safe; the harness serialises access per shard with
//! the lock table. Workers reach them only through [`Shard::apply`].

use std::collections::{LinkedList as StdLinkedList, VecDeque};

use crate::config::StructureKind;

/// Operation kinds a workload step can request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// push / add / append / insert
    Insert,
    /// pop / remove / removeHead / remove(v)
    Remove,
    /// lookup(v)
    Lookup,
    /// update(v)
    Update,
}

/// Result of one operation. Misses and empty removals are normal outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpOutcome {
    /// Insert applied
    Inserted,
    /// Remove-like operation; `None` when the container was empty or lacked the value
    Removed(Option<u64>),
    /// Lookup or update; whether the value was present
    Found(bool),
    /// The container kind has no such operation
    Unsupported,
}

/// Narrow interface a shard exposes to the workers
pub trait Shard: Send {
    /// Apply one operation
    fn apply(&mut self, op: Operation, value: u64) -> OpOutcome;

    /// Number of stored values
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// LIFO stack: `push(v)`, `pop() -> v`
#[derive(Debug, Default)]
pub struct Stack {
    items: Vec<u64>,
}

impl Stack {
    pub fn push(&mut self, value: u64) {
        self.items.push(value);
    }

    pub fn pop(&mut self) -> Option<u64> {
        self.items.pop()
    }
}

/// FIFO queue: `add(v)`, `remove() -> v`
#[derive(Debug, Default)]
pub struct Queue {
    items: VecDeque<u64>,
}

impl Queue {
    pub fn add(&mut self, value: u64) {
        self.items.push_back(value);
    }

    pub fn remove(&mut self) -> Option<u64> {
        self.items.pop_front()
    }
}

/// Singly linked list: `append(v)`, `remove_head() -> v`, `lookup(v)`
#[derive(Debug, Default)]
pub struct LinkedList {
    items: StdLinkedList<u64>,
}

impl LinkedList {
    pub fn append(&mut self, value: u64) {
        self.items.push_back(value);
    }

    pub fn remove_head(&mut self) -> Option<u64> {
        self.items.pop_front()
    }

    pub fn lookup(&self, value: u64) -> bool {
        self.items.contains(&value)
    }
}

#[derive(Debug)]
struct TreeNode {
    value: u64,
    left: Option<Box<TreeNode>>,
    right: Option<Box<TreeNode>>,
}

/// Unbalanced binary search tree holding distinct values
#[derive(Debug, Default)]
pub struct BinarySearchTree {
    root: Option<Box<TreeNode>>,
    len: usize,
}

impl BinarySearchTree {
    /// Insert `value`; duplicates are ignored
    pub fn insert(&mut self, value: u64) {
        let mut slot = &mut self.root;
        while let Some(node) = slot {
            if value == node.value {
                return;
            }
            slot = if value < node.value {
                &mut node.left
            } else {
                &mut node.right
            };
        }
        *slot = Some(Box::new(TreeNode {
            value,
            left: None,
            right: None,
        }));
        self.len += 1;
    }

    pub fn lookup(&self, value: u64) -> bool {
        let mut current = self.root.as_deref();
        while let Some(node) = current {
            if value == node.value {
                return true;
            }
            current = if value < node.value {
                node.left.as_deref()
            } else {
                node.right.as_deref()
            };
        }
        false
    }

    /// Locate `value` and rewrite it in place. Returns whether it was present.
    pub fn update(&mut self, value: u64) -> bool {
        let mut current = self.root.as_deref_mut();
        while let Some(node) = current {
            if value == node.value {
                node.value = value;
                return true;
            }
            current = if value < node.value {
                node.left.as_deref_mut()
            } else {
                node.right.as_deref_mut()
            };
        }
        false
    }

    /// Remove `value`; returns it if it was present
    pub fn remove(&mut self, value: u64) -> Option<u64> {
        let mut slot = &mut self.root;
        while slot.as_ref().is_some_and(|node| node.value != value) {
            let node = slot.as_mut()?;
            slot = if value < node.value {
                &mut node.left
            } else {
                &mut node.right
            };
        }

        let mut node = slot.take()?;
        *slot = match (node.left.take(), node.right.take()) {
            (None, None) => None,
            (Some(child), None) | (None, Some(child)) => Some(child),
            (Some(left), Some(right)) => {
                // Replace with the in-order successor
                let mut right = Some(right);
                take_min(&mut right).map(|successor| {
                    Box::new(TreeNode {
                        value: successor,
                        left: Some(left),
                        right,
                    })
                })
            }
        };
        self.len -= 1;
        Some(node.value)
    }
}

/// Detach the smallest node of a subtree and return its value
fn take_min(slot: &mut Option<Box<TreeNode>>) -> Option<u64> {
    let mut slot = slot;
    while slot.as_ref()?.left.is_some() {
        let node = slot.as_mut()?;
        slot = &mut node.left;
    }
    let mut min = slot.take()?;
    *slot = min.right.take();
    Some(min.value)
}

impl Drop for BinarySearchTree {
    fn drop(&mut self) {
        // Iterative teardown so degenerate (list-shaped) trees cannot overflow the stack
        let mut pending: Vec<Box<TreeNode>> = self.root.take().into_iter().collect();
        while let Some(mut node) = pending.pop() {
            pending.extend(node.left.take());
            pending.extend(node.right.take());
        }
    }
}

/// One shard instance of any supported kind
#[derive(Debug)]
pub enum Container {
    Stack(Stack),
    Queue(Queue),
    Bst(BinarySearchTree),
    LinkedList(LinkedList),
}

impl Container {
    /// Empty container of the requested kind
    pub fn new(kind: StructureKind) -> Self {
        match kind {
            StructureKind::Stack => Container::Stack(Stack::default()),
            StructureKind::Queue => Container::Queue(Queue::default()),
            StructureKind::Bst => Container::Bst(BinarySearchTree::default()),
            StructureKind::LinkedList => Container::LinkedList(LinkedList::default()),
        }
    }

    pub fn kind(&self) -> StructureKind {
        match self {
            Container::Stack(_) => StructureKind::Stack,
            Container::Queue(_) => StructureKind::Queue,
            Container::Bst(_) => StructureKind::Bst,
            Container::LinkedList(_) => StructureKind::LinkedList,
        }
    }
}

impl Shard for Container {
    fn apply(&mut self, op: Operation, value: u64) -> OpOutcome {
        match (self, op) {
            (Container::Stack(s), Operation::Insert) => {
                s.push(value);
                OpOutcome::Inserted
            }
            (Container::Stack(s), Operation::Remove) => OpOutcome::Removed(s.pop()),

            (Container::Queue(q), Operation::Insert) => {
                q.add(value);
                OpOutcome::Inserted
            }
            (Container::Queue(q), Operation::Remove) => OpOutcome::Removed(q.remove()),

            (Container::LinkedList(l), Operation::Insert) => {
                l.append(value);
                OpOutcome::Inserted
            }
            (Container::LinkedList(l), Operation::Remove) => OpOutcome::Removed(l.remove_head()),
            (Container::LinkedList(l), Operation::Lookup) => OpOutcome::Found(l.lookup(value)),

            (Container::Bst(t), Operation::Insert) => {
                t.insert(value);
                OpOutcome::Inserted
            }
            (Container::Bst(t), Operation::Remove) => OpOutcome::Removed(t.remove(value)),
            (Container::Bst(t), Operation::Lookup) => OpOutcome::Found(t.lookup(value)),
            (Container::Bst(t), Operation::Update) => OpOutcome::Found(t.update(value)),

            (Container::Stack(_) | Container::Queue(_), Operation::Lookup | Operation::Update)
            | (Container::LinkedList(_), Operation::Update) => OpOutcome::Unsupported,
        }
    }

    fn len(&self) -> usize {
        match self {
            Container::Stack(s) => s.items.len(),
            Container::Queue(q) => q.items.len(),
            Container::Bst(t) => t.len,
            Container::LinkedList(l) => l.items.len(),
        }
    }
}
