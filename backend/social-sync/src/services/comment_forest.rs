//! Arena-backed comment forest
//!
//! Comments live in a flat arena and refer to each other by slot index.
//! A node is only ever attached under a node allocated before it, so the
//! forest cannot contain a cycle whatever the parent ids in the data say.

use crate::domain::Comment;
use std::cmp::Ordering;
use std::collections::HashMap;
use uuid::Uuid;

pub type NodeId = usize;

#[derive(Debug, Clone)]
struct CommentNode {
    comment: Comment,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// One row of a rendered thread
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadEntry {
    pub depth: usize,
    pub comment: Comment,
}

#[derive(Debug, Clone, Default)]
pub struct CommentForest {
    nodes: Vec<Option<CommentNode>>,
    index: HashMap<Uuid, NodeId>,
    roots: Vec<NodeId>,
}

/// Oldest first; unparsable timestamps after every parsable one
fn by_creation(a: &Comment, b: &Comment) -> Ordering {
    match (a.created_at.parse(), b.created_at.parse()) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

impl CommentForest {
    /// Build the forest for one post from a flat list.
    ///
    /// Roots and children come out oldest-first. A comment whose parent is
    /// absent (or on another post) is promoted to a root instead of dropped.
    pub fn assemble(mut comments: Vec<Comment>) -> Self {
        comments.sort_by(by_creation);

        let mut forest = Self::default();
        for comment in comments {
            if forest.index.contains_key(&comment.id) {
                continue;
            }
            let slot = forest.nodes.len();
            forest.index.insert(comment.id, slot);
            forest.nodes.push(Some(CommentNode {
                comment,
                parent: None,
                children: Vec::new(),
            }));
        }

        for slot in 0..forest.nodes.len() {
            let (parent_id, post_id) = match &forest.nodes[slot] {
                Some(node) => (node.comment.parent_id, node.comment.post_id),
                None => continue,
            };
            let parent_slot = parent_id
                .and_then(|pid| forest.index.get(&pid).copied())
                .filter(|&p| p < slot)
                .filter(|&p| {
                    forest.nodes[p]
                        .as_ref()
                        .map_or(false, |n| n.comment.post_id == post_id)
                });

            match parent_slot {
                Some(p) => {
                    if let Some(parent) = forest.nodes[p].as_mut() {
                        parent.children.push(slot);
                    }
                    if let Some(node) = forest.nodes[slot].as_mut() {
                        node.parent = Some(p);
                    }
                }
                None => forest.roots.push(slot),
            }
        }

        forest
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &Uuid) -> Option<&Comment> {
        self.index
            .get(id)
            .and_then(|&slot| self.nodes[slot].as_ref())
            .map(|node| &node.comment)
    }

    pub fn get_mut(&mut self, id: &Uuid) -> Option<&mut Comment> {
        match self.index.get(id) {
            Some(&slot) => self.nodes[slot].as_mut().map(|node| &mut node.comment),
            None => None,
        }
    }

    fn node(&self, slot: NodeId) -> Option<&CommentNode> {
        self.nodes.get(slot).and_then(Option::as_ref)
    }

    pub fn roots(&self) -> Vec<&Comment> {
        self.roots
            .iter()
            .filter_map(|&slot| self.node(slot))
            .map(|node| &node.comment)
            .collect()
    }

    pub fn children(&self, id: &Uuid) -> Vec<&Comment> {
        self.index
            .get(id)
            .and_then(|&slot| self.node(slot))
            .map(|node| {
                node.children
                    .iter()
                    .filter_map(|&c| self.node(c))
                    .map(|child| &child.comment)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Insert at the front of the parent's child list, or of the roots when
    /// the comment is top-level or its parent is not loaded.
    pub fn insert_front(&mut self, comment: Comment) {
        if self.index.contains_key(&comment.id) {
            return;
        }
        let parent = comment.parent_id.and_then(|pid| self.index.get(&pid).copied());
        let slot = self.nodes.len();
        self.index.insert(comment.id, slot);
        self.nodes.push(Some(CommentNode {
            comment,
            parent,
            children: Vec::new(),
        }));

        match parent.and_then(|p| self.nodes[p].as_mut()) {
            Some(parent) => parent.children.insert(0, slot),
            None => self.roots.insert(0, slot),
        }
    }

    /// Swap the comment stored under `old_id` for `replacement`, keeping its
    /// position in the tree. Returns false when `old_id` is unknown.
    pub fn replace(&mut self, old_id: &Uuid, replacement: Comment) -> bool {
        let slot = match self.index.remove(old_id) {
            Some(slot) => slot,
            None => return false,
        };
        let new_id = replacement.id;
        let children = match self.nodes[slot].as_mut() {
            Some(node) => {
                node.comment = replacement;
                node.children.clone()
            }
            None => return false,
        };
        self.index.insert(new_id, slot);

        for child in children {
            if let Some(node) = self.nodes[child].as_mut() {
                node.comment.parent_id = Some(new_id);
            }
        }
        true
    }

    /// Ids of `id` and all its descendants, pre-order
    pub fn subtree(&self, id: &Uuid) -> Vec<Uuid> {
        let start = match self.index.get(id) {
            Some(&slot) => slot,
            None => return Vec::new(),
        };

        let mut ids = Vec::new();
        let mut stack = vec![start];
        while let Some(slot) = stack.pop() {
            if let Some(node) = self.node(slot) {
                ids.push(node.comment.id);
                stack.extend(node.children.iter().rev());
            }
        }
        ids
    }

    /// Detach and drop `id` with all its descendants; returns what was removed
    pub fn remove_subtree(&mut self, id: &Uuid) -> Vec<Comment> {
        let start = match self.index.get(id) {
            Some(&slot) => slot,
            None => return Vec::new(),
        };

        let parent = self.node(start).and_then(|node| node.parent);
        match parent.and_then(|p| self.nodes[p].as_mut()) {
            Some(parent) => parent.children.retain(|&c| c != start),
            None => self.roots.retain(|&r| r != start),
        }

        let mut removed = Vec::new();
        let mut stack = vec![start];
        while let Some(slot) = stack.pop() {
            if let Some(node) = self.nodes[slot].take() {
                self.index.remove(&node.comment.id);
                stack.extend(node.children.iter().rev());
                removed.push(node.comment);
            }
        }
        removed
    }

    /// Pre-order walk with depth, for rendering
    pub fn flatten(&self) -> Vec<ThreadEntry> {
        let mut entries = Vec::with_capacity(self.len());
        let mut stack: Vec<(NodeId, usize)> = self.roots.iter().rev().map(|&r| (r, 0)).collect();
        while let Some((slot, depth)) = stack.pop() {
            if let Some(node) = self.node(slot) {
                entries.push(ThreadEntry {
                    depth,
                    comment: node.comment.clone(),
                });
                stack.extend(node.children.iter().rev().map(|&c| (c, depth + 1)));
            }
        }
        entries
    }

    /// All live comments in tree order
    pub fn comments(&self) -> Vec<Comment> {
        self.flatten().into_iter().map(|e| e.comment).collect()
    }
}
