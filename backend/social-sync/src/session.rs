//! Per-session shared state
//!
//! Holds the post list, the edge set and the loaded comment forests.
//! Constructed once per signed-in session and torn down on logout; every
//! component takes it as a dependency. Observers subscribe to a broadcast
//! of [`SessionEvent`]s. A view that goes away just drops its receiver:
//! the shared cache keeps being updated, nothing is delivered to it.

use crate::domain::{Comment, EdgeKey, Post, Relation};
use crate::services::comment_forest::CommentForest;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

const EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    PostsReplaced,
    PostChanged(Uuid),
    EdgeChanged { key: EdgeKey, present: bool },
    /// Comment forest of the given post changed
    ThreadChanged(Uuid),
    Closed,
}

#[derive(Default)]
struct SessionState {
    posts: Vec<Post>,
    edges: HashSet<EdgeKey>,
    threads: HashMap<Uuid, CommentForest>,
    closed: bool,
}

impl SessionState {
    fn adjust_like_count(&mut self, key: &EdgeKey, delta: i64) -> Option<SessionEvent> {
        match key.relation {
            Relation::Like => {
                let post = self.posts.iter_mut().find(|p| p.id == key.object)?;
                post.like_count = (post.like_count + delta).max(0);
                Some(SessionEvent::PostChanged(post.id))
            }
            Relation::CommentLike => {
                let (post_id, comment) = self
                    .threads
                    .iter_mut()
                    .find_map(|(post_id, forest)| forest.get_mut(&key.object).map(|c| (*post_id, c)))?;
                comment.like_count = (comment.like_count + delta).max(0);
                Some(SessionEvent::ThreadChanged(post_id))
            }
            Relation::Follow => None,
        }
    }
}

pub struct SessionStore {
    state: RwLock<SessionState>,
    events: broadcast::Sender<SessionEvent>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            state: RwLock::new(SessionState::default()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: SessionEvent) {
        // No subscriber is not an error
        let _ = self.events.send(event);
    }

    pub fn is_open(&self) -> bool {
        !self.state.read().closed
    }

    /// Drop everything and refuse further writes. Mutations still in flight
    /// complete against the remote store but no longer touch this cache.
    pub fn teardown(&self) {
        {
            let mut state = self.state.write();
            *state = SessionState {
                closed: true,
                ..SessionState::default()
            };
        }
        debug!("Session store torn down");
        self.emit(SessionEvent::Closed);
    }

    // ========== Posts ==========

    pub fn replace_posts(&self, posts: Vec<Post>) {
        {
            let mut state = self.state.write();
            if state.closed {
                return;
            }
            state.posts = posts;
        }
        self.emit(SessionEvent::PostsReplaced);
    }

    pub fn prepend_post(&self, post: Post) {
        let id = post.id;
        {
            let mut state = self.state.write();
            if state.closed {
                return;
            }
            state.posts.retain(|p| p.id != id);
            state.posts.insert(0, post);
        }
        self.emit(SessionEvent::PostChanged(id));
    }

    pub fn posts(&self) -> Vec<Post> {
        self.state.read().posts.clone()
    }

    pub fn post(&self, id: &Uuid) -> Option<Post> {
        self.state.read().posts.iter().find(|p| p.id == *id).cloned()
    }

    pub fn adjust_comment_count(&self, post_id: &Uuid, delta: i64) {
        let changed = {
            let mut state = self.state.write();
            if state.closed {
                return;
            }
            match state.posts.iter_mut().find(|p| p.id == *post_id) {
                Some(post) => {
                    post.comment_count = (post.comment_count + delta).max(0);
                    true
                }
                None => false,
            }
        };
        if changed {
            self.emit(SessionEvent::PostChanged(*post_id));
        }
    }

    // ========== Edges ==========

    pub fn has_edge(&self, key: &EdgeKey) -> bool {
        self.state.read().edges.contains(key)
    }

    /// Set edge presence. When the state actually flips, the cached like
    /// count of the post or comment moves by one. Returns whether it flipped.
    pub fn set_edge(&self, key: &EdgeKey, present: bool) -> bool {
        let mut events = Vec::with_capacity(2);
        {
            let mut state = self.state.write();
            if state.closed {
                return false;
            }
            let flipped = if present {
                state.edges.insert(*key)
            } else {
                state.edges.remove(key)
            };
            if !flipped {
                return false;
            }
            events.push(SessionEvent::EdgeChanged { key: *key, present });
            if let Some(event) = state.adjust_like_count(key, if present { 1 } else { -1 }) {
                events.push(event);
            }
        }
        for event in events {
            self.emit(event);
        }
        true
    }

    /// Replace the cached edges of `relation` leaving `subject` with `objects`.
    /// Keys for which `keep` returns true are left untouched.
    pub fn seed_objects(
        &self,
        relation: Relation,
        subject: Uuid,
        objects: &[Uuid],
        keep: impl Fn(&EdgeKey) -> bool,
    ) {
        let mut state = self.state.write();
        if state.closed {
            return;
        }
        state
            .edges
            .retain(|k| !(k.relation == relation && k.subject == subject) || keep(k));
        for object in objects {
            let key = EdgeKey::new(relation, subject, *object);
            if !keep(&key) {
                state.edges.insert(key);
            }
        }
    }

    /// Replace the cached edges of `relation` pointing at `object` with `subjects`.
    pub fn seed_subjects(
        &self,
        relation: Relation,
        object: Uuid,
        subjects: &[Uuid],
        keep: impl Fn(&EdgeKey) -> bool,
    ) {
        let mut state = self.state.write();
        if state.closed {
            return;
        }
        state
            .edges
            .retain(|k| !(k.relation == relation && k.object == object) || keep(k));
        for subject in subjects {
            let key = EdgeKey::new(relation, *subject, object);
            if !keep(&key) {
                state.edges.insert(key);
            }
        }
    }

    /// e.g. the users `subject` follows
    pub fn objects_of(&self, relation: Relation, subject: Uuid) -> Vec<Uuid> {
        self.state
            .read()
            .edges
            .iter()
            .filter(|k| k.relation == relation && k.subject == subject)
            .map(|k| k.object)
            .collect()
    }

    /// e.g. the followers of `object`
    pub fn subjects_of(&self, relation: Relation, object: Uuid) -> Vec<Uuid> {
        self.state
            .read()
            .edges
            .iter()
            .filter(|k| k.relation == relation && k.object == object)
            .map(|k| k.subject)
            .collect()
    }

    /// Forget cached edges pointing at any of `objects` (e.g. deleted comments)
    pub fn forget_edges_to(&self, relation: Relation, objects: &[Uuid]) {
        let mut state = self.state.write();
        state
            .edges
            .retain(|k| k.relation != relation || !objects.contains(&k.object));
    }

    // ========== Comment threads ==========

    pub fn replace_thread(&self, post_id: Uuid, forest: CommentForest) {
        {
            let mut state = self.state.write();
            if state.closed {
                return;
            }
            state.threads.insert(post_id, forest);
        }
        self.emit(SessionEvent::ThreadChanged(post_id));
    }

    pub fn with_thread<R>(&self, post_id: &Uuid, f: impl FnOnce(&CommentForest) -> R) -> Option<R> {
        self.state.read().threads.get(post_id).map(f)
    }

    /// Mutate a post's forest, creating an empty one if none is loaded.
    /// Returns None after teardown.
    pub fn with_thread_mut<R>(
        &self,
        post_id: Uuid,
        f: impl FnOnce(&mut CommentForest) -> R,
    ) -> Option<R> {
        let result = {
            let mut state = self.state.write();
            if state.closed {
                return None;
            }
            f(state.threads.entry(post_id).or_default())
        };
        self.emit(SessionEvent::ThreadChanged(post_id));
        Some(result)
    }

    pub fn find_comment(&self, comment_id: &Uuid) -> Option<Comment> {
        self.state
            .read()
            .threads
            .values()
            .find_map(|forest| forest.get(comment_id).cloned())
    }
}
