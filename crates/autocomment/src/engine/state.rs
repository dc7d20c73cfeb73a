use std::cell::Cell;
use std::rc::Rc;

use rand::Rng;
use rand::seq::IndexedRandom;

/// Global engine state. Lives on the loop thread only.
#[derive(Debug, Default)]
pub struct EngineState {
    enabled: Cell<bool>,
}

impl EngineState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.get()
    }

    pub(crate) fn set_enabled(&self, enabled: bool) {
        self.enabled.set(enabled);
    }
}

/// Immutable snapshot of the comment pool taken when the engine starts.
#[derive(Debug, Clone, Default)]
pub struct CommentPool(Rc<[String]>);

impl CommentPool {
    pub fn snapshot(comments: impl Into<Vec<String>>) -> Self {
        Self(Rc::from(comments.into()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Pick one comment uniformly at random, with replacement.
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&str> {
        self.0.choose(rng).map(String::as_str)
    }
}
