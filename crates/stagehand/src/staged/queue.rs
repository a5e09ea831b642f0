use std::fmt;
use std::sync::Arc;

use crate::staged::action::ConnectionAction;

/// Immutable FIFO of remaining workflow actions.
///
/// Popping shares the backing slice and moves an offset, so every queue ever
/// handed out keeps its own view.
#[derive(Clone)]
pub struct ActionQueue {
    actions: Arc<[ConnectionAction]>,
    head: usize,
}

impl ActionQueue {
    pub fn empty() -> Self {
        Self::from(Vec::new())
    }

    pub fn peek(&self) -> Option<ConnectionAction> {
        self.actions.get(self.head).copied()
    }

    /// The queue without its head, or `None` when already empty.
    pub fn pop(&self) -> Option<ActionQueue> {
        if self.is_empty() {
            return None;
        }
        Some(Self {
            actions: Arc::clone(&self.actions),
            head: self.head + 1,
        })
    }

    pub fn len(&self) -> usize {
        self.actions.len() - self.head
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = ConnectionAction> + '_ {
        self.actions[self.head..].iter().copied()
    }
}

impl Default for ActionQueue {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Vec<ConnectionAction>> for ActionQueue {
    fn from(actions: Vec<ConnectionAction>) -> Self {
        Self {
            actions: actions.into(),
            head: 0,
        }
    }
}

impl<const N: usize> From<[ConnectionAction; N]> for ActionQueue {
    fn from(actions: [ConnectionAction; N]) -> Self {
        Self::from(actions.to_vec())
    }
}

impl FromIterator<ConnectionAction> for ActionQueue {
    fn from_iter<I: IntoIterator<Item = ConnectionAction>>(iter: I) -> Self {
        Self::from(iter.into_iter().collect::<Vec<_>>())
    }
}

impl PartialEq for ActionQueue {
    fn eq(&self, other: &Self) -> bool {
        self.iter().eq(other.iter())
    }
}

impl Eq for ActionQueue {}

impl fmt::Debug for ActionQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}
