//! In-memory to-do storage and the two list operations.

use crate::error::ValidationError;
use crate::models::TodoItem;
use parking_lot::RwLock;
use tracing::debug;

/// Storage for to-do items, injected into the router state.
pub trait TodoStore: Send + Sync {
    /// Append an item. No deduplication.
    fn add(&self, item: TodoItem);

    /// Items owned by `owner`, in no particular order.
    fn list_for(&self, owner: &str) -> Vec<TodoItem>;

    /// Total number of stored items across all owners.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-lifetime store. Items are gone when the service restarts.
#[derive(Debug, Default)]
pub struct InMemoryTodoStore {
    items: RwLock<Vec<TodoItem>>,
}

impl InMemoryTodoStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TodoStore for InMemoryTodoStore {
    fn add(&self, item: TodoItem) {
        self.items.write().push(item);
    }

    fn list_for(&self, owner: &str) -> Vec<TodoItem> {
        self.items
            .read()
            .iter()
            .filter(|item| item.owner == owner)
            .cloned()
            .collect()
    }

    fn len(&self) -> usize {
        self.items.read().len()
    }
}

/// Items belonging to `subject`.
pub fn list(store: &dyn TodoStore, subject: &str) -> Vec<TodoItem> {
    store.list_for(subject)
}

/// Add an item for `subject`. Whitespace-only titles are rejected and leave the store unchanged.
pub fn create(store: &dyn TodoStore, subject: &str, title: &str) -> Result<(), ValidationError> {
    if title.trim().is_empty() {
        return Err(ValidationError::EmptyTitle);
    }

    store.add(TodoItem {
        title: title.to_string(),
        owner: subject.to_string(),
    });
    debug!("Stored item for {}", subject);
    Ok(())
}
