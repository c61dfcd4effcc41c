//! To-do item types shared by the client and the service.

use serde::{Deserialize, Serialize};

/// A stored to-do item.
///
/// `owner` is the subject claim of the token that created the item. It is
/// never taken from a request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoItem {
    pub title: String,
    pub owner: String,
}

/// Item as returned by `GET /api/todolist`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TodoItemView {
    pub title: String,
}

impl From<&TodoItem> for TodoItemView {
    fn from(item: &TodoItem) -> Self {
        Self {
            title: item.title.clone(),
        }
    }
}

/// Body of `POST /api/todolist`, JSON or form encoded.
///
/// Unknown fields, including any `Owner`, are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NewTodoItem {
    #[serde(default)]
    pub title: String,
}
