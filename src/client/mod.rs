//! To-do list client: service calls and the signed-in session.

pub mod session;
pub mod todo_client;

pub use session::{SignInOutcome, TodoSession};
pub use todo_client::TodoListClient;
