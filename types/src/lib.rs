pub mod audio;
pub mod content;
pub mod events;
pub mod plan;
pub mod tools;

pub use content::{Blob, Content, Part};
pub use events::{ClientEvent, ServerEvent};
pub use plan::{Priority, Status, Subtask, Task};
pub use tools::FunctionDeclaration;
