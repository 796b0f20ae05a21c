//! Job lifecycle: admission, queueing, the synchronous wait wrapper,
//! and terminal completion.

pub mod admission;
pub mod completion;
pub mod queue;
pub mod wait;

pub use completion::CompletionService;
pub use queue::{JobFeed, JobQueue};
pub use wait::wait_for_terminal;
