mod debounce;
mod handlers;
pub mod indexing;
mod state;

pub use indexing::{BackgroundIndexer, apply_worker_message};
pub use state::{Backend, BackendOptions};
