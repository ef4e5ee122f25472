pub mod backend;
pub mod scheduler;
pub mod sync;
pub mod view;

pub use backend::SyncBackend;
pub use scheduler::RefetchScheduler;
pub use sync::{ConversationSync, SyncSnapshot, FETCH_THROTTLE, REFETCH_DELAY};
pub use view::ConversationView;
