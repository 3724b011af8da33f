pub mod accumulator;
pub mod models;
pub mod session;

pub use accumulator::{accumulate, accumulate_all};
pub use models::{Entry, Fragment, Log};
pub use session::{ChatSession, Notification, NotificationLevel, Notifier, Renderer, SubmitOutcome};
