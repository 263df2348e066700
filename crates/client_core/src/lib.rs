//! Client-side logic of the sandbox: form state, submission, and
//! confirmation tracking over the server's event relay.

pub mod api;
pub mod app;
pub mod forms;
pub mod trigger;
pub mod watcher;

pub use api::{PostResponse, SandboxApi};
pub use app::AppState;
pub use forms::{ActiveForm, FormKind, MissingFields, Payload};
pub use trigger::{Notification, SubmissionTrigger, SubmitError, SubmitOutcome, TriggerStatus};
pub use watcher::{AwaitedEvent, Confirmation, EventWatcher, WatchError};
