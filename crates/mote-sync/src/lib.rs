//! # mote-sync — concurrency substrate for mote
//!
//! The two shared mechanisms every mote component leans on:
//!
//! - **[`task`]** — a small worker pool whose submissions return a
//!   cancellable, joinable [`TaskHandle`](task::TaskHandle). Workers poll a
//!   [`CancelToken`](task::CancelToken) cooperatively, so a foreground
//!   caller can always quiesce background work with a bounded wait.
//! - **[`channel`]** — a publish/subscribe [`Channel`](channel::Channel)
//!   used to broadcast change notifications between components without any
//!   ambient global state. Subscribers are held weakly; dropping a
//!   collaborator unregisters it.
//!
//! Nothing in this crate knows about text. It exists so the document engine
//! can depend on "background work" and "notification" as interfaces.

pub mod channel;
pub mod task;

pub use channel::{Channel, Subscriber, SubscriberId};
pub use task::{CancelToken, TaskHandle, TaskPool};
