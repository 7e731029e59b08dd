//! Observable values with synchronous change notification.
mod signal;
mod subscription;

pub use signal::Signal;
pub use subscription::{SubscriberId, Subscription};
