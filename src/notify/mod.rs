//! Unread-notification tracking.

pub mod tracker;

pub use tracker::{advance_cursor, NotificationState, NotificationTracker};
