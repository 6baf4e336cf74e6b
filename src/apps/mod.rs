//! Recognized companion applications
//!
//! [`feed`] fetches the list published by the companion app; [`registry`] keeps
//! the resulting set in the store along with what was learned per member.

pub mod feed;
pub mod registry;

pub use feed::{ApplicationFeed, FeedDocument, HttpFeed};
pub use registry::{
    AppRegistry, KnownApplications, LearnOutcome, PruneReport, RetentionPolicy, UserApp,
    UserAppCache,
};
