//! Error types for the pub-sub module.

#[derive(thiserror::Error, Debug)]
/// Error
pub enum Error {
    /// Subscription requested no topic
    #[error("Subscription has no topics")]
    NoTopics,

    /// Manager has been closed
    #[error("Pubsub is closed")]
    Closed,
}
