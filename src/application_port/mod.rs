mod candidate_feed;
mod connection_service;
mod relationship_watch;

pub use candidate_feed::*;
pub use connection_service::*;
pub use relationship_watch::*;
