mod candidate_feed_impl;
mod connection_service_impl;
mod directory_impl;
mod relationship_watch_impl;

pub use candidate_feed_impl::*;
pub use connection_service_impl::*;
pub use directory_impl::*;
pub use relationship_watch_impl::*;
