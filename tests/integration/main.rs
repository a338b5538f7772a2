//! Integration suite: the collect → detect → dispatch pipeline run
//! against hand-written collaborators and real stores.

mod mock_analyst;
mod mock_feed;
mod pipeline;
