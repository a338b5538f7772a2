//! Pipeline stages: collect → detect → dispatch.
//!
//! The collector appends snapshots to the store, the detector flags games
//! whose lines moved, and the dispatcher asks the analyst about each
//! flagged game and writes the recommendation back.

pub mod collector;
pub mod detector;
pub mod dispatcher;
