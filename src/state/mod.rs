//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `RequestState`: Tracks the state of individual crawl requests (queued,
//!   processing, processed, aborted, etc.)

mod request_state;

pub use request_state::RequestState;
