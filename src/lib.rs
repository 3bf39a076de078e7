//! Display histogram sampling agent.
//!
//! Collects periodic hardware histogram frames into a bounded,
//! time-ordered ringbuffer and answers windowed and cumulative statistical
//! queries. The ringbuffer keeps a fixed-capacity window of the most recent
//! frames alongside all-time cumulative totals that eviction never touches.

pub mod clock;
pub mod collector;
pub mod config;
pub mod ring;
pub mod source;
