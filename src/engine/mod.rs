//! Location-driven restroom resolution engine.
//!
//! Turns raw geolocation fixes or manual campus/building/floor picks into
//! concrete restroom recommendations. The engine runs as a single Embassy
//! task; the UI collaborator talks to it exclusively over the command and
//! event channels defined in `types`.
//!
//! ## Module Organization
//!
//! - `types`: Fix, command/event vocabulary, channel aliases
//! - `selection`: the user's current campus/building/floor/restroom choice
//! - `proximity`: per-building entry detection with debounce
//! - `resolver`: candidate search and deterministic tie-breaking
//! - `watch`: location watch subscription and first-fix timeout
//! - `engine_task`: the event loop tying everything together
//!
//! ## Public API
//!
//! The main entry point is `engine_task`, spawned by the Embassy executor.

pub mod engine_task;
pub mod proximity;
pub mod resolver;
pub mod selection;
pub mod types;
pub mod watch;

pub use engine_task::engine_task;
pub use types::{EngineCommand, EngineEvent, Fix, RankedRestroom};
