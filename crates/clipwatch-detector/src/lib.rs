//! Chat-spike detector: consumes `chat-messages`, runs the anomaly rule per
//! channel, and drives clip creation for every anomaly (spec.md §4.D/§4.E).

mod engine;

pub use engine::DetectorEngine;
