//! Reply delivery: turn orchestration, paced display and playback sync.

pub mod coordinator;
pub mod delivery;
pub mod display;

pub use coordinator::{TurnOutcome, TurnPipeline};
pub use delivery::{DeliveryReport, DeliverySynchronizer};
pub use display::{TerminalSink, TextSink};
