//! Host-queued motion: move records, position accounting, and the
//! pulse scheduler

pub mod move_queue;
pub mod position;
pub mod stepper;

pub use move_queue::{Move, MoveQueue, MOVE_QUEUE_DEPTH};
pub use position::{BiasedPosition, POSITION_BIAS};
pub use stepper::{Mode, Stepper};
