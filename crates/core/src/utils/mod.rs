pub mod clock;
pub mod parse;

pub use clock::{Clock, ManualClock, SystemClock};
