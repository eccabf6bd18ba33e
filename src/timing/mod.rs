mod clock;
mod key_timeline;
mod live_loop;

pub use clock::{TickClock, ticks_to_duration};
pub use key_timeline::KeyTimeline;
pub use live_loop::{DEFAULT_STOP_TIMEOUT, LiveLoop, LoopSettings};
