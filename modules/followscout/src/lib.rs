pub mod control;
pub mod display;
pub mod embedded;
pub mod harvester;
pub mod membership;
pub mod queue;
pub mod resolver;
pub mod scheduler;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;

pub use control::{RunControl, RunState};
pub use display::{DisplayPort, DisplayUpdate, Reporter, TracingDisplay};
pub use scheduler::{RunEnd, RunSummary};
pub use session::{Command, CommandSender, FollowScout, QueuedCommand, ScanEnd, ScanReport};
pub use traits::SocialGraphService;
