mod batch;
mod dispatcher;

pub use batch::{Scheduler, SchedulerConfig};
pub use dispatcher::Dispatcher;
