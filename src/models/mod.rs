mod call;
mod endpoint;
mod inventory;
mod response;

pub use call::{ApiCall, AttemptError, CallAttempt, CallRecord, Outcome};
pub use endpoint::{EndpointDescriptor, EndpointKey, Method, WILDCARD, normalize_path};
pub use inventory::{Inventory, Provenance};
pub use response::{ApiResponse, Envelope};
