//! Signed-request client.
//!
//! [`RequestOrchestrator`] drives each logical call through token
//! acquisition, descriptor sync, signing, dispatch, and auth recovery.

mod attempt;
mod cancel;
mod options;
mod orchestrator;

pub use attempt::{AttemptContext, CallState};
pub use cancel::CancelToken;
pub use options::ClientOptions;
pub use orchestrator::{CallHandle, RequestOrchestrator};
