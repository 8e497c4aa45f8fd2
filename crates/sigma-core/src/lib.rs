//! Core component model for Sigma: stateful template-rendered components,
//! an exact-match request dispatcher, and the server-push stream loop.

mod cancel;
mod component;
mod context;
mod dispatcher;
mod error;
pub mod handlers;
mod response;
mod stream;
pub mod template;

pub use cancel::{CancelSignal, Canceller, cancellation};
pub use component::{Component, NAME_KEY, UpdateHook};
pub use context::{Context, Request};
pub use dispatcher::{Handler, Sigma};
pub use error::{CallbackFault, RenderError, SigmaError};
pub use handlers::{debug_state, render_component, update_component};
pub use response::{RecordedResponse, ResponseRecorder, ResponseWriter};
pub use stream::{
    DEFAULT_PUSH_INTERVAL, IntervalTicks, MIN_PUSH_INTERVAL, PushStream, StreamState,
    StreamSummary, TickSource, push_stream,
};

/// Result type for Sigma operations.
pub type Result<T> = std::result::Result<T, SigmaError>;
