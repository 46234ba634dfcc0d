mod compose;
mod error;
mod server;

pub use compose::{DONE_FRAME, GENERATION_FAILED_MESSAGE, OutboundEvent, StreamComposer};
pub use error::{ApiError, INTERNAL_ERROR_MESSAGE};
pub use server::{AppState, RelayServer, create_router};
