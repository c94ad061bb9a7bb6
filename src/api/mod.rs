//! HTTP surface for the three services.
//!
//! `narrative_router`, `diagram_router` and `builder_router` each return a
//! self-contained `Router`; `server::start_service` binds and serves one.

pub mod endpoints;
pub mod error;
pub mod router;
pub mod server;
pub mod types;

pub use error::ApiError;
pub use router::{builder_router, diagram_router, narrative_router};
pub use server::{start_service, ServiceHandle, ServiceSession};
pub use types::{BuilderContext, DiagramContext, NarrativeContext};
