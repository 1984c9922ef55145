pub mod models;
pub mod service;

pub use models::*;
pub use service::{AppState, CORRELATION_ID_HEADER, build_router, correlation_id_middleware};
