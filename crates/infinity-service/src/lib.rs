//! Infinity service
//!
//! Stateless HTTP page dispatcher for the iterated-learning experiment.
//! Every request carries the run key and the remaining presentation map;
//! the service answers with the page to render and the fields for the next
//! request. Also hosts the operator subcommands of `infinityd`.

#![deny(unsafe_code)]

pub mod api;
pub mod config;
pub mod error;
pub mod payload;
pub mod server;

pub use api::create_router;
pub use config::ServiceConfig;
pub use error::{ApiError, ApiResult, ServiceError, ServiceResult};
pub use payload::PagePayload;
pub use server::Server;
