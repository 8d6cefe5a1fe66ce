//! Backend for a Tableau Pulse dashboard.
//!
//! Serves connected-app assertions and embed settings to the browser, and
//! turns a Pulse metric into a table of its underlying rows through the
//! Tableau REST API and the VizQL Data Service.

pub mod auth;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod query;
pub mod routes;
pub mod tableau;

pub use config::{AppConfig, ServiceIdentity};
pub use error::{BridgeError, BridgeResult};
pub use routes::{build_router, AppState};
