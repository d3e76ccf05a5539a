//! Read API over the state store plus the metrics endpoint
//!
//! Thin by design: every route is a snapshot read (absent data answers 404
//! with an empty JSON object, never a 5xx), except the test-injection route
//! that feeds a rogue-address batch straight into the remediation queue.

pub mod handlers;
pub mod routes;

pub use handlers::AppState;
pub use routes::create_router;
