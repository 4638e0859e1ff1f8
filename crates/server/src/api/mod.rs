pub mod association;
pub mod batch;
pub mod handlers;
pub mod jobs;
pub mod library;
pub mod middleware;
pub mod routes;

pub use routes::create_router;
