//! Composition of application routes.

mod routes;

pub use routes::RouteModule;
