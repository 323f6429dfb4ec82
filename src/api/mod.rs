//! API module - HTTP routes, handlers and request schema

pub mod handlers;
pub mod routes;
pub mod schemas;
