//! Middleware module - Request admission ahead of the handlers

pub mod rate_limit;
