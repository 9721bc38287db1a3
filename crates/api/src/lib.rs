//! HTTP API: admin routes over the extraction job lifecycle.

pub mod app;
pub mod middleware;
