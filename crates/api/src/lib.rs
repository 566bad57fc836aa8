//! HTTP service for Quote Desk: configuration, middleware, routes, outbound
//! channels and background jobs around the domain services.

pub mod app;
pub mod config;
pub mod error;
pub mod extractors;
pub mod jobs;
pub mod middleware;
pub mod routes;
pub mod services;
