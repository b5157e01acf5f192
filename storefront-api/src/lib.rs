//! # Storefront API Server Library
//!
//! This library provides the HTTP edge of the storefront backend: rate
//! limiting, security headers, CORS and health checks around the resource
//! routes, plus access to the shared response cache through [`app::AppState`].
//!
//! ## Modules
//!
//! - `app`: Application state and router builder
//! - `config`: Configuration management
//! - `error`: Error handling and HTTP response mapping
//! - `middleware`: Rate limiting and security headers
//! - `routes`: Health check handler

pub mod app;
pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
