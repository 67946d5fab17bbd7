pub mod backend;
pub mod chat;
pub mod config;
pub mod error;
pub mod http_client;
pub mod model;
pub mod normalize;
pub mod render;
pub mod session;
pub mod sse;
pub mod strategy;
pub mod telemetry;
