//! LearnCrafter: asynchronous course publishing
//!
//! Accepts a course outline (course, modules, concepts), generates each concept's content
//! through a completion provider, validates it, and persists the result in order while a
//! job record reports progress and per-entity errors.

pub mod cli;
pub mod config;
pub mod course;
pub mod error;
pub mod generator;
pub mod http;
pub mod job;
pub mod logging;
pub mod orchestrator;
pub mod planner;
pub mod provider;
pub mod publisher;
pub mod retry;
pub mod server;
pub mod store;
pub mod types;
pub mod validator;
pub mod workflow;

pub use error::PublishError;
pub use publisher::CoursePublisher;
