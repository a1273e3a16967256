//! CLI domain: argument parsing and command routing.

mod parse;
mod route;

pub use parse::{Cli, Commands};
pub use route::RunContext;
