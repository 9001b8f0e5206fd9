pub mod cli;
pub mod manifest;

pub use cli::{Cli, Commands, InputArgs, TableFormat};
