// Copyright 2018-2025 the Deno authors. MIT license.

mod execute;
mod history;
mod pipeline;
mod session;
mod types;
mod which;

pub use execute::*;
pub use history::*;
pub use pipeline::*;
pub use session::*;
pub use types::*;
pub use which::CommandPathResolutionError;

#[cfg(test)]
mod test_builder;
