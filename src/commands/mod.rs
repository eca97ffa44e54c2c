//! Command-line front end
//!
//! [`parser`] defines the `pgfunc` argument grammar with clap; [`handlers`]
//! runs a parsed [`Command`] against the profile store and the database.

pub mod handlers;
pub mod parser;

pub use handlers::{Context, execute};
pub use parser::{Cli, Command, ConnectionsCommand, ProfileArgs, RulesCommand};
