pub mod cooldown;
pub mod handlers;
pub mod parser;
pub mod types;

pub use cooldown::CooldownTracker;
pub use handlers::CommandHandler;
pub use parser::parse_command;
pub use types::{Command, CommandContext, CommandResult};
