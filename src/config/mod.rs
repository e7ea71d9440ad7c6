pub mod schema;

pub use schema::{CleanerConfig, CommandsConfig, Config, DiscordConfig, ReliabilityConfig};
