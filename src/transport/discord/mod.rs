pub mod gateway;
pub mod http_client;
pub mod permissions;
pub mod types;

pub use gateway::{DiscordGateway, DiscordGatewayState, GatewayEvent};
pub use http_client::DiscordHttpClient;
