pub mod bot;

pub use bot::BotApiClient;
