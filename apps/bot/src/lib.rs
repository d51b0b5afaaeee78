use std::sync::Arc;

use stock::CommandHandler;

pub mod command;
pub mod config;
pub mod discord;
pub mod logging;

pub struct Data {
    pub commands: Arc<CommandHandler>,
}

pub type Error = anyhow::Error;
pub type Context<'a> = poise::Context<'a, Data, Error>;
