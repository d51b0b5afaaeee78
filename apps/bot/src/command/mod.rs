mod quote;
mod subscription;

use poise::serenity_prelude as serenity;
use tracing::{info, warn};

use crate::discord::split_message;
use crate::{Context, Data, Error};
use quote::check;
use subscription::{frequency, help, list, start, subscribe, unsubscribe, updatestocks};

/// Every slash command the bot registers.
pub fn all() -> Vec<poise::Command<Data, Error>> {
    vec![
        start(),
        help(),
        subscribe(),
        unsubscribe(),
        check(),
        list(),
        frequency(),
        updatestocks(),
    ]
}

/// Run a slash command through the shared handler and post the reply.
async fn respond(ctx: Context<'_>, name: &str, args: Vec<String>) -> Result<(), Error> {
    ctx.defer().await?;

    let user_id = ctx.author().id.get();
    info!(user_id, command = name, "slash command");

    let reply = ctx.data().commands.handle_args(user_id, name, args).await;
    for chunk in split_message(&reply) {
        ctx.say(chunk).await?;
    }

    Ok(())
}

/// Text protocol for direct messages, e.g. `/subscribe AAPL`.
pub async fn handle_text_message(ctx: &serenity::Context, data: &Data, msg: &serenity::Message) {
    let user_id = msg.author.id.get();
    info!(user_id, text = %msg.content, "text command");

    let reply = data.commands.handle(user_id, &msg.content).await;
    for chunk in split_message(&reply) {
        if let Err(e) = msg.channel_id.say(ctx, chunk).await {
            warn!(user_id, error = ?e, "reply failed");
            break;
        }
    }
}
