use super::respond;
use crate::{Context, Error};

/// Current price of one ticker, or of every subscription
#[poise::command(slash_command)]
pub async fn check(
    ctx: Context<'_>,
    #[description = "Ticker symbol, or \"all\" for your subscriptions"] symbol: Option<String>,
) -> Result<(), Error> {
    respond(ctx, "check", symbol.into_iter().collect()).await
}
