use super::respond;
use crate::{Context, Error};

/// Register and show what the bot can do
#[poise::command(slash_command)]
pub async fn start(ctx: Context<'_>) -> Result<(), Error> {
    respond(ctx, "start", vec![]).await
}

/// List the available commands
#[poise::command(slash_command)]
pub async fn help(ctx: Context<'_>) -> Result<(), Error> {
    respond(ctx, "help", vec![]).await
}

/// Follow a stock in your scheduled updates
#[poise::command(slash_command)]
pub async fn subscribe(
    ctx: Context<'_>,
    #[description = "Ticker symbol (e.g., AAPL)"] symbol: Option<String>,
) -> Result<(), Error> {
    respond(ctx, "subscribe", symbol.into_iter().collect()).await
}

/// Stop following a stock
#[poise::command(slash_command)]
pub async fn unsubscribe(
    ctx: Context<'_>,
    #[description = "Ticker symbol to stop following"] symbol: Option<String>,
) -> Result<(), Error> {
    respond(ctx, "unsubscribe", symbol.into_iter().collect()).await
}

/// Show the stocks you follow
#[poise::command(slash_command)]
pub async fn list(ctx: Context<'_>) -> Result<(), Error> {
    respond(ctx, "list", vec![]).await
}

/// Hours between scheduled updates
#[poise::command(slash_command)]
pub async fn frequency(
    ctx: Context<'_>,
    #[description = "Whole hours, 1 to 24"] hours: Option<String>,
) -> Result<(), Error> {
    respond(ctx, "frequency", hours.into_iter().collect()).await
}

/// Replace the default stock list
#[poise::command(slash_command)]
pub async fn updatestocks(
    ctx: Context<'_>,
    #[description = "Ticker symbols (e.g., TSLA,MSFT)"] symbols: Option<String>,
) -> Result<(), Error> {
    respond(ctx, "updatestocks", symbols.into_iter().collect()).await
}
