use std::sync::Arc;

use anyhow::Result;
use bot::{Data, command, config::Config, discord::DiscordSender, logging};
use chrono::Utc;
use poise::{Framework, FrameworkOptions};
use serenity::all::{ClientBuilder, FullEvent, GatewayIntents};
use stock::{
    AlpacaProvider, CommandHandler, Formatter, NotificationScheduler, PriceLookup,
    SubscriptionStore,
};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let log_dir = logging::log_dir();
    let _log_guard = logging::init(&log_dir)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        log_dir = %log_dir.display(),
        "starting stockbot"
    );

    let config = Config::from_env()?;
    let formatter = Formatter::new(config.display_tz);

    let store = Arc::new(SubscriptionStore::from_env().await?);
    let lookup = Arc::new(PriceLookup::new(Arc::new(AlpacaProvider::from_env()?)));
    let commands = Arc::new(
        CommandHandler::new(Arc::clone(&store), Arc::clone(&lookup))
            .with_formatter(formatter)
            .with_check_cooldown(config.check_cooldown),
    );

    let framework = Framework::builder()
        .options(FrameworkOptions {
            event_handler: |serenity_ctx, event, _framework_ctx, data| {
                Box::pin(async move {
                    if let FullEvent::Message { new_message } = event
                        && !new_message.author.bot
                        && new_message.guild_id.is_none()
                        && new_message.content.starts_with('/')
                    {
                        command::handle_text_message(serenity_ctx, data, new_message).await;
                    }
                    Ok(())
                })
            },
            commands: command::all(),
            ..Default::default()
        })
        .setup({
            let commands = Arc::clone(&commands);

            move |ctx, ready, framework| {
                Box::pin(async move {
                    info!(
                        "{} [{}] connected successfully!",
                        ready.user.name, ready.user.id
                    );

                    poise::builtins::register_globally(ctx, &framework.options().commands).await?;

                    Ok(Data { commands })
                })
            }
        })
        .build();

    let mut client = ClientBuilder::new(&config.discord_token, GatewayIntents::non_privileged())
        .framework(framework)
        .await?;

    let sender = Arc::new(DiscordSender::new(client.http.clone()));
    let notifier = Arc::new(
        NotificationScheduler::new(Arc::clone(&store), Arc::clone(&lookup), sender)
            .with_formatter(formatter),
    );

    let mut sched = JobScheduler::new().await?;
    let notifier_job = Arc::clone(&notifier);

    sched
        .add(Job::new_repeated_async(
            config.tick_interval,
            move |_uuid, _l| {
                let notifier = Arc::clone(&notifier_job);

                Box::pin(async move {
                    let report = notifier.run_tick(Utc::now()).await;
                    if report.failed_sends > 0 {
                        warn!(failed_sends = report.failed_sends, "some notifications were not delivered");
                    }
                })
            },
        )?)
        .await?;

    sched.start().await?;
    info!(every = ?config.tick_interval, "notification scheduler started");

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(why) = client.start().await {
            error!("Client error: {why:?}");
        }
    });

    shutdown_signal().await?;
    info!("shutdown requested");

    notifier.shutdown().await;
    sched.shutdown().await?;
    shard_manager.shutdown_all().await;
    store.flush().await?;

    info!("Shutdown complete.");
    Ok(())
}

async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::{
            select,
            signal::unix::{SignalKind, signal},
        };
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        select! {
            _ = sigterm.recv() => {},
            _ = sigint.recv()  => {},
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }

    Ok(())
}
