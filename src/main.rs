use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use fedimirror::app::AppContext;
use fedimirror::cli::{commands, Cli, Commands};
use fedimirror::config::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("fedimirror=info,tower_http=info")),
        )
        .init();

    let cli = Cli::parse();

    if let Commands::Id {
        account,
        source,
        foreign_id,
    } = cli.command
    {
        commands::print_id(account, source, foreign_id);
        return Ok(());
    }

    let settings = Settings::load(cli.config.as_deref())?;
    let ctx = AppContext::new(settings)?;

    match cli.command {
        Commands::Serve => {
            commands::serve(&ctx).await?;
        }
        Commands::Harvest => {
            commands::harvest_once(&ctx).await?;
        }
        Commands::List { username, limit } => {
            commands::list_posts(&ctx, &username, limit)?;
        }
        Commands::Id { .. } => {}
    }

    Ok(())
}
