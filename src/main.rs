use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use magpie::cli;
use magpie::node::Node;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse args and env vars
    let args = cli::Cli::parse();
    let default_filter = if args.debug {
        "magpie=debug"
    } else {
        "magpie=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = args.into_settings();
    let node = Node::bind(settings.clone()).await?;

    info!(
        "Starting {} {} on {}",
        cli::APP_NAME,
        cli::APP_VERSION,
        node.local_addr()
    );
    info!("Advertised as {}", node.this_server());
    info!("Using secret: {}", settings.secret);
    if settings.debug {
        info!("Debug logging enabled");
    }

    tokio::select! {
        _ = node.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }

    Ok(())
}
