mod app;
mod cli;
mod config;
mod format;
mod paths;
mod provider;
mod render;
mod store;

#[cfg(feature = "tui")]
mod tui;

use anyhow::Context;
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Args::parse();

    // The TUI owns the terminal; only log there when asked to.
    let interactive = matches!(args.cmd, Some(cli::Command::Tui));
    if !interactive || std::env::var_os("RUST_LOG").is_some() {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info".into()),
            )
            .init();
    }

    let config_dir = paths::config_dir()?;
    let cfg = config::Config::load_optional(config_dir.join("config.toml"))?;
    tracing::debug!(?config_dir, ?cfg, "resolved config");

    let settings = app::Settings::resolve(
        args.model.clone(),
        args.provider.clone(),
        args.tick_ms,
        cfg.as_ref(),
    );
    tracing::debug!(?settings, "resolved settings");

    let http = reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")?;

    let store = app::build_store(&http, cfg.as_ref(), &settings)?;

    if interactive {
        #[cfg(feature = "tui")]
        {
            return tui::run_tui(store, &settings.model).await;
        }
        #[cfg(not(feature = "tui"))]
        {
            anyhow::bail!("this build has no terminal UI (rebuild with `--features tui`)");
        }
    }

    let prompt = args.prompt.join(" ");
    let mut stdout = std::io::stdout();
    app::run_once(&store, &prompt, &mut stdout).await
}
