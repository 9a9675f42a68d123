use anyhow::Context;
use clap::Parser;
use cli::TunbootCli;
use config::EffectiveConfig;
use tunneling::controller::TunnelLifecycleController;
use tunneling::session::FrpcSession;

mod cli;
mod config;
mod crypto;
mod identity;
mod remote;
mod render;
mod tunneling;

#[tokio::main]
async fn main() {
    let cli = TunbootCli::parse();
    tracing_subscriber::fmt()
        .with_max_level(if cli.debug {
            tracing::Level::DEBUG
        } else {
            tracing::Level::ERROR
        })
        .init();

    if let Err(err) = run(cli).await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run(cli: TunbootCli) -> anyhow::Result<()> {
    let identity = identity::read()?;

    let fetcher = remote::Fetcher::new(remote::BASE_URL, remote::VERSION)?;
    fetcher.check_version().await?;
    let payload = fetcher.fetch_payload(&identity).await?;

    let plaintext = crypto::decrypt(&identity, &payload)?;
    let remote_config: config::RemoteUserConfig = serde_json::from_slice(&plaintext)
        .context("decrypted payload is not a valid configuration")?;
    let effective = EffectiveConfig::new(remote_config, &cli);

    let name = render::session_name();
    let rendered = render::render(&effective, &name);
    println!(
        "open tunnel address: https://{name}.{}",
        effective.subdomain_host
    );

    let parsed = tunneling::client_config::parse(&rendered)
        .context("rendered configuration was rejected")?;
    let session = FrpcSession::spawn(&rendered)?;
    TunnelLifecycleController::new(parsed, session)
        .run()
        .await?;
    Ok(())
}
