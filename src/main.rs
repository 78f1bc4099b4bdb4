use clap::Parser;

mod server;

#[tokio::main]
pub async fn main() {
    let cli = server::Cli::parse();
    let _result = server::setup_log(&cli).await;

    if let Err(e) = server::run(&cli).await {
        tracing::error!("kubecd stopped with error: {e:#}");
    }
}
