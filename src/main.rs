use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use joy::completion::{CompletionClient, DeepSeekClient};
use joy::config::CredentialResolver;
use joy::constants;
use joy::web_server::{self, WebConfig};

// Define the command-line interface structure using clap
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Secret store holding `[deepseek] api_key`.
    #[arg(long, global = true, env = "JOY_SECRETS_FILE", default_value = constants::DEFAULT_SECRETS_FILE)]
    secrets_file: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

// Define the available subcommands
#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Serve the Joy web UI.
    Start {
        #[arg(long, env = "JOY_HOST", default_value = "127.0.0.1", help = "Address to bind the web server to.")]
        host: IpAddr,
        #[arg(long, env = "JOY_PORT", default_value_t = constants::DEFAULT_PORT, help = "Port for the web server.")]
        port: u16,
        #[arg(long, default_value = "templates", help = "Directory holding the page templates.")]
        templates: PathBuf,
        #[arg(long, default_value = "static", help = "Directory served under /static.")]
        static_dir: PathBuf,
    },
    /// Talk to Joy from the terminal.
    Chat,
}

// The main entry point of the application, using tokio's async runtime
#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (for environment variables like API keys)
    dotenvy::dotenv().ok();

    // Reads log level from RUST_LOG environment variable (e.g., RUST_LOG=info,joy=debug)
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    info!("Joy starting with command: {:?}", cli.command);

    // Resolved once; a restart is needed to pick up a new key.
    let credential = CredentialResolver::new(&cli.secrets_file).resolve();
    let client: Arc<dyn CompletionClient> = Arc::new(DeepSeekClient::new(credential));

    match cli.command {
        Commands::Start {
            host,
            port,
            templates,
            static_dir,
        } => {
            let config = WebConfig {
                addr: SocketAddr::new(host, port),
                templates_dir: templates,
                static_dir,
            };
            info!("Starting Joy web UI on {}...", config.addr);

            let mut web_server_handle = tokio::spawn(web_server::start_web_server(config, client));

            let ctrl_c = tokio::signal::ctrl_c();
            tokio::pin!(ctrl_c);

            let outcome: Result<()> = tokio::select! {
                _ = &mut ctrl_c => {
                    info!("Ctrl-C received, initiating shutdown...");
                    Ok(())
                }
                res = &mut web_server_handle => {
                    match res {
                        Ok(Ok(())) => {
                            info!("Web server task completed unexpectedly.");
                            Ok(())
                        }
                        Ok(Err(e)) => Err(e.context("Web server failed")),
                        Err(e) if e.is_panic() => Err(anyhow!("Web server task panicked: {}", e)),
                        Err(e) => Err(anyhow!("Web server task failed: {}", e)),
                    }
                }
            };

            if !web_server_handle.is_finished() {
                info!("Aborting web server task...");
                web_server_handle.abort();
            }
            outcome?;
            info!("Shutdown complete.");
        }
        Commands::Chat => {
            info!("Starting interactive chat session...");
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            let mut stdout = tokio::io::stdout();
            joy::chat::run_chat(client.as_ref(), stdin, &mut stdout)
                .await
                .context("Chat session failed")?;
        }
    }

    Ok(())
}
