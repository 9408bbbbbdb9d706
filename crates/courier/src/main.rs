use clap::Parser;
use courier::prelude::*;
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Courier server v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        listen = %config.listen_addr(),
        data_file = %config.data_file.display(),
        "commands: /start /stop /update /exit"
    );

    let store = JsonFileStore::new(&config.data_file);
    let mut console = Console::new(config.server_builder(), store, TracingDisplay);

    if config.autostart {
        console.execute(Command::Start).await;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    if console.handle_line(&line).await == Flow::Exit {
                        break;
                    }
                }
                Ok(None) => {
                    tracing::info!("stdin closed, press Ctrl-C to exit");
                    stdin_open = false;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to read command");
                    stdin_open = false;
                }
            },
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    tracing::warn!(error = %e, "failed to listen for Ctrl-C");
                }
                console.execute(Command::Exit).await;
                break;
            }
        }
    }

    Ok(())
}
