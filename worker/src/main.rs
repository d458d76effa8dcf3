use std::{env, io};

use comms::msg::{Command, Msg};
use log::{info, warn};
use tokio::{net::TcpListener, signal};
use tokio_util::sync::CancellationToken;

use worker::WorkerBuilder;

const DEFAULT_HOST: &str = "127.0.0.1";

#[tokio::main]
async fn main() -> io::Result<()> {
    env_logger::init();

    let addr = format!(
        "{}:{}",
        env::var("HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string()),
        env::var("PORT").map_err(io::Error::other)?,
    );

    let list = TcpListener::bind(&addr).await?;
    info!("listening at {addr}");

    let (stream, addr) = list.accept().await?;
    let (rx, tx) = stream.into_split();
    let (mut rx, tx) = comms::channel(rx, tx);
    info!("orchestrator connected from {addr}");

    let mut rx_buf = Vec::new();
    let spec = loop {
        match rx.recv_into(&mut rx_buf).await {
            Ok(Msg::Control(Command::CreateWorker(spec))) => break spec,
            Ok(msg) => warn!("expected CreateWorker, got {}", msg.kind()),
            Err(e) => return Err(e),
        }
    };

    info!(worker_id = spec.node_id; "bootstrapped");
    let worker = WorkerBuilder::build(spec);

    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("received SIGINT");
            token.cancel();
        }
    });

    worker.run(rx, tx, cancel).await?;
    info!("wrapping up");

    Ok(())
}
