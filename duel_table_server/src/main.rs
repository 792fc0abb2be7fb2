use std::future;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use duel_table_core::RankSum;
use duel_table_server::{config::ServerArgs, logging, table, transport};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ServerArgs::parse();
    logging::init(&args.log_filter);

    let (table, _actor) = table::spawn(RankSum, args.rng());

    let tcp = transport::bind(args.tcp_addr)
        .await
        .context("starting TCP listener")?;
    info!("line clients on {}", args.tcp_addr);

    let ws = match args.ws_addr {
        Some(addr) => {
            let listener = transport::bind(addr)
                .await
                .context("starting WebSocket listener")?;
            info!("websocket clients on ws://{}/ws", addr);
            Some(listener)
        }
        None => None,
    };

    let ws_server = async {
        match ws {
            Some(listener) => transport::ws::serve(listener, table.clone(), args.queue_depth).await,
            None => future::pending().await,
        }
    };

    tokio::select! {
        _ = transport::tcp::serve(tcp, table.clone(), args.queue_depth, args.max_line) => {}
        res = ws_server => res.context("websocket server stopped")?,
        res = tokio::signal::ctrl_c() => {
            res.context("waiting for ctrl-c")?;
            info!("shutting down");
        }
    }

    Ok(())
}
