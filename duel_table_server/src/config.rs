//! Command-line and environment configuration.

use std::net::SocketAddr;

use clap::Parser;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::transport::tcp::DEFAULT_MAX_LINE;

#[derive(Debug, Clone, Parser)]
#[command(name = "duel_table_server", version, about = "Two-seat matchmaking table server")]
pub struct ServerArgs {
    /// Address for line-delimited JSON clients
    #[arg(long, env = "DUEL_TCP_ADDR", default_value = "127.0.0.1:7777")]
    pub tcp_addr: SocketAddr,

    /// Address for WebSocket clients (served at /ws); disabled when unset
    #[arg(long, env = "DUEL_WS_ADDR")]
    pub ws_addr: Option<SocketAddr>,

    /// Seed for reproducible shuffles
    #[arg(long, env = "DUEL_SEED")]
    pub seed: Option<u64>,

    /// Tracing filter, e.g. `info` or `duel_table_server=debug`
    #[arg(long = "log", env = "RUST_LOG", default_value = "info")]
    pub log_filter: String,

    /// Outbound records buffered per connection
    #[arg(long, default_value_t = 32)]
    pub queue_depth: usize,

    /// Longest line accepted from a TCP client, in bytes; longer lines drop the client
    #[arg(long, env = "DUEL_MAX_LINE", default_value_t = DEFAULT_MAX_LINE)]
    pub max_line: usize,
}

impl ServerArgs {
    pub fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_defaults() {
        let args = ServerArgs::try_parse_from(["duel_table_server"]).unwrap();
        assert_eq!(args.tcp_addr, "127.0.0.1:7777".parse().unwrap());
        assert_eq!(args.queue_depth, 32);
        assert_eq!(args.max_line, 64 * 1024);
    }

    #[test]
    fn test_overrides() {
        let args = ServerArgs::try_parse_from([
            "duel_table_server",
            "--tcp-addr",
            "0.0.0.0:9000",
            "--ws-addr",
            "0.0.0.0:9001",
            "--seed",
            "12",
            "--log",
            "debug",
            "--max-line",
            "512",
        ])
        .unwrap();
        assert_eq!(args.tcp_addr.port(), 9000);
        assert_eq!(args.ws_addr.map(|a| a.port()), Some(9001));
        assert_eq!(args.log_filter, "debug");
        assert_eq!(args.max_line, 512);
        assert_eq!(args.rng().random::<u64>(), args.rng().random::<u64>());
    }

    #[test]
    fn test_rejects_bad_address() {
        assert!(ServerArgs::try_parse_from(["duel_table_server", "--tcp-addr", "nowhere"]).is_err());
    }
}
