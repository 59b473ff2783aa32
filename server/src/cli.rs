use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(about = "Balloon tracker CLI.")]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve the upstream proxy and the JSON API.
    Http {
        #[arg(env = "TRACKER_SERVER_ADDRESS", default_value = "127.0.0.1:3030")]
        address: std::net::SocketAddr,
    },
    /// Fetch the last 24 hours and print a summary.
    History,
    /// Fetch the last 24 hours and print the latest positions as GeoJSON.
    Latest,
    /// Fetch the last 24 hours and print the trails as GeoJSON.
    Trail,
    /// Print current conditions at a point.
    Weather {
        #[arg(allow_negative_numbers = true)]
        lat: f64,
        #[arg(allow_negative_numbers = true)]
        lon: f64,
    },
}
