use clap::Parser;
use cli::{Cli, Command};
use config::Config;
use geojson::GeoJsonMap;
use history::{HistoryAssembler, Session};
use hours::HourFetcher;
use render::Controller;
use std::sync::Arc;
use weather::WeatherClient;

mod cli;
mod config;
mod geojson;
mod history;
mod hours;
mod parser;
mod render;
mod retry;
mod server;
mod trail;
mod weather;
mod weather_tasks;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let args = Cli::parse();
    let config = Config::from_env()?;

    match args.cmd {
        Command::Http { address } => server::run(address, &config).await?,
        Command::History => {
            let assembler =
                HistoryAssembler::new(HourFetcher::new(&config)?, config.fetch_concurrency());
            let summary = assembler.fetch_all_hours().await;
            println!("{}", serde_json::to_string_pretty(&summary.to_message())?);
        }
        Command::Latest => {
            let mut controller = controller(&config)?;
            controller.refresh().await;
            controller.show_latest().await?;
            println!("{}", controller.map().to_json()?);
        }
        Command::Trail => {
            let mut controller = controller(&config)?;
            controller.refresh().await;
            controller.show_trail().await?;
            println!("{}", controller.map().to_json()?);
        }
        Command::Weather { lat, lon } => {
            let client = WeatherClient::new(&config.weather_base, config.weather_timeout())?;
            let report = weather::report(client.fetch_weather(lat, lon).await);
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

fn controller(config: &Config) -> anyhow::Result<Controller<GeoJsonMap, HourFetcher>> {
    Ok(Controller::new(
        GeoJsonMap::new(),
        Arc::new(Session::new()),
        HistoryAssembler::new(HourFetcher::new(config)?, config.fetch_concurrency()),
        WeatherClient::new(&config.weather_base, config.weather_timeout())?,
    ))
}
