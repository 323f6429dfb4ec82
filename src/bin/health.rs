//! Command line health probe

use ghibli_serving::{config::Settings, probe, telemetry};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    telemetry::init_cli("warn");

    println!("{}", probe::run(&Settings::config_path()).await);
}
