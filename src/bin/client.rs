//! Command line client: upload an image, save the stylized result

use ghibli_serving::{client, config::Settings, telemetry};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    telemetry::init_cli("warn");

    for line in client::run(std::env::args().skip(1), &Settings::config_path()).await {
        println!("{}", line);
    }
}
