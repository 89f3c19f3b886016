use log::{error, info, LevelFilter};
use thiserror::Error;

const LOG_CONFIG: &str = "log4rs.yaml";

/// Errors that stop the server from starting or keep it from running.
#[derive(Debug, Error)]
enum LaunchError {
    #[error("Failed to initialise logging from {LOG_CONFIG}: {0}")]
    Logging(String),
    #[error(transparent)]
    Rocket(#[from] rocket::Error),
}

fn init_logging() -> Result<(), LaunchError> {
    log4rs::init_file(LOG_CONFIG, log4rs_dynamic_filters::default_deserializers())
        .map_err(|e| LaunchError::Logging(e.to_string()))
}

async fn run() -> Result<(), LaunchError> {
    info!("Configuring survey backend...");
    let rocket = survey_backend::build().ignite().await?;
    info!("...configured with the {} profile", rocket.figment().profile());

    // Rocket's own logging duplicates the request logger from here on.
    log4rs_dynamic_filters::DynamicLevelFilter::set("rocket", LevelFilter::Off);
    let _ = rocket.launch().await?;
    Ok(())
}

#[rocket::main]
async fn main() {
    if let Err(err) = init_logging() {
        eprintln!("{err}");
        std::process::exit(1)
    }
    info!("Initialised logging");

    if let Err(err) = run().await {
        error!("{err}");
        error!("Critical failure, shutting down");
        std::process::exit(1)
    }
}
