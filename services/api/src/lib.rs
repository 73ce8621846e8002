mod cli;
mod infra;
mod routes;
mod server;

use mortgage_decision::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
