mod app;
mod config;
mod convert;
mod db;
mod storage;
mod utils;
use color_eyre::Result;
use std::env;

#[actix_web::main]
async fn main() -> Result<()> {
  color_eyre::install()?;
  // Values in .env don't override the actual
  // environment.
  dotenv::dotenv().ok();
  if env::var("RUST_LOG").is_err() {
    env::set_var("RUST_LOG", "info");
  }
  env_logger::init();

  app::run().await
}
