use actix_multipart::form::MultipartFormConfig;
use actix_session::{storage::CookieSessionStore, SessionMiddleware};
use actix_web::{
  body::MessageBody,
  cookie::Key,
  dev::{ServiceFactory, ServiceRequest, ServiceResponse},
  middleware, web, App, HttpServer
};
use color_eyre::Result;
use eyre::WrapErr;
use log::{info, warn};
use handlebars::Handlebars;
use sha2::{Digest, Sha512};
use std::path::PathBuf;
use std::sync::Arc;
// I think we have to add crate here because
// of the other crate named "config" that we
// use as a dependency.
use crate::config::{AdminSettings, Config};
use crate::convert::{PdfiumRasterizer, Rasterizer};
use crate::db::{self, Pool};
use crate::storage::Storage;
use error::Error;
use issue_import::UploadLocks;
mod admin;
mod dtos;
mod error;
mod flash;
mod guards;
mod handlers;
mod helpers;
mod issue_import;

const SESSION_COOKIE_NAME: &'static str = "epaper_session";
// What SECRET_KEY defaults to, only good for local runs.
const DEFAULT_SECRET_KEY: &'static str = "change-me";

// Declare app state struct:
pub struct AppState {
  pub pool: Pool,
  pub storage: Storage,
  pub rasterizer: Arc<dyn Rasterizer>,
  pub upload_locks: UploadLocks,
  pub admin: AdminSettings
}

// Cookie keys need 64 bytes, SECRET_KEY can be any
// length so it goes through SHA-512 first.
fn session_key(secret: &str) -> Key {
  let digest = Sha512::digest(secret.as_bytes());
  Key::from(&digest[..])
}

// Function to start the server.
// Has to be async because there should be a .await at the end.
pub async fn run() -> Result<()> {
  let config = Config::from_env()?;
  if config.secret_key == DEFAULT_SECRET_KEY {
    warn!("SECRET_KEY is not set, sessions are signed with the default key");
  }

  let pool = db::open_pool(&config.db_path)
    .context("Fatal: could not open the database")?;
  let storage = Storage::open(&config.storage_root)
    .context("Fatal: storage root is not writable")?;

  // Delcare the template system, currently using
  // handlebars:
  let mut handlebars = Handlebars::new();
  handlebars
    .register_templates_directory(".hbs", &config.template_dir)
    .context("Fatal: templates directory might be missing or \
      not accessible")?;
  let handlebars_ref = web::Data::new(handlebars);

  let rasterizer: Arc<dyn Rasterizer> = Arc::new(
    PdfiumRasterizer::new(config.pdfium_lib_path.as_ref().map(PathBuf::from))
  );

  // Got to save these for later because we'll be
  // destroying "config" by moving it into app_state as
  // AdminSettings.
  let bind_address = config.bind_address.clone();
  let key = session_key(&config.secret_key);
  let cookie_secure = config.cookie_secure;
  let max_upload_size = config.max_upload_size;

  let app_state = web::Data::new(
    AppState {
      pool,
      storage,
      rasterizer,
      upload_locks: UploadLocks::default(),
      admin: config.into()
    }
  );
  info!(
    "Admin section at {}, listening on {}",
    app_state.admin.root_path(),
    bind_address
  );

  HttpServer::new(move|| {
    build_app(
      app_state.clone(),
      handlebars_ref.clone(),
      key.clone(),
      cookie_secure,
      max_upload_size
    )
  })
  .bind(bind_address)?
  .run()
  .await
  .context("Start Actix web server")

}

// Split from run() so the tests get the exact same app.
fn build_app(
  app_state: web::Data<AppState>,
  handlebars: web::Data<Handlebars<'static>>,
  key: Key,
  cookie_secure: bool,
  max_upload_size: usize
) -> App<
  impl ServiceFactory<
    ServiceRequest,
    Config = (),
    Response = ServiceResponse<impl MessageBody>,
    Error = actix_web::Error,
    InitError = ()
  >
> {
  let slug = app_state.admin.slug.clone();
  App::new()
    .app_data(app_state)
    .app_data(handlebars)
    .app_data(
      MultipartFormConfig::default()
        .total_limit(max_upload_size)
    )
    // The block editor posts its JSON as a regular
    // form field, which can get way past the 16kB default.
    .app_data(web::FormConfig::default().limit(max_upload_size))
    .app_data(web::PathConfig::default().error_handler(|_, _| {
      // /block/abc is a route that doesn't exist rather
      // than a bad request.
      Error::NotFound(String::from("Endpoint doesn't exist")).into()
    }))
    .wrap(
      SessionMiddleware::builder(CookieSessionStore::default(), key)
        .cookie_name(String::from(SESSION_COOKIE_NAME))
        .cookie_secure(cookie_secure)
        .build()
    )
    .wrap(middleware::Logger::default())
    .configure(|cfg| endpoints_config(cfg, &slug))
    .default_service(web::route().to(handlers::not_found))
}

// Route configuration:
fn endpoints_config(cfg: &mut web::ServiceConfig, admin_slug: &str) {
  cfg.route("/", web::get().to(handlers::index))
    .route("/issue/{paper}/{date}", web::get().to(handlers::issue))
    .route("/media/{paper}/{date}/{filename:.*}", web::get().to(handlers::media))
    .route("/block/{block_id}", web::get().to(handlers::block))
    .service(
      web::scope(&format!("/{}", admin_slug))
        .route("/login", web::get().to(admin::login_form))
        .route("/login", web::post().to(admin::login))
        .route("/logout", web::get().to(admin::logout))
        .route("/", web::get().to(admin::dashboard))
        .route("", web::get().to(admin::dashboard))
        .route("/upload", web::post().to(admin::upload))
        .route("/delete/{issue_id}", web::post().to(admin::delete_issue))
        .route("/block_selector/{issue_id}", web::get().to(admin::block_selector))
        .route("/save_blocks/{issue_id}", web::post().to(admin::save_blocks))
    );
}
