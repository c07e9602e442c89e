// Adding the context method to errors:
use eyre::WrapErr;
use color_eyre::Result;
use serde::Deserialize;
use std::collections::HashMap;
use std::convert::From;
use std::env;

// 50 MB, applies to every request body.
pub const DEFAULT_MAX_UPLOAD_SIZE: usize = 50 * 1024 * 1024;

// Keeping Debug out of this one because it holds the
// admin password and the session secret and I don't
// want them ending up in logs by accident.
#[derive(Deserialize)]
pub struct Config {
  pub db_path: String,
  pub storage_root: String,
  pub bind_address: String,
  pub template_dir: String,
  pub secret_key: String,
  pub cookie_secure: bool,
  pub admin_username: String,
  pub admin_password: String,
  pub admin_slug: String,
  pub max_upload_size: usize,
  // Directory holding the pdfium shared library. We
  // try the system library when it's absent.
  pub pdfium_lib_path: Option<String>
}

// Same trick as the SiteInfo thing I had on the blog:
// the admin section only needs these, so the rest of
// the config gets dropped when converting.
#[derive(Debug, Clone)]
pub struct AdminSettings {
  pub username: String,
  pub password: String,
  pub slug: String
}

impl From<Config> for AdminSettings {
  fn from(config: Config) -> Self {
    Self {
      username: config.admin_username,
      password: config.admin_password,
      slug: normalize_slug(&config.admin_slug)
    }
  }
}

impl AdminSettings {

  // Root of the admin section, with a trailing slash
  // because that's where the dashboard lives.
  pub fn root_path(&self) -> String {
    format!("/{}/", self.slug)
  }

  pub fn login_path(&self) -> String {
    format!("/{}/login", self.slug)
  }

  pub fn logout_path(&self) -> String {
    format!("/{}/logout", self.slug)
  }

  pub fn upload_path(&self) -> String {
    format!("/{}/upload", self.slug)
  }

  pub fn delete_path(&self, issue_id: i64) -> String {
    format!("/{}/delete/{}", self.slug, issue_id)
  }

  pub fn block_selector_path(&self, issue_id: i64) -> String {
    format!("/{}/block_selector/{}", self.slug, issue_id)
  }

  pub fn save_blocks_path(&self, issue_id: i64) -> String {
    format!("/{}/save_blocks/{}", self.slug, issue_id)
  }

}

pub fn normalize_slug(slug: &str) -> String {
  slug.trim().trim_matches('/').to_string()
}

impl Config {

  pub fn from_env() -> Result<Config> {
    Config::from_vars(env::vars())
  }

  // Split from from_env() so I can test it without
  // messing with the actual process environment.
  pub fn from_vars<I>(vars: I) -> Result<Config>
    where I: IntoIterator<Item = (String, String)>
  {
    // Empty values and the literal "None" count as
    // absent, docker-compose files out there rely on it.
    let source: HashMap<String, String> = vars.into_iter()
      .filter(|(_, v)| !v.is_empty() && v != "None")
      .collect();

    // You have to use lowercase when compared to what's
    // in the .env file.
    config::Config::builder()
      .set_default("db_path", "./app.db")?
      .set_default("storage_root", "./uploads")?
      .set_default("bind_address", "127.0.0.1:5000")?
      .set_default("template_dir", "./templates")?
      .set_default("secret_key", "change-me")?
      .set_default("cookie_secure", false)?
      .set_default("admin_username", "admin")?
      .set_default("admin_password", "admin123")?
      .set_default("admin_slug", "login-admin")?
      .set_default("max_upload_size", DEFAULT_MAX_UPLOAD_SIZE as u64)?
      .add_source(config::Environment::default().source(Some(source)))
      .build()?
      // The error has to be given a context for
      // color_eyre to work here:
      .try_deserialize()
      .context("Loading configuration from env")
  }

}

#[cfg(test)]
mod tests {
  use super::*;

  fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs.iter()
      .map(|(k, v)| (k.to_string(), v.to_string()))
      .collect()
  }

  #[test]
  fn defaults_apply_without_env() {
    let config = Config::from_vars(Vec::new()).unwrap();
    assert_eq!(config.admin_username, "admin");
    assert_eq!(config.admin_password, "admin123");
    assert_eq!(config.admin_slug, "login-admin");
    assert_eq!(config.max_upload_size, DEFAULT_MAX_UPLOAD_SIZE);
    assert!(config.pdfium_lib_path.is_none());
  }

  #[test]
  fn env_overrides_defaults() {
    let config = Config::from_vars(vars(&[
      ("ADMIN_USERNAME", "editor"),
      ("STORAGE_ROOT", "/srv/uploads")
    ])).unwrap();
    assert_eq!(config.admin_username, "editor");
    assert_eq!(config.storage_root, "/srv/uploads");
  }

  #[test]
  fn empty_and_none_values_fall_back_to_defaults() {
    let config = Config::from_vars(vars(&[
      ("ADMIN_PASSWORD", ""),
      ("SECRET_KEY", "None")
    ])).unwrap();
    assert_eq!(config.admin_password, "admin123");
    assert_eq!(config.secret_key, "change-me");
  }

  #[test]
  fn slug_loses_its_slashes() {
    let config = Config::from_vars(vars(&[("ADMIN_SLUG", "/secret-door/")]))
      .unwrap();
    let admin = AdminSettings::from(config);
    assert_eq!(admin.slug, "secret-door");
    assert_eq!(admin.login_path(), "/secret-door/login");
    assert_eq!(admin.root_path(), "/secret-door/");
  }
}
