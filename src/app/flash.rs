use actix_session::Session;
use derive_more::Display;
use log::error;
use serde::{Deserialize, Serialize};

// One-shot messages shown on the next rendered page.
// They live in the session cookie until then.
const FLASH_KEY: &'static str = "_flashes";

#[derive(Debug, Display, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashCategory {
  #[display(fmt = "success")]
  Success,
  #[display(fmt = "info")]
  Info,
  #[display(fmt = "error")]
  Error
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flash {
  pub category: FlashCategory,
  pub message: String
}

// A broken session shouldn't break the request, so
// errors are only logged in here.
pub fn push(session: &Session, category: FlashCategory, message: impl Into<String>) {
  let mut flashes = peek(session);
  flashes.push(Flash { category, message: message.into() });
  if let Err(e) = session.insert(FLASH_KEY, flashes) {
    error!("Could not store flash message in session - {}", e);
  }
}

pub fn success(session: &Session, message: impl Into<String>) {
  push(session, FlashCategory::Success, message);
}

pub fn info(session: &Session, message: impl Into<String>) {
  push(session, FlashCategory::Info, message);
}

pub fn error(session: &Session, message: impl Into<String>) {
  push(session, FlashCategory::Error, message);
}

// Reads the pending messages and clears them.
pub fn take(session: &Session) -> Vec<Flash> {
  let flashes = peek(session);
  if !flashes.is_empty() {
    session.remove(FLASH_KEY);
  }
  flashes
}

fn peek(session: &Session) -> Vec<Flash> {
  match session.get::<Vec<Flash>>(FLASH_KEY) {
    Ok(flashes) => flashes.unwrap_or_default(),
    Err(e) => {
      error!("Could not read flash messages from session - {}", e);
      Vec::new()
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use actix_session::SessionExt;
  use actix_web::test::TestRequest;

  #[test]
  fn flashes_are_taken_once_in_order() {
    let req = TestRequest::default().to_http_request();
    let session = req.get_session();
    success(&session, "Issue uploaded successfully (2 pages).");
    error(&session, "Invalid date.");

    let flashes = take(&session);
    assert_eq!(flashes.len(), 2);
    assert_eq!(flashes[0].category, FlashCategory::Success);
    assert_eq!(flashes[1].message, "Invalid date.");
    assert!(take(&session).is_empty());
  }

  #[test]
  fn category_serializes_lowercase() {
    let flash = Flash { category: FlashCategory::Info, message: "Logged out.".to_string() };
    let json = serde_json::to_string(&flash).unwrap();
    assert_eq!(json, r#"{"category":"info","message":"Logged out."}"#);
  }
}
