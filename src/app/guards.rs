use actix_session::{Session, SessionExt};
use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use futures::future::{ready, Ready};
use log::{error, info, warn};
use crate::config::AdminSettings;
use super::error::Error;
use super::flash;
use super::AppState;

const ADMIN_SESSION_KEY: &'static str = "admin";

// An actix Guard would only make the route not match
// and end up as a 404, what the admin section needs is
// a redirect to the login page. So it's an extractor:
// every admin handler takes an AdminPrincipal argument
// and never runs without one.
#[derive(Debug, Clone, PartialEq)]
pub struct AdminPrincipal {
  pub username: String
}

impl FromRequest for AdminPrincipal {
  type Error = Error;
  type Future = Ready<Result<Self, Self::Error>>;

  fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
    ready(authenticate(req))
  }
}

fn authenticate(req: &HttpRequest) -> Result<AdminPrincipal, Error> {
  let app_state = req.app_data::<web::Data<AppState>>()
    .ok_or_else(|| {
      error!("AppState missing from app data, SHOULD NEVER HAPPEN");
      Error::InternalServerError("Missing application state".to_string())
    })?;
  let session = req.get_session();
  match current_admin(&session, &app_state.admin) {
    Some(principal) => Ok(principal),
    None => {
      warn!("Unauthenticated request to admin endpoint {}", req.uri());
      flash::error(&session, "You must log in as admin.");
      Err(Error::LoginRequired(app_state.admin.login_path()))
    }
  }
}

// The session only counts if it names the admin we're
// currently configured with. Changing ADMIN_USERNAME
// logs everyone out.
pub fn current_admin(
  session: &Session,
  settings: &AdminSettings
) -> Option<AdminPrincipal> {
  match session.get::<String>(ADMIN_SESSION_KEY) {
    Ok(Some(username)) if username == settings.username =>
      Some(AdminPrincipal { username }),
    Ok(_) => None,
    Err(e) => {
      warn!("Unreadable admin session, clearing it - {}", e);
      session.clear();
      None
    }
  }
}

// No attempt counting, no lockout. Just a match on
// both values.
pub fn sign_in(
  session: &Session,
  settings: &AdminSettings,
  username: &str,
  password: &str
) -> Option<AdminPrincipal> {
  if username != settings.username || password != settings.password {
    warn!("Failed admin login attempt for username {:?}", username);
    return None;
  }
  // New session ID on privilege change.
  session.renew();
  if let Err(e) = session.insert(ADMIN_SESSION_KEY, username) {
    error!("Could not store admin principal in session - {}", e);
    return None;
  }
  info!("Admin {} logged in", username);
  Some(AdminPrincipal { username: username.to_string() })
}

// clear() and not purge(): a purged session ignores
// inserts and the "Logged out." flash would be lost.
pub fn sign_out(session: &Session, principal: &AdminPrincipal) {
  session.clear();
  info!("Admin {} logged out", principal.username);
}

#[cfg(test)]
mod tests {
  use super::*;
  use actix_web::test::TestRequest;

  fn settings() -> AdminSettings {
    AdminSettings {
      username: "admin".to_string(),
      password: "s3cret".to_string(),
      slug: "login-admin".to_string()
    }
  }

  #[test]
  fn wrong_credentials_do_not_sign_in() {
    let session = TestRequest::default().to_http_request().get_session();
    assert!(sign_in(&session, &settings(), "admin", "nope").is_none());
    assert!(sign_in(&session, &settings(), "Admin", "s3cret").is_none());
    assert!(current_admin(&session, &settings()).is_none());
  }

  #[test]
  fn sign_in_then_out() {
    let session = TestRequest::default().to_http_request().get_session();
    let principal = sign_in(&session, &settings(), "admin", "s3cret").unwrap();
    assert_eq!(principal.username, "admin");
    assert_eq!(current_admin(&session, &settings()), Some(principal.clone()));
    sign_out(&session, &principal);
    assert!(current_admin(&session, &settings()).is_none());
  }

  #[test]
  fn session_for_another_username_is_ignored() {
    let session = TestRequest::default().to_http_request().get_session();
    sign_in(&session, &settings(), "admin", "s3cret").unwrap();
    let mut changed = settings();
    changed.username = "editor".to_string();
    assert!(current_admin(&session, &changed).is_none());
  }
}
