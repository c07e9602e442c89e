use actix_web::{
  error::ResponseError,
  http::{header, StatusCode},
  HttpResponse
};
use derive_more::Display;
use log::error;

// I could use
// #[display(fmt = "Internal server error: {}", _0)]
// To display the full message, but I don't want it
// to show up to random internet people, the full
// error output should only appear in logs.
#[derive(Debug, Display)]
pub enum Error {
  #[display(fmt = "Internal Server Error")]
  InternalServerError(String),
  #[display(fmt = "Database Error")]
  DatabaseError(String),
  #[display(fmt = "Not Found: {}", _0)]
  NotFound(String),
  // Holds where to send the visitor: the admin login
  // page. Not an error page, just a redirect.
  #[display(fmt = "Login required")]
  LoginRequired(String)
}

// Plain text error bodies, the pages that matter do
// their own flash + redirect dance.
impl ResponseError for Error {
  fn status_code(&self) -> StatusCode {
    match self {
      Error::InternalServerError(_) | Error::DatabaseError(_) =>
        StatusCode::INTERNAL_SERVER_ERROR,
      Error::NotFound(_) => StatusCode::NOT_FOUND,
      Error::LoginRequired(_) => StatusCode::SEE_OTHER
    }
  }

  fn error_response(&self) -> HttpResponse {
    match self {
      Error::LoginRequired(location) => HttpResponse::SeeOther()
        .insert_header((header::LOCATION, location.as_str()))
        .finish(),
      _ => HttpResponse::build(self.status_code()).body(self.to_string())
    }
  }
}

// My database functions use eyre, the Report only goes
// to the logs.
pub fn map_db_error(e: eyre::Report) -> Error {
  error!("Database error: {:?}", e);
  Error::DatabaseError(e.to_string())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn internal_details_stay_out_of_the_body() {
    let e = Error::DatabaseError("UNIQUE constraint failed: issues.paper".to_string());
    assert_eq!(e.to_string(), "Database Error");
    assert_eq!(e.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
  }

  #[test]
  fn login_required_redirects() {
    let response = Error::LoginRequired("/login-admin/login".to_string())
      .error_response();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
      response.headers().get(header::LOCATION).unwrap(),
      "/login-admin/login"
    );
  }

  #[test]
  fn not_found_keeps_its_message() {
    let e = Error::NotFound("Issue does not exist".to_string());
    assert_eq!(e.to_string(), "Not Found: Issue does not exist");
    assert_eq!(e.error_response().status(), StatusCode::NOT_FOUND);
  }

  #[test]
  fn status_per_variant() {
    let cases = vec![
      (Error::InternalServerError(String::new()), StatusCode::INTERNAL_SERVER_ERROR),
      (Error::DatabaseError(String::new()), StatusCode::INTERNAL_SERVER_ERROR),
      (Error::NotFound(String::new()), StatusCode::NOT_FOUND),
      (Error::LoginRequired("/".to_string()), StatusCode::SEE_OTHER)
    ];
    for (e, status) in cases {
      assert_eq!(e.error_response().status(), status);
    }
  }
}
