use actix_web::{http::header, HttpResponse};
use handlebars::Handlebars;
use log::error;
use serde::Serialize;
use crate::db::entities::Paper;
use super::error::Error;

// Every form post ends up here, 303 so that browsers
// follow with a GET.
pub fn redirect(location: &str) -> HttpResponse {
  HttpResponse::SeeOther()
    .insert_header((header::LOCATION, location))
    .finish()
}

pub fn render<T: Serialize>(
  hb: &Handlebars<'_>,
  template: &str,
  data: &T
) -> Result<HttpResponse, Error> {
  let body = hb.render(template, data)
    .map_err(|e| {
      error!("A template engine error occured when rendering {}: {}", template, e);
      Error::InternalServerError("Template engine error".to_string())
    })?;
  Ok(
    HttpResponse::Ok()
      .content_type("text/html; charset=utf-8")
      .body(body)
  )
}

pub fn issue_url(paper: Paper, issue_date: &str) -> String {
  format!("/issue/{}/{}", paper.key(), issue_date)
}

pub fn media_url(paper: Paper, issue_date: &str, filename: &str) -> String {
  format!("/media/{}/{}/{}", paper.key(), issue_date, filename)
}

pub fn block_url(block_id: i64) -> String {
  format!("/block/{}", block_id)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn public_urls() {
    assert_eq!(
      issue_url(Paper::NammaTumkur, "2024-06-01"),
      "/issue/namma_tumkur/2024-06-01"
    );
    assert_eq!(
      media_url(Paper::TodaysPaper, "2024-06-01", "page_2.png"),
      "/media/todays_paper/2024-06-01/page_2.png"
    );
    assert_eq!(block_url(7), "/block/7");
  }

  #[test]
  fn redirect_is_see_other() {
    let response = redirect("/");
    assert_eq!(response.status(), actix_web::http::StatusCode::SEE_OTHER);
    assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/");
  }
}
