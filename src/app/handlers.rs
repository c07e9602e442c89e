use actix_files::NamedFile;
use actix_session::Session;
use actix_web::{web, HttpRequest, HttpResponse, Result};
use handlebars::Handlebars;
use log::{error, warn};
use std::io;
use crate::db;
use crate::db::entities::Paper;
use crate::utils::{text_utils, time_utils};
use super::dtos::*;
use super::error::{Error, map_db_error};
use super::flash;
use super::helpers::{redirect, render};
use super::AppState;

// The public side of the site: today's issues, one
// issue, page images and single blocks. Admin handlers
// are in the admin module.

// Default response when no route matched the request:
pub async fn not_found() -> Result<HttpResponse, Error> {
  Err(Error::NotFound(String::from("Endpoint doesn't exist")))
}

// Both papers are looked up on their own, one of them
// (or both) not being out yet is perfectly normal.
pub async fn index(
  app_state: web::Data<AppState>,
  hb: web::Data<Handlebars<'_>>,
  session: Session
) -> Result<HttpResponse, Error> {
  let today = time_utils::today();
  let mut editions = Vec::with_capacity(Paper::ALL.len());
  for paper in Paper::ALL.iter().copied() {
    let issue = db::issue_by_paper_and_date(&app_state.pool, paper, today)
      .map_err(map_db_error)?;
    let pages = match &issue {
      Some(issue) => PageDto::from_pages(
        issue,
        db::pages_for_issue(&app_state.pool, issue.id).map_err(map_db_error)?
      ),
      None => Vec::new()
    };
    editions.push(PaperEdition {
      key: paper,
      name: paper.display_name(),
      issue: issue.as_ref().map(IssueDto::from),
      pages
    });
  }

  render(&hb, "index", &IndexView {
    today: time_utils::format_issue_date(&today),
    editions,
    flashes: flash::take(&session)
  })
}

// Path variables have to be in a tuple.
// Bad dates and missing issues send the visitor back
// home with a message instead of an error page.
pub async fn issue(
  app_state: web::Data<AppState>,
  hb: web::Data<Handlebars<'_>>,
  session: Session,
  path: web::Path<(String, String)>
) -> Result<HttpResponse, Error> {
  let (paper, date_str) = path.into_inner();
  let issue_date = match time_utils::parse_issue_date(&date_str) {
    Some(d) => d,
    None => {
      flash::error(&session, "Invalid date.");
      return Ok(redirect("/"));
    }
  };
  // Unknown paper keys can't have issues.
  let issue = match paper.parse::<Paper>() {
    Ok(paper) => db::issue_by_paper_and_date(&app_state.pool, paper, issue_date)
      .map_err(map_db_error)?,
    Err(_) => None
  };
  let issue = match issue {
    Some(issue) => issue,
    None => {
      flash::error(&session, "Issue not found.");
      return Ok(redirect("/"));
    }
  };
  let pages = db::pages_for_issue(&app_state.pool, issue.id)
    .map_err(map_db_error)?;

  render(&hb, "issue", &IssueView {
    paper_name: issue.paper.display_name(),
    issue_date: time_utils::format_issue_date(&issue.issue_date),
    pages: PageDto::from_pages(&issue, pages),
    issue: IssueDto::from(&issue),
    flashes: flash::take(&session)
  })
}

// Only files that are actual pages of an existing issue
// get served, whatever else sits in the folder (the PDF,
// leftovers) stays private. NamedFile streams from disk
// and handles ETag, Last-Modified and Range requests.
pub async fn media(
  req: HttpRequest,
  app_state: web::Data<AppState>,
  path: web::Path<(String, String, String)>
) -> Result<HttpResponse, Error> {
  let (paper, date_str, filename) = path.into_inner();
  let not_found = || Error::NotFound(String::from("File does not exist"));

  let paper: Paper = paper.parse().map_err(|_| not_found())?;
  let issue_date = time_utils::parse_issue_date(&date_str)
    .ok_or_else(not_found)?;
  let filename = text_utils::secure_filename(&filename);
  let issue = db::issue_by_paper_and_date(&app_state.pool, paper, issue_date)
    .map_err(map_db_error)?
    .ok_or_else(not_found)?;
  db::page_by_issue_and_filename(&app_state.pool, issue.id, &filename)
    .map_err(map_db_error)?
    .ok_or_else(not_found)?;

  let file_path = app_state.storage.media_path(paper, &issue_date, &filename);
  let file = NamedFile::open_async(&file_path).await
    .map_err(|e| {
      if e.kind() == io::ErrorKind::NotFound {
        warn!("Page {:?} is in the database but not on disk", file_path);
        not_found()
      } else {
        error!("Could not open {:?} - {}", file_path, e);
        Error::InternalServerError(String::from("Could not read file"))
      }
    })?;

  Ok(file.into_response(&req))
}

// Public on purpose, blocks are meant to be shared by
// link.
pub async fn block(
  app_state: web::Data<AppState>,
  hb: web::Data<Handlebars<'_>>,
  path: web::Path<(i64,)>
) -> Result<HttpResponse, Error> {
  let block_id = path.into_inner().0;
  let not_found = || Error::NotFound(String::from("Block does not exist"));

  let block = db::block_by_id(&app_state.pool, block_id)
    .map_err(map_db_error)?
    .ok_or_else(not_found)?;
  // Cascading deletes make these two always present, but
  // a 404 is still better than a panic.
  let page = db::page_by_id(&app_state.pool, block.page_id)
    .map_err(map_db_error)?
    .ok_or_else(not_found)?;
  let issue = db::issue_by_id(&app_state.pool, page.issue_id)
    .map_err(map_db_error)?
    .ok_or_else(not_found)?;

  render(&hb, "block_view", &BlockView {
    block: BlockDto::from(block),
    page: PageDto::new(&issue, page),
    issue: IssueDto::from(&issue)
  })
}
