use actix_multipart::form::{tempfile::TempFile, text::Text, MultipartForm};
use actix_session::Session;
use actix_web::{web, HttpResponse, Result};
use handlebars::Handlebars;
use log::{error, info, warn};
use serde::Deserialize;
use crate::db::{self, BlockReplacement};
use crate::db::entities::{Issue, Paper};
use crate::utils::{text_utils, time_utils};
use super::dtos::*;
use super::error::{Error, map_db_error};
use super::flash;
use super::guards::{self, AdminPrincipal};
use super::helpers::{redirect, render};
use super::issue_import::{self, ImportError, UploadedPdf};
use super::AppState;

// Everything behind the admin slug. Apart from the login
// pair, every handler takes an AdminPrincipal, which is
// what keeps anonymous visitors out.

/* --- Request body or form objects --- */
#[derive(Deserialize)]
pub struct LoginForm {
  pub username: Option<String>,
  pub password: Option<String>
}

// Everything optional so that a half-filled form gets a
// flash message instead of a bare 400.
#[derive(MultipartForm)]
pub struct UploadForm {
  pub paper: Option<Text<String>>,
  pub issue_date: Option<Text<String>>,
  pub pdf: Option<TempFile>
}

#[derive(Deserialize)]
pub struct BlocksForm {
  pub blocks_data: Option<String>
}
/* --- End request body or form objects --- */

fn issue_or_404(app_state: &AppState, issue_id: i64) -> Result<Issue, Error> {
  db::issue_by_id(&app_state.pool, issue_id)
    .map_err(map_db_error)?
    .ok_or_else(|| Error::NotFound(String::from("Issue does not exist")))
}

pub async fn login_form(
  app_state: web::Data<AppState>,
  hb: web::Data<Handlebars<'_>>,
  session: Session
) -> Result<HttpResponse, Error> {
  if guards::current_admin(&session, &app_state.admin).is_some() {
    return Ok(redirect(&app_state.admin.root_path()));
  }
  render(&hb, "admin_login", &LoginView {
    action: app_state.admin.login_path(),
    flashes: flash::take(&session)
  })
}

pub async fn login(
  app_state: web::Data<AppState>,
  session: Session,
  form: web::Form<LoginForm>
) -> HttpResponse {
  let username = form.username.as_deref().unwrap_or("");
  let password = form.password.as_deref().unwrap_or("");
  match guards::sign_in(&session, &app_state.admin, username, password) {
    Some(_) => {
      flash::success(&session, "Welcome back!");
      redirect(&app_state.admin.root_path())
    },
    None => {
      flash::error(&session, "Invalid credentials.");
      redirect(&app_state.admin.login_path())
    }
  }
}

pub async fn logout(
  admin: AdminPrincipal,
  session: Session
) -> HttpResponse {
  guards::sign_out(&session, &admin);
  flash::info(&session, "Logged out.");
  redirect("/")
}

pub async fn dashboard(
  admin: AdminPrincipal,
  app_state: web::Data<AppState>,
  hb: web::Data<Handlebars<'_>>,
  session: Session
) -> Result<HttpResponse, Error> {
  let settings = &app_state.admin;
  let issues = db::all_issue_summaries(&app_state.pool)
    .map_err(map_db_error)?
    .into_iter()
    .map(|summary| IssueRow {
      block_selector_url: settings.block_selector_path(summary.issue.id),
      delete_url: settings.delete_path(summary.issue.id),
      issue: IssueDto::from(&summary.issue),
      page_count: summary.page_count
    })
    .collect();

  render(&hb, "admin_dashboard", &DashboardView {
    username: admin.username,
    upload_action: settings.upload_path(),
    logout_url: settings.logout_path(),
    today: time_utils::format_issue_date(&time_utils::today()),
    papers: Paper::ALL.iter().copied().map(PaperOption::from).collect(),
    issues,
    flashes: flash::take(&session)
  })
}

// The conversion can take minutes for a big issue at
// 450 DPI, so the whole import runs on the blocking
// thread pool while we hold the lock for that issue.
pub async fn upload(
  admin: AdminPrincipal,
  app_state: web::Data<AppState>,
  session: Session,
  MultipartForm(form): MultipartForm<UploadForm>
) -> Result<HttpResponse, Error> {
  let dashboard = app_state.admin.root_path();

  let pdf = match form.pdf {
    Some(pdf) if pdf.file_name.as_deref().map_or(false, text_utils::has_pdf_extension) => pdf,
    _ => {
      flash::error(&session, "Please upload a valid PDF.");
      return Ok(redirect(&dashboard));
    }
  };
  let paper = match form.paper.as_ref().and_then(|p| p.trim().parse::<Paper>().ok()) {
    Some(paper) => paper,
    None => {
      flash::error(&session, "Please pick a known paper.");
      return Ok(redirect(&dashboard));
    }
  };
  let issue_date = match form.issue_date.as_ref()
    .and_then(|d| time_utils::parse_issue_date(d.trim())) {
    Some(d) => d,
    None => {
      flash::error(&session, "Invalid date.");
      return Ok(redirect(&dashboard));
    }
  };

  info!("Admin {} uploading {} for {} {}",
    admin.username, pdf.file_name.as_deref().unwrap_or(""), paper, issue_date);
  let _guard = app_state.upload_locks.acquire(paper, issue_date).await;
  let state = app_state.clone();
  let result = web::block(move || {
    let upload = UploadedPdf {
      original_name: pdf.file_name.clone().unwrap_or_default(),
      path: pdf.file.path().to_path_buf()
    };
    issue_import::import_issue(
      &state.pool,
      &state.storage,
      state.rasterizer.as_ref(),
      paper,
      issue_date,
      &upload
    )
    // The temp file is removed when pdf is dropped here.
  })
    .await
    .map_err(|e| {
      error!("Upload task failed to run - {}", e);
      Error::InternalServerError(String::from("Upload task failed"))
    })?;

  match result {
    Ok(outcome) => {
      flash::success(&session, format!(
        "Issue uploaded successfully ({} pages).",
        outcome.pages.len()
      ));
      Ok(redirect(&dashboard))
    },
    Err(ImportError::Conversion(e)) => {
      error!("PDF conversion failed for {} {} - {}", paper, issue_date, e);
      flash::error(&session, ImportError::Conversion(e).to_string());
      Ok(redirect(&dashboard))
    },
    Err(ImportError::Internal(report)) => {
      error!("Upload for {} {} failed - {:?}", paper, issue_date, report);
      Err(Error::InternalServerError(String::from("Upload failed")))
    }
  }
}

// The row goes first: a crash between the two steps
// leaves an orphan folder rather than an issue whose
// pages are gone from disk.
pub async fn delete_issue(
  admin: AdminPrincipal,
  app_state: web::Data<AppState>,
  session: Session,
  path: web::Path<(i64,)>
) -> Result<HttpResponse, Error> {
  let issue = issue_or_404(&app_state, path.into_inner().0)?;
  // An upload for the same issue would otherwise write
  // pages for a row that's gone.
  let _guard = app_state.upload_locks.acquire(issue.paper, issue.issue_date).await;
  if !db::delete_issue(&app_state.pool, issue.id).map_err(map_db_error)? {
    // Someone else got there first.
    return Err(Error::NotFound(String::from("Issue does not exist")));
  }
  info!("Admin {} deleted issue {} ({} {})",
    admin.username, issue.id, issue.paper, issue.issue_date);

  match app_state.storage.remove_issue_folder(issue.paper, &issue.issue_date) {
    Ok(_) => flash::info(&session, "Issue deleted."),
    Err(e) => {
      error!("Could not remove folder of issue {} - {}", issue.id, e);
      flash::error(&session, "Issue deleted, but its files could not be removed.");
    }
  }
  Ok(redirect(&app_state.admin.root_path()))
}

pub async fn block_selector(
  _admin: AdminPrincipal,
  app_state: web::Data<AppState>,
  hb: web::Data<Handlebars<'_>>,
  session: Session,
  path: web::Path<(i64,)>
) -> Result<HttpResponse, Error> {
  let issue = issue_or_404(&app_state, path.into_inner().0)?;
  let pages = db::pages_for_issue(&app_state.pool, issue.id)
    .map_err(map_db_error)?;
  let blocks = db::blocks_for_issue(&app_state.pool, issue.id)
    .map_err(map_db_error)?;

  render(&hb, "block_selector", &BlockSelectorView {
    dashboard_url: app_state.admin.root_path(),
    save_action: app_state.admin.save_blocks_path(issue.id),
    blocks_json: editor_blocks_json(&blocks),
    blocks: blocks.into_iter().map(BlockDto::from).collect(),
    pages: PageDto::from_pages(&issue, pages),
    issue: IssueDto::from(&issue),
    flashes: flash::take(&session)
  })
}

// Replaces the whole block set of the issue. A block
// pointing at a page of another issue rejects the
// entire batch.
pub async fn save_blocks(
  admin: AdminPrincipal,
  app_state: web::Data<AppState>,
  session: Session,
  path: web::Path<(i64,)>,
  form: web::Form<BlocksForm>
) -> Result<HttpResponse, Error> {
  let issue = issue_or_404(&app_state, path.into_inner().0)?;
  let selector = app_state.admin.block_selector_path(issue.id);

  let raw = form.blocks_data.as_deref().unwrap_or("[]");
  let blocks = match parse_blocks_data(raw) {
    Ok(blocks) => blocks,
    Err(e) => {
      warn!("Unparseable blocks_data for issue {} - {}", issue.id, e);
      flash::error(&session, "Invalid block data.");
      return Ok(redirect(&selector));
    }
  };

  match db::replace_blocks(&app_state.pool, issue.id, &blocks)
    .map_err(map_db_error)? {
    BlockReplacement::Saved(count) => {
      info!("Admin {} saved {} blocks for issue {}", admin.username, count, issue.id);
      flash::success(&session, "Blocks saved successfully.");
    },
    BlockReplacement::ForeignPage(page_id) => {
      warn!(
        "Admin {} submitted a block on page {} which isn't part of issue {}",
        admin.username, page_id, issue.id
      );
      flash::error(&session, "Invalid block data.");
    }
  }
  Ok(redirect(&selector))
}
