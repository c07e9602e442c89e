/*
 * On-disk layout of the uploaded issues:
 * storage_root/{paper}/{YYYY-MM-DD}/ holds the
 * original PDF and one page_{n}.png per page.
 */

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use chrono::NaiveDate;
use log::{debug, warn};
use regex::Regex;
use lazy_static::lazy_static;
use crate::db::entities::Paper;
use crate::utils::text_utils::secure_filename;
use crate::utils::time_utils::format_issue_date;

// Rendered pages land in here first and only get moved
// next to the PDF once the database agrees.
const STAGING_DIR: &'static str = ".staging";
// Pages of the previous upload wait in here until the
// new page set is committed.
const PREVIOUS_DIR: &'static str = ".previous";
// What we name an uploaded PDF whose name didn't survive
// sanitization.
const FALLBACK_PDF_NAME: &'static str = "issue.pdf";

pub fn page_filename(page_no: u32) -> String {
  format!("page_{}.png", page_no)
}

fn is_page_filename(name: &str) -> bool {
  lazy_static! {
    static ref PAGE_FILE_REGEX: Regex = Regex::new(
      r"^page_\d+\.png$"
    ).unwrap();
  }
  PAGE_FILE_REGEX.is_match(name)
}

pub struct Storage {
  root: PathBuf
}

impl Storage {

  // Creates the root and one folder per known paper.
  pub fn open(root: &str) -> io::Result<Self> {
    let root = PathBuf::from(root);
    for paper in Paper::ALL.iter() {
      fs::create_dir_all(root.join(paper.key()))?;
    }
    Ok(Self { root })
  }

  pub fn issue_folder(&self, paper: Paper, issue_date: &NaiveDate) -> PathBuf {
    self.root
      .join(paper.key())
      .join(format_issue_date(issue_date))
  }

  pub fn ensure_issue_folder(
    &self,
    paper: Paper,
    issue_date: &NaiveDate
  ) -> io::Result<PathBuf> {
    let folder = self.issue_folder(paper, issue_date);
    fs::create_dir_all(&folder)?;
    Ok(folder)
  }

  // Copies the uploaded temp file into the issue folder
  // under its sanitized original name. Copy and not
  // rename because the temp dir may be on another
  // filesystem.
  pub fn save_pdf(
    &self,
    folder: &Path,
    original_name: &str,
    uploaded: &Path
  ) -> io::Result<PathBuf> {
    let mut name = secure_filename(original_name);
    if name.is_empty() {
      name = FALLBACK_PDF_NAME.to_string();
    }
    let destination = folder.join(name);
    fs::copy(uploaded, &destination)?;
    Ok(destination)
  }

  // Always starts from an empty staging directory, a
  // previous crash may have left one behind.
  pub fn create_staging(&self, folder: &Path) -> io::Result<PathBuf> {
    let staging = folder.join(STAGING_DIR);
    remove_dir_if_exists(&staging)?;
    fs::create_dir(&staging)?;
    Ok(staging)
  }

  pub fn discard_staging(&self, staging: &Path) {
    if let Err(e) = remove_dir_if_exists(staging) {
      warn!("Could not remove staging directory {:?} - {}", staging, e);
    }
  }

  // Moves every page image of the previous upload aside
  // into PREVIOUS_DIR, so a shorter re-upload doesn't
  // leave page_9.png and friends lying around, then
  // moves the staged pages in. Follow up with either
  // drop_previous_pages or restore_previous_pages.
  pub fn promote_staged(&self, folder: &Path, staging: &Path) -> io::Result<usize> {
    let previous = folder.join(PREVIOUS_DIR);
    remove_dir_if_exists(&previous)?;
    fs::create_dir(&previous)?;
    move_page_files(folder, &previous)?;
    let mut moved = 0;
    for entry in fs::read_dir(staging)? {
      let entry = entry?;
      fs::rename(entry.path(), folder.join(entry.file_name()))?;
      moved += 1;
    }
    fs::remove_dir(staging)?;
    Ok(moved)
  }

  // The new pages are committed, the old ones can go.
  pub fn drop_previous_pages(&self, folder: &Path) {
    let previous = folder.join(PREVIOUS_DIR);
    if let Err(e) = remove_dir_if_exists(&previous) {
      warn!("Could not remove previous pages in {:?} - {}", previous, e);
    }
  }

  // Undoes promote_staged, whatever point it got to.
  // Does nothing when promotion never started.
  pub fn restore_previous_pages(&self, folder: &Path) -> io::Result<()> {
    let previous = folder.join(PREVIOUS_DIR);
    if !previous.is_dir() {
      return Ok(());
    }
    for entry in fs::read_dir(folder)? {
      let entry = entry?;
      if is_page_file(&entry)? {
        fs::remove_file(entry.path())?;
      }
    }
    move_page_files(&previous, folder)?;
    fs::remove_dir(&previous)
  }

  // A missing folder is fine, there's nothing to delete.
  pub fn remove_issue_folder(
    &self,
    paper: Paper,
    issue_date: &NaiveDate
  ) -> io::Result<()> {
    remove_dir_if_exists(&self.issue_folder(paper, issue_date))
  }

  // Only ever give this names that went through
  // secure_filename.
  pub fn media_path(
    &self,
    paper: Paper,
    issue_date: &NaiveDate,
    filename: &str
  ) -> PathBuf {
    self.issue_folder(paper, issue_date).join(filename)
  }

}

fn is_page_file(entry: &fs::DirEntry) -> io::Result<bool> {
  Ok(
    entry.file_type()?.is_file()
      && is_page_filename(&entry.file_name().to_string_lossy())
  )
}

fn move_page_files(from: &Path, to: &Path) -> io::Result<()> {
  for entry in fs::read_dir(from)? {
    let entry = entry?;
    if is_page_file(&entry)? {
      debug!("Moving page image {:?} to {:?}", entry.path(), to);
      fs::rename(entry.path(), to.join(entry.file_name()))?;
    }
  }
  Ok(())
}

fn remove_dir_if_exists(path: &Path) -> io::Result<()> {
  match fs::remove_dir_all(path) {
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
    other => other
  }
}
