use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use chrono::NaiveDate;
use derive_more::{Display, From};
use eyre::WrapErr;
use image::{DynamicImage, ImageFormat};
use log::{error, info, warn};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use crate::convert::{ConversionError, Rasterizer, RASTER_DPI};
use crate::db::{self, Pool};
use crate::db::entities::{Issue, NewPage, Page, Paper};
use crate::storage::{page_filename, Storage};

// Two admins re-uploading the same paper and date at
// the same time would interleave page deletion and
// image writes. Uploads for the same pair wait on each
// other here, different pairs don't.
#[derive(Default)]
pub struct UploadLocks {
  locks: Mutex<HashMap<(Paper, NaiveDate), Arc<AsyncMutex<()>>>>
}

impl UploadLocks {

  pub async fn acquire(&self, paper: Paper, issue_date: NaiveDate) -> OwnedMutexGuard<()> {
    let lock = {
      // Nothing can panic while holding this one, but
      // a poisoned map is still a perfectly good map.
      let mut locks = self.locks.lock()
        .unwrap_or_else(PoisonError::into_inner);
      // Entries only referenced by the map are idle.
      locks.retain(|_, l| Arc::strong_count(l) > 1);
      locks.entry((paper, issue_date)).or_default().clone()
    };
    lock.lock_owned().await
  }

}

// The uploaded file as the multipart extractor left it
// in the temp directory.
pub struct UploadedPdf {
  pub original_name: String,
  pub path: PathBuf
}

#[derive(Debug)]
pub struct ImportOutcome {
  pub issue: Issue,
  pub pages: Vec<Page>
}

#[derive(Debug, Display, From)]
pub enum ImportError {
  // Shown as-is to the admin.
  #[display(fmt = "PDF conversion failed: {}", _0)]
  Conversion(ConversionError),
  #[display(fmt = "Internal error")]
  Internal(eyre::Report)
}

/// Imports a PDF for (paper, date): finds or creates the
/// issue, saves the PDF next to its pages, renders every
/// page and swaps the page set in one go.
///
/// Pages are rendered into a staging directory first. If
/// rendering fails the previous pages (and their blocks)
/// are left alone; only the saved PDF stays behind.
/// Callers are expected to hold the UploadLocks guard for
/// the pair.
pub fn import_issue(
  pool: &Pool,
  storage: &Storage,
  rasterizer: &dyn Rasterizer,
  paper: Paper,
  issue_date: NaiveDate,
  upload: &UploadedPdf
) -> Result<ImportOutcome, ImportError> {
  // Committed right away so the issue has an ID before
  // we start touching files.
  let issue = db::find_or_create_issue(pool, paper, issue_date)?;
  let folder = storage.ensure_issue_folder(paper, &issue_date)
    .context("Creating issue folder")?;
  let pdf_path = storage.save_pdf(&folder, &upload.original_name, &upload.path)
    .context("Saving uploaded PDF")?;
  info!("Saved PDF for issue {} at {:?}", issue.id, pdf_path);

  let staging = storage.create_staging(&folder)
    .context("Creating staging directory")?;
  let new_pages = match render_pages(rasterizer, &pdf_path, &staging) {
    Ok(pages) => pages,
    Err(e) => {
      warn!("Conversion of {:?} failed - {}", pdf_path, e);
      storage.discard_staging(&staging);
      return Err(ImportError::Conversion(e));
    }
  };

  let pages = swap_pages(pool, storage, issue.id, &folder, &staging, &new_pages)
    .map_err(ImportError::Internal)?;
  info!(
    "Issue {} ({} {}) now has {} pages",
    issue.id, paper, issue_date, pages.len()
  );
  Ok(ImportOutcome { issue, pages })
}

// The files move while the page rows are still
// uncommitted. If anything fails from there on, the
// rows roll back and the old page files have to come
// back with them.
fn swap_pages(
  pool: &Pool,
  storage: &Storage,
  issue_id: i64,
  folder: &Path,
  staging: &Path,
  new_pages: &[NewPage]
) -> eyre::Result<Vec<Page>> {
  let result = db::replace_pages(pool, issue_id, new_pages, || {
    storage.promote_staged(folder, staging)
      .map(|_| ())
      .context("Moving rendered pages in place")
  });
  match result {
    Ok(pages) => {
      storage.drop_previous_pages(folder);
      Ok(pages)
    },
    Err(e) => {
      warn!("Page swap for issue {} failed, restoring previous pages", issue_id);
      if let Err(restore_error) = storage.restore_previous_pages(folder) {
        error!(
          "Could not restore previous pages of issue {} in {:?} - {}",
          issue_id, folder, restore_error
        );
      }
      storage.discard_staging(staging);
      Err(e)
    }
  }
}

// Writes page_1.png, page_2.png... into `staging`, in
// the order the rasterizer hands them over.
fn render_pages(
  rasterizer: &dyn Rasterizer,
  pdf_path: &Path,
  staging: &Path
) -> Result<Vec<NewPage>, ConversionError> {
  let mut pages: Vec<NewPage> = Vec::new();
  let mut sink = |image: DynamicImage| -> Result<(), ConversionError> {
    let page_no = pages.len() as u32 + 1;
    let filename = page_filename(page_no);
    image.save_with_format(staging.join(&filename), ImageFormat::Png)
      .map_err(|e| ConversionError::Output(page_no as usize, e.to_string()))?;
    pages.push(NewPage { page_no, filename });
    Ok(())
  };
  rasterizer.rasterize(pdf_path, RASTER_DPI, &mut sink)?;
  Ok(pages)
}

#[cfg(test)]
pub mod tests {
  use super::*;
  use image::{ImageBuffer, Rgb};
  use std::fs;
  use tempfile::TempDir;

  // Stand-in for pdfium: hands out `pages` tiny images,
  // each page a bit wider than the previous one so tests
  // can tell them apart.
  pub struct FakeRasterizer {
    pub pages: u32
  }

  impl Rasterizer for FakeRasterizer {
    fn rasterize(
      &self,
      _pdf_path: &Path,
      dpi: u16,
      sink: &mut dyn FnMut(DynamicImage) -> Result<(), ConversionError>
    ) -> Result<usize, ConversionError> {
      assert_eq!(dpi, RASTER_DPI);
      for n in 1..=self.pages {
        let buffer = ImageBuffer::from_pixel(n, 2, Rgb([255u8, 255, 255]));
        sink(DynamicImage::ImageRgb8(buffer))?;
      }
      Ok(self.pages as usize)
    }
  }

  // Renders one page then blows up, like pdfium choking
  // on a broken page halfway through.
  pub struct FailingRasterizer;

  impl Rasterizer for FailingRasterizer {
    fn rasterize(
      &self,
      _pdf_path: &Path,
      _dpi: u16,
      sink: &mut dyn FnMut(DynamicImage) -> Result<(), ConversionError>
    ) -> Result<usize, ConversionError> {
      sink(DynamicImage::ImageRgb8(ImageBuffer::new(1, 1)))?;
      Err(ConversionError::Render(2, "corrupt content stream".to_string()))
    }
  }

  struct Fixture {
    dir: TempDir,
    pool: Pool,
    storage: Storage
  }

  fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let pool = db::open_pool(dir.path().join("test.db").to_str().unwrap()).unwrap();
    let storage = Storage::open(dir.path().join("uploads").to_str().unwrap()).unwrap();
    Fixture { dir, pool, storage }
  }

  fn upload(fixture: &Fixture, name: &str) -> UploadedPdf {
    let path = fixture.dir.path().join("upload.tmp");
    fs::write(&path, b"%PDF-1.4 fake").unwrap();
    UploadedPdf { original_name: name.to_string(), path }
  }

  fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
  }

  fn folder_listing(folder: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(folder).unwrap()
      .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
      .collect();
    names.sort();
    names
  }

  #[test]
  fn two_page_upload_creates_issue_pages_and_files() {
    let f = fixture();
    let outcome = import_issue(
      &f.pool, &f.storage, &FakeRasterizer { pages: 2 },
      Paper::TodaysPaper, date("2024-06-01"), &upload(&f, "sample.pdf")
    ).unwrap();

    assert_eq!(outcome.issue.paper, Paper::TodaysPaper);
    assert_eq!(outcome.issue.issue_date, date("2024-06-01"));
    let pages: Vec<(u32, String)> = db::pages_for_issue(&f.pool, outcome.issue.id)
      .unwrap()
      .into_iter()
      .map(|p| (p.page_no, p.filename))
      .collect();
    assert_eq!(pages, vec![
      (1, "page_1.png".to_string()),
      (2, "page_2.png".to_string())
    ]);
    let folder = f.dir.path().join("uploads/todays_paper/2024-06-01");
    assert_eq!(folder_listing(&folder), vec!["page_1.png", "page_2.png", "sample.pdf"]);
    // Page order is the rasterizer's order:
    let second = image::open(folder.join("page_2.png")).unwrap();
    assert_eq!(second.width(), 2);
  }

  #[test]
  fn re_upload_reuses_the_issue_and_drops_stale_pages() {
    let f = fixture();
    let first = import_issue(
      &f.pool, &f.storage, &FakeRasterizer { pages: 3 },
      Paper::NammaTumkur, date("2024-06-01"), &upload(&f, "long.pdf")
    ).unwrap();
    let second = import_issue(
      &f.pool, &f.storage, &FakeRasterizer { pages: 1 },
      Paper::NammaTumkur, date("2024-06-01"), &upload(&f, "short.pdf")
    ).unwrap();

    assert_eq!(first.issue.id, second.issue.id);
    assert_eq!(db::pages_for_issue(&f.pool, first.issue.id).unwrap().len(), 1);
    let folder = f.dir.path().join("uploads/namma_tumkur/2024-06-01");
    assert_eq!(
      folder_listing(&folder),
      vec!["long.pdf", "page_1.png", "short.pdf"]
    );
  }

  #[test]
  fn failed_conversion_keeps_previous_pages_and_the_new_pdf() {
    let f = fixture();
    let first = import_issue(
      &f.pool, &f.storage, &FakeRasterizer { pages: 2 },
      Paper::TodaysPaper, date("2024-06-01"), &upload(&f, "good.pdf")
    ).unwrap();
    let result = import_issue(
      &f.pool, &f.storage, &FailingRasterizer,
      Paper::TodaysPaper, date("2024-06-01"), &upload(&f, "bad.pdf")
    );

    match result {
      Err(ImportError::Conversion(e)) =>
        assert_eq!(e.to_string(), "could not render page 2: corrupt content stream"),
      other => panic!("expected a conversion error, got {:?}", other)
    }
    assert_eq!(db::pages_for_issue(&f.pool, first.issue.id).unwrap(), first.pages);
    let folder = f.dir.path().join("uploads/todays_paper/2024-06-01");
    assert_eq!(
      folder_listing(&folder),
      vec!["bad.pdf", "good.pdf", "page_1.png", "page_2.png"]
    );
  }

  #[test]
  fn failed_first_upload_leaves_an_empty_issue() {
    let f = fixture();
    let result = import_issue(
      &f.pool, &f.storage, &FailingRasterizer,
      Paper::TodaysPaper, date("2024-06-02"), &upload(&f, "bad.pdf")
    );
    assert!(matches!(result, Err(ImportError::Conversion(_))));
    let issue = db::issue_by_paper_and_date(&f.pool, Paper::TodaysPaper, date("2024-06-02"))
      .unwrap()
      .unwrap();
    assert!(db::pages_for_issue(&f.pool, issue.id).unwrap().is_empty());
  }

  #[test]
  fn failed_commit_puts_the_previous_pages_back() {
    let f = fixture();
    let first = import_issue(
      &f.pool, &f.storage, &FakeRasterizer { pages: 2 },
      Paper::TodaysPaper, date("2024-06-01"), &upload(&f, "good.pdf")
    ).unwrap();

    // A reader in the middle of a transaction keeps the
    // commit from ever getting its exclusive lock.
    let reader = rusqlite::Connection::open(f.dir.path().join("test.db")).unwrap();
    reader.execute_batch("BEGIN").unwrap();
    let count: i64 = reader
      .query_row("SELECT COUNT(*) FROM pages", [], |row| row.get(0))
      .unwrap();
    assert_eq!(count, 2);

    let folder = f.dir.path().join("uploads/todays_paper/2024-06-01");
    let staging = f.storage.create_staging(&folder).unwrap();
    let mut new_pages = Vec::new();
    for page_no in 1..=3 {
      let filename = page_filename(page_no);
      fs::write(staging.join(&filename), b"new").unwrap();
      new_pages.push(NewPage { page_no, filename });
    }
    let result = swap_pages(
      &f.pool, &f.storage, first.issue.id, &folder, &staging, &new_pages
    );
    reader.execute_batch("ROLLBACK").unwrap();

    assert!(result.is_err());
    assert_eq!(db::pages_for_issue(&f.pool, first.issue.id).unwrap(), first.pages);
    assert_eq!(
      folder_listing(&folder),
      vec!["good.pdf", "page_1.png", "page_2.png"]
    );
    let second = image::open(folder.join("page_2.png")).unwrap();
    assert_eq!(second.width(), 2);
  }

  #[actix_web::test]
  async fn locks_are_per_issue() {
    let locks = UploadLocks::default();
    let guard = locks.acquire(Paper::TodaysPaper, date("2024-06-01")).await;
    // A different pair doesn't wait:
    let other = locks.acquire(Paper::NammaTumkur, date("2024-06-01")).await;
    drop(other);
    let same = locks.locks.lock().unwrap()
      .get(&(Paper::TodaysPaper, date("2024-06-01")))
      .cloned()
      .unwrap();
    assert!(same.try_lock().is_err());
    drop(guard);
    assert!(same.try_lock().is_ok());
  }
}
