use rusqlite::{params, Params, Row, OptionalExtension};
use r2d2_sqlite::SqliteConnectionManager;
use chrono::{NaiveDate, Utc};
use std::collections::HashSet;
pub mod entities;
mod mappers;
use eyre::WrapErr;
use color_eyre::Result;
use entities::*;
use mappers::*;

// Type alias to make function signatures much clearer:
pub type Pool = r2d2::Pool<SqliteConnectionManager>;

// Column lists, kept in the same order as what the
// mappers expect.
const ISSUE_FIELDS: &str =
  "issues.id, issues.paper, issues.issue_date, issues.created_at";
const PAGE_FIELDS: &str =
  "pages.id, pages.issue_id, pages.page_no, pages.filename";
const BLOCK_FIELDS: &str =
  "blocks.id, blocks.page_id, blocks.x, blocks.y, blocks.width, blocks.height";

// AUTOINCREMENT so that IDs of deleted issues and blocks
// never come back for something else, the block view
// is public by ID.
const SCHEMA: &str = "
  CREATE TABLE IF NOT EXISTS issues (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    paper TEXT NOT NULL,
    issue_date TEXT NOT NULL,
    created_at TEXT NOT NULL,
    CONSTRAINT uix_paper_date UNIQUE (paper, issue_date)
  );
  CREATE TABLE IF NOT EXISTS pages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    issue_id INTEGER NOT NULL REFERENCES issues(id) ON DELETE CASCADE,
    page_no INTEGER NOT NULL,
    filename TEXT NOT NULL,
    CONSTRAINT uix_issue_page_no UNIQUE (issue_id, page_no)
  );
  CREATE TABLE IF NOT EXISTS blocks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    page_id INTEGER NOT NULL REFERENCES pages(id) ON DELETE CASCADE,
    x REAL NOT NULL,
    y REAL NOT NULL,
    width REAL NOT NULL,
    height REAL NOT NULL
  );
  CREATE INDEX IF NOT EXISTS idx_blocks_page_id ON blocks (page_id);
";

/**
 * All of the DB stuff is done in a non-async way, the
 * handlers that do heavy lifting move it to the blocking
 * thread pool themselves.
 */

// Cascading deletes only work with foreign keys enabled,
// and SQLite wants that pragma on every single connection.
pub fn open_pool(db_path: &str) -> Result<Pool> {
  let manager = SqliteConnectionManager::file(db_path)
    .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
  let pool = Pool::new(manager)
    .context("Opening the database connection pool")?;
  create_schema(&pool)?;
  Ok(pool)
}

fn create_schema(pool: &Pool) -> Result<()> {
  let conn = pool.get()?;
  conn.execute_batch(SCHEMA)
    .context("Creating the database schema")
}

// Stole most of the signature from the rustqlite doc.
fn select_many<T, P, F>(
  pool: &Pool,
  query: &str,
  params: P,
  mapper: F
) -> Result<Vec<T>>
  where
    P: Params,
    F: FnMut(&Row<'_>) -> Result<T, rusqlite::Error>,
{
  let conn = pool.get()?;
  let mut stmt = conn.prepare(query)?;
  stmt.query_map(params, mapper)
    .and_then(Iterator::collect)
    .context("Generic select_many query")
}

fn select_one<T, P, F>(
  pool: &Pool,
  query: &str,
  params: P,
  mapper: F
) -> Result<Option<T>>
  where
    P: Params,
    F: FnOnce(&Row<'_>) -> Result<T, rusqlite::Error>,
{
  let conn = pool.get()?;
  let mut stmt = conn.prepare(query)?;
  stmt.query_row(params, mapper)
    .optional()
    .context("Generic select_one query")
}

pub fn all_issue_summaries(pool: &Pool) -> Result<Vec<IssueSummary>> {
  select_many(
    pool,
    &format!(
      "SELECT {}, COUNT(pages.id) FROM issues
      LEFT JOIN pages ON pages.issue_id = issues.id
      GROUP BY issues.id
      ORDER BY issues.issue_date DESC, issues.paper ASC",
      ISSUE_FIELDS
    ),
    params![],
    map_issue_summary
  )
}

pub fn issue_by_id(pool: &Pool, issue_id: i64) -> Result<Option<Issue>> {
  select_one(
    pool,
    &format!("SELECT {} FROM issues WHERE id = ?", ISSUE_FIELDS),
    params![issue_id],
    map_issue
  )
}

pub fn issue_by_paper_and_date(
  pool: &Pool,
  paper: Paper,
  issue_date: NaiveDate
) -> Result<Option<Issue>> {
  select_one(
    pool,
    &format!(
      "SELECT {} FROM issues WHERE paper = ? AND issue_date = ?",
      ISSUE_FIELDS
    ),
    params![paper, issue_date],
    map_issue
  )
}

// The unique constraint does the heavy lifting: two
// uploads racing for the same pair both end up with
// the same row.
pub fn find_or_create_issue(
  pool: &Pool,
  paper: Paper,
  issue_date: NaiveDate
) -> Result<Issue> {
  let conn = pool.get()?;
  conn.execute(
    "INSERT INTO issues (paper, issue_date, created_at) VALUES (?, ?, ?)
    ON CONFLICT (paper, issue_date) DO NOTHING",
    params![paper, issue_date, Utc::now()]
  ).context("Inserting issue")?;
  conn.query_row(
    &format!(
      "SELECT {} FROM issues WHERE paper = ? AND issue_date = ?",
      ISSUE_FIELDS
    ),
    params![paper, issue_date],
    map_issue
  ).context("Reading back issue after insert")
}

// Returns false when there was nothing to delete.
// Pages and blocks go away through the cascade.
pub fn delete_issue(pool: &Pool, issue_id: i64) -> Result<bool> {
  let conn = pool.get()?;
  let count = conn.execute(
    "DELETE FROM issues WHERE id = ?",
    params![issue_id]
  ).context("Deleting issue")?;
  Ok(count > 0)
}

pub fn pages_for_issue(pool: &Pool, issue_id: i64) -> Result<Vec<Page>> {
  select_many(
    pool,
    &format!(
      "SELECT {} FROM pages WHERE issue_id = ? ORDER BY page_no ASC",
      PAGE_FIELDS
    ),
    params![issue_id],
    map_page
  )
}

pub fn page_by_id(pool: &Pool, page_id: i64) -> Result<Option<Page>> {
  select_one(
    pool,
    &format!("SELECT {} FROM pages WHERE id = ?", PAGE_FIELDS),
    params![page_id],
    map_page
  )
}

pub fn page_by_issue_and_filename(
  pool: &Pool,
  issue_id: i64,
  filename: &str
) -> Result<Option<Page>> {
  select_one(
    pool,
    &format!(
      "SELECT {} FROM pages WHERE issue_id = ? AND filename = ?",
      PAGE_FIELDS
    ),
    params![issue_id, filename],
    map_page
  )
}

/// Swaps the whole page set of an issue for `pages` in a
/// single transaction. Blocks of the old pages go with
/// them.
///
/// `before_commit` runs once the new rows are in but not
/// yet committed; the upload uses it to move the rendered
/// images in place. If it fails, everything is rolled back.
pub fn replace_pages<F>(
  pool: &Pool,
  issue_id: i64,
  pages: &[NewPage],
  before_commit: F
) -> Result<Vec<Page>>
  where F: FnOnce() -> Result<()>
{
  let mut conn = pool.get()?;
  let tx = conn.transaction()?;
  tx.execute("DELETE FROM pages WHERE issue_id = ?", params![issue_id])
    .context("Deleting previous pages")?;
  let inserted = {
    let mut insert = tx.prepare(
      "INSERT INTO pages (issue_id, page_no, filename) VALUES (?, ?, ?)"
    )?;
    let mut inserted = Vec::with_capacity(pages.len());
    for page in pages {
      insert.execute(params![issue_id, page.page_no, page.filename])
        .context("Inserting page")?;
      inserted.push(Page {
        id: tx.last_insert_rowid(),
        issue_id,
        page_no: page.page_no,
        filename: page.filename.clone()
      });
    }
    inserted
  };
  // Dropping the transaction without committing rolls
  // it back, so the ? is enough here.
  before_commit()?;
  tx.commit().context("Committing page replacement")?;
  Ok(inserted)
}

pub fn block_by_id(pool: &Pool, block_id: i64) -> Result<Option<Block>> {
  select_one(
    pool,
    &format!("SELECT {} FROM blocks WHERE id = ?", BLOCK_FIELDS),
    params![block_id],
    map_block
  )
}

pub fn blocks_for_issue(pool: &Pool, issue_id: i64) -> Result<Vec<Block>> {
  select_many(
    pool,
    &format!(
      "SELECT {} FROM blocks, pages
      WHERE blocks.page_id = pages.id AND pages.issue_id = ?
      ORDER BY pages.page_no ASC, blocks.id ASC",
      BLOCK_FIELDS
    ),
    params![issue_id],
    map_block
  )
}

#[derive(Debug, PartialEq)]
pub enum BlockReplacement {
  Saved(usize),
  // The first submitted page ID that isn't a page of
  // the issue. Nothing gets written in that case.
  ForeignPage(i64)
}

/// Replaces every block drawn on the pages of an issue by
/// `blocks`, in one transaction. All page references are
/// checked against the issue first.
pub fn replace_blocks(
  pool: &Pool,
  issue_id: i64,
  blocks: &[NewBlock]
) -> Result<BlockReplacement> {
  let mut conn = pool.get()?;
  let tx = conn.transaction()?;
  let page_ids: HashSet<i64> = {
    let mut stmt = tx.prepare("SELECT id FROM pages WHERE issue_id = ?")?;
    let ids = stmt.query_map(params![issue_id], |row| row.get(0))?
      .collect::<Result<HashSet<i64>, rusqlite::Error>>()?;
    ids
  };
  if let Some(foreign) = blocks.iter().find(|b| !page_ids.contains(&b.page_id)) {
    return Ok(BlockReplacement::ForeignPage(foreign.page_id));
  }
  tx.execute(
    "DELETE FROM blocks WHERE page_id IN
    (SELECT id FROM pages WHERE issue_id = ?)",
    params![issue_id]
  ).context("Deleting previous blocks")?;
  {
    let mut insert = tx.prepare(
      "INSERT INTO blocks (page_id, x, y, width, height) VALUES (?, ?, ?, ?, ?)"
    )?;
    for block in blocks {
      insert.execute(
        params![block.page_id, block.x, block.y, block.width, block.height]
      ).context("Inserting block")?;
    }
  }
  tx.commit().context("Committing block replacement")?;
  Ok(BlockReplacement::Saved(blocks.len()))
}
