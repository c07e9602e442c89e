use super::entities::*;
use rusqlite::{Row, Error};

// Column order has to match the ISSUE_FIELDS / PAGE_FIELDS /
// BLOCK_FIELDS constants in the parent module.

pub fn map_issue(row: &Row) -> Result<Issue, Error> {
  Ok(Issue {
    id: row.get(0)?,
    paper: row.get(1)?,
    issue_date: row.get(2)?,
    created_at: row.get(3)?
  })
}

pub fn map_issue_summary(row: &Row) -> Result<IssueSummary, Error> {
  Ok(IssueSummary {
    issue: map_issue(row)?,
    page_count: row.get(4)?
  })
}

pub fn map_page(row: &Row) -> Result<Page, Error> {
  Ok(Page {
    id: row.get(0)?,
    issue_id: row.get(1)?,
    page_no: row.get(2)?,
    filename: row.get(3)?
  })
}

pub fn map_block(row: &Row) -> Result<Block, Error> {
  Ok(Block {
    id: row.get(0)?,
    page_id: row.get(1)?,
    x: row.get(2)?,
    y: row.get(3)?,
    width: row.get(4)?,
    height: row.get(5)?
  })
}
