use serde::{Deserialize, Serialize};
use crate::db::entities::*;
use crate::utils::time_utils;
use super::flash::Flash;
use super::helpers;

// Entities go through these before reaching the
// templates: dates as strings, URLs precomputed so the
// templates don't have to know the route layout.

#[derive(Debug, Serialize)]
pub struct IssueDto {
  pub id: i64,
  pub paper: Paper,
  pub paper_name: String,
  pub issue_date: String,
  pub created_at: String,
  pub url: String
}

impl From<&Issue> for IssueDto {
  fn from(issue: &Issue) -> Self {
    let issue_date = time_utils::format_issue_date(&issue.issue_date);
    Self {
      id: issue.id,
      paper: issue.paper,
      paper_name: issue.paper.display_name(),
      url: helpers::issue_url(issue.paper, &issue_date),
      issue_date,
      created_at: time_utils::format_timestamp(&issue.created_at)
    }
  }
}

#[derive(Debug, Serialize)]
pub struct PageDto {
  pub id: i64,
  pub page_no: u32,
  pub filename: String,
  pub image_url: String
}

impl PageDto {
  // Needs the issue for the media URL.
  pub fn new(issue: &Issue, page: Page) -> Self {
    Self {
      id: page.id,
      page_no: page.page_no,
      image_url: helpers::media_url(
        issue.paper,
        &time_utils::format_issue_date(&issue.issue_date),
        &page.filename
      ),
      filename: page.filename
    }
  }

  pub fn from_pages(issue: &Issue, pages: Vec<Page>) -> Vec<Self> {
    pages.into_iter().map(|p| PageDto::new(issue, p)).collect()
  }
}

#[derive(Debug, Serialize)]
pub struct BlockDto {
  pub id: i64,
  pub page_id: i64,
  pub x: f64,
  pub y: f64,
  pub width: f64,
  pub height: f64,
  pub url: String
}

impl From<Block> for BlockDto {
  fn from(block: Block) -> Self {
    Self {
      url: helpers::block_url(block.id),
      id: block.id,
      page_id: block.page_id,
      x: block.x,
      y: block.y,
      width: block.width,
      height: block.height
    }
  }
}

// What the block editor script works with, same
// fields as what it posts back in blocks_data.
#[derive(Debug, Serialize, Deserialize)]
struct EditorBlock {
  page_id: i64,
  x: f64,
  y: f64,
  width: f64,
  height: f64
}

pub fn editor_blocks_json(blocks: &[Block]) -> String {
  let editor: Vec<EditorBlock> = blocks.iter()
    .map(|b| EditorBlock {
      page_id: b.page_id,
      x: b.x,
      y: b.y,
      width: b.width,
      height: b.height
    })
    .collect();
  // Serializing plain numbers can't fail.
  serde_json::to_string(&editor).unwrap_or_else(|_| "[]".to_string())
}

pub fn parse_blocks_data(raw: &str) -> Result<Vec<NewBlock>, serde_json::Error> {
  serde_json::from_str(raw)
}

/* --- Page models handed to handlebars --- */

#[derive(Serialize)]
pub struct PaperEdition {
  pub key: Paper,
  pub name: String,
  pub issue: Option<IssueDto>,
  pub pages: Vec<PageDto>
}

#[derive(Serialize)]
pub struct IndexView {
  pub today: String,
  pub editions: Vec<PaperEdition>,
  pub flashes: Vec<Flash>
}

#[derive(Serialize)]
pub struct IssueView {
  pub paper_name: String,
  pub issue_date: String,
  pub issue: IssueDto,
  pub pages: Vec<PageDto>,
  pub flashes: Vec<Flash>
}

#[derive(Serialize)]
pub struct LoginView {
  pub action: String,
  pub flashes: Vec<Flash>
}

#[derive(Serialize)]
pub struct PaperOption {
  pub key: Paper,
  pub name: String
}

impl From<Paper> for PaperOption {
  fn from(paper: Paper) -> Self {
    Self { key: paper, name: paper.display_name() }
  }
}

#[derive(Serialize)]
pub struct IssueRow {
  pub issue: IssueDto,
  pub page_count: i64,
  pub block_selector_url: String,
  pub delete_url: String
}

#[derive(Serialize)]
pub struct DashboardView {
  pub username: String,
  pub upload_action: String,
  pub logout_url: String,
  pub today: String,
  pub papers: Vec<PaperOption>,
  pub issues: Vec<IssueRow>,
  pub flashes: Vec<Flash>
}

#[derive(Serialize)]
pub struct BlockSelectorView {
  pub dashboard_url: String,
  pub save_action: String,
  pub issue: IssueDto,
  pub pages: Vec<PageDto>,
  pub blocks: Vec<BlockDto>,
  pub blocks_json: String,
  pub flashes: Vec<Flash>
}

#[derive(Serialize)]
pub struct BlockView {
  pub block: BlockDto,
  pub page: PageDto,
  pub issue: IssueDto
}
