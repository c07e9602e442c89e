use chrono::{DateTime, NaiveDate, Utc};
use derive_more::Display;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use crate::utils::text_utils::title_case;

// The site only ever publishes these two papers, so
// the key is an enum instead of free text. The string
// keys are what ends up in the database, in URLs and
// in folder names.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Paper {
  #[display(fmt = "todays_paper")]
  TodaysPaper,
  #[display(fmt = "namma_tumkur")]
  NammaTumkur
}

impl Paper {
  pub const ALL: [Paper; 2] = [Paper::TodaysPaper, Paper::NammaTumkur];

  pub fn key(&self) -> &'static str {
    match self {
      Paper::TodaysPaper => "todays_paper",
      Paper::NammaTumkur => "namma_tumkur"
    }
  }

  // "todays_paper" -> "Todays Paper"
  pub fn display_name(&self) -> String {
    title_case(&self.key().replace('_', " "))
  }
}

#[derive(Debug, Display, PartialEq)]
#[display(fmt = "Unknown paper: {}", _0)]
pub struct UnknownPaper(pub String);

impl std::error::Error for UnknownPaper {}

impl FromStr for Paper {
  type Err = UnknownPaper;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Paper::ALL.iter()
      .find(|p| p.key() == s)
      .copied()
      .ok_or_else(|| UnknownPaper(s.to_string()))
  }
}

impl ToSql for Paper {
  fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
    Ok(ToSqlOutput::from(self.key()))
  }
}

impl FromSql for Paper {
  fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
    value.as_str()?
      .parse()
      .map_err(|e| FromSqlError::Other(Box::new(e)))
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Issue {
  pub id: i64,
  pub paper: Paper,
  pub issue_date: NaiveDate,
  pub created_at: DateTime<Utc>
}

// What the dashboard lists.
#[derive(Debug)]
pub struct IssueSummary {
  pub issue: Issue,
  pub page_count: i64
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page {
  pub id: i64,
  pub issue_id: i64,
  pub page_no: u32,
  pub filename: String
}

// A page about to be inserted, the issue ID comes
// from whoever is replacing the page set.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPage {
  pub page_no: u32,
  pub filename: String
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
  pub id: i64,
  pub page_id: i64,
  pub x: f64,
  pub y: f64,
  pub width: f64,
  pub height: f64
}

// This is exactly what the block editor posts in its
// JSON array, so it doubles as the deserialization
// target.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewBlock {
  pub page_id: i64,
  pub x: f64,
  pub y: f64,
  pub width: f64,
  pub height: f64
}
