pub mod assignment;
pub mod attendance;
pub mod course;
pub mod export;
pub mod grade;
pub mod import;
pub mod maintenance;
pub mod notification;
pub mod ocr;
pub mod section;
pub mod slides;
pub mod task;
pub mod user;

use clap::Args;
use smart_student::dto::DeleteByYearQuery;

/// Arguments shared by the delete-year commands of grades and attendance
#[derive(Args, Debug)]
pub struct DeleteYearArgs {
    /// Calendar year whose records are deleted
    pub year: i32,
    /// Actually delete; without it the server refuses
    #[clap(long)]
    pub yes: bool,
    /// Delete a single page and report the cursor for the next one
    #[clap(long)]
    pub paged: bool,
    /// Records per page
    #[clap(long)]
    pub limit: Option<i64>,
    /// Resume after this record id
    #[clap(long)]
    pub cursor: Option<String>,
}

impl DeleteYearArgs {
    pub fn query(&self) -> DeleteByYearQuery {
        let flag = |on: bool| on.then(|| "1".to_string());
        DeleteByYearQuery {
            doit: flag(self.yes),
            paged: flag(self.paged),
            limit: self.limit,
            cursor: self.cursor.clone(),
        }
    }
}
