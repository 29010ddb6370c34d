use axum::Json;
use tracing::{info, warn};

use crate::db::DbPool;
use crate::dto::{DeleteByYearDto, DeleteByYearQuery};
use crate::errors::ApiError;
use crate::repo::{self, DeletePage};

/// Record kinds that can be purged one school year at a time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum YearlyRecords {
    Grades,
    Attendance,
}

impl YearlyRecords {
    fn label(self) -> &'static str {
        match self {
            YearlyRecords::Grades => "grades",
            YearlyRecords::Attendance => "attendance",
        }
    }

    async fn delete_page(
        self,
        pool: &DbPool,
        year: i32,
        limit: i64,
        cursor: Option<&str>,
    ) -> anyhow::Result<DeletePage> {
        match self {
            YearlyRecords::Grades => repo::delete_grades_by_year_page(pool, year, limit, cursor).await,
            YearlyRecords::Attendance => repo::delete_attendance_by_year_page(pool, year, limit, cursor).await,
        }
    }
}

/// Deletes the records of a school year
///
/// Refuses unless the query confirms with `doit=1`. A paged request deletes
/// one page and hands back the cursor; otherwise pages are deleted until
/// the year is empty.
pub(crate) async fn delete_by_year(
    pool: &DbPool,
    records: YearlyRecords,
    year: i32,
    query: DeleteByYearQuery,
) -> Result<Json<DeleteByYearDto>, ApiError> {
    if !query.confirmed() {
        warn!("Refusing to delete {} of {} without confirmation", records.label(), year);
        return Err(ApiError::BadRequest(format!(
            "deleting {} of {} requires doit=1",
            records.label(),
            year
        )));
    }

    let limit = repo::clamp_page_limit(query.limit);
    let mut totals = DeleteByYearDto::empty(year);
    let mut cursor = query.cursor.clone();

    loop {
        let page = records
            .delete_page(pool, year, limit, cursor.as_deref())
            .await
            .map_err(ApiError::from_repo)?;
        cursor = page.next_cursor.clone();
        let more = page.more;
        totals.add_page(page);

        if query.single_page() || !more {
            break;
        }
    }

    info!(
        "Deleted {} {} records of {} in {} pages",
        totals.deleted,
        records.label(),
        year,
        totals.pages
    );
    Ok(Json(totals))
}
