use crate::db::{DbPool, with_retry};
use crate::models::{AttendanceRecord, AttendanceStatus};
use crate::repo::{DeletePage, RepoError, get_user};
use crate::schema::attendance;
use anyhow::Result;
use chrono::NaiveDate;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

/// Fields needed to record attendance for one student on one day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAttendance {
    pub student_id: String,
    pub course_id: String,
    pub section_id: String,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    #[serde(default)]
    pub comment: String,
}

/// Optional filters for listing attendance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceFilter {
    pub year: Option<i32>,
    pub student_id: Option<String>,
    pub course_id: Option<String>,
    pub section_id: Option<String>,
    pub date: Option<NaiveDate>,
}

/// Records attendance, replacing any earlier record for the same student and day
///
/// ### Errors
///
/// Returns an error if the student does not exist or the database write fails.
#[instrument(skip(pool, entry), fields(student_id = %entry.student_id, date = %entry.date))]
pub async fn record_attendance(pool: &DbPool, entry: NewAttendance) -> Result<AttendanceRecord> {
    get_user(pool, &entry.student_id)?
        .ok_or_else(|| RepoError::NotFound(format!("Student {}", entry.student_id)))?;

    let record = AttendanceRecord::new(
        entry.student_id.clone(),
        entry.course_id,
        entry.section_id,
        entry.date,
        entry.status,
        entry.comment.trim().to_string(),
    );

    let conn = &mut pool.get()?;
    let stored = with_retry(|| {
        conn.transaction(|conn| {
            diesel::insert_into(attendance::table)
                .values(&record)
                .on_conflict((attendance::student_id, attendance::date))
                .do_update()
                .set((
                    attendance::course_id.eq(record.get_course_id()),
                    attendance::section_id.eq(record.get_section_id()),
                    attendance::status.eq(record.get_status()),
                    attendance::comment.eq(record.get_comment()),
                ))
                .execute(conn)?;

            attendance::table
                .filter(attendance::student_id.eq(&entry.student_id))
                .filter(attendance::date.eq(entry.date))
                .first::<AttendanceRecord>(conn)
        })
    })
    .await?;

    Ok(stored)
}

/// Lists attendance matching the filter, ordered by date then student
pub fn list_attendance(pool: &DbPool, filter: &AttendanceFilter) -> Result<Vec<AttendanceRecord>> {
    let conn = &mut pool.get()?;

    let mut query = attendance::table
        .order((attendance::date.asc(), attendance::student_id.asc()))
        .into_boxed();
    if let Some(year) = filter.year {
        query = query.filter(attendance::year.eq(year));
    }
    if let Some(student_id) = &filter.student_id {
        query = query.filter(attendance::student_id.eq(student_id.clone()));
    }
    if let Some(course_id) = &filter.course_id {
        query = query.filter(attendance::course_id.eq(course_id.clone()));
    }
    if let Some(section_id) = &filter.section_id {
        query = query.filter(attendance::section_id.eq(section_id.clone()));
    }
    if let Some(date) = filter.date {
        query = query.filter(attendance::date.eq(date));
    }

    Ok(query.load::<AttendanceRecord>(conn)?)
}

/// Deletes up to `limit` attendance records of a school year, in id order after `cursor`
///
/// Call repeatedly with the returned cursor while `more` is true.
#[instrument(skip(pool))]
pub async fn delete_attendance_by_year_page(
    pool: &DbPool,
    year: i32,
    limit: i64,
    cursor: Option<&str>,
) -> Result<DeletePage> {
    let conn = &mut pool.get()?;
    let after = cursor.unwrap_or("").to_string();

    let page = with_retry(|| {
        conn.transaction(|conn| {
            let ids: Vec<String> = attendance::table
                .filter(attendance::year.eq(year))
                .filter(attendance::id.gt(&after))
                .order(attendance::id.asc())
                .limit(limit)
                .select(attendance::id)
                .load(conn)?;

            let deleted =
                diesel::delete(attendance::table.filter(attendance::id.eq_any(&ids))).execute(conn)?;
            let last = ids.last().cloned();

            let remaining: i64 = match &last {
                Some(last) => attendance::table
                    .filter(attendance::year.eq(year))
                    .filter(attendance::id.gt(last))
                    .count()
                    .get_result(conn)?,
                None => 0,
            };

            Ok(DeletePage {
                year,
                deleted,
                more: remaining > 0,
                next_cursor: if remaining > 0 { last } else { None },
            })
        })
    })
    .await?;

    info!("Deleted {} attendance records of {}", page.deleted, year);
    Ok(page)
}
