//! CSV import and export
//!
//! Three formats are understood:
//!
//! * users: `role,name,rut,email,username,password,course,section,subjects`
//! * grades: `nombre,rut,curso,seccion,asignatura,tipo,fecha,nota,tema`
//! * attendance: `date,course,section,studentUsername,rut,name,status,comment`
//!
//! Headers are matched case-insensitively and a few aliases are accepted for
//! each column. A bad line never stops the parse: it is recorded as a
//! [`LineError`] and the remaining lines are still read.

use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::calendar::{self, GeneratedAttendance, RosterEntry, SchoolCalendar};
use crate::course_section::display_name;
use crate::db::DbPool;
use crate::models::{
    ActivityType, AttendanceStatus, Course, NewGrade, NewUser, Section, User, UserRole, UserUpdate,
    is_valid_score,
};
use crate::repo::{self, AssignmentFilter, AttendanceFilter, GradeFilter, NewAttendance, RepoError};
use crate::rut::canonical_rut;

/// Username recorded as the creator of assignments made by a CSV import
pub const CSV_IMPORT_ACTOR: &str = "csv-import";

pub const USERS_HEADER: &str = "role,name,rut,email,username,password,course,section,subjects";
pub const GRADES_HEADER: &str = "nombre,rut,curso,seccion,asignatura,tipo,fecha,nota,tema";
pub const ATTENDANCE_HEADER: &str = "date,course,section,studentUsername,rut,name,status,comment";

/// A problem with one line of a CSV file
///
/// `line` is the 1-based line number in the file, header included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineError {
    pub line: usize,
    pub message: String,
}

impl LineError {
    fn new(line: usize, message: impl Into<String>) -> Self {
        Self { line, message: message.into() }
    }
}

/// Rows parsed from a CSV file along with the lines that were rejected
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parsed<T> {
    pub rows: Vec<(usize, T)>,
    pub errors: Vec<LineError>,
}

impl<T> Default for Parsed<T> {
    fn default() -> Self {
        Self { rows: Vec::new(), errors: Vec::new() }
    }
}

/// Outcome of importing a CSV file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsvImportReport {
    pub imported: usize,
    pub skipped: usize,
    pub errors: Vec<LineError>,
}

fn non_empty_trimmed(s: &str) -> Option<String> {
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}

/// Splits one CSV line into fields
///
/// Fields may be wrapped in double quotes; inside quotes a comma is literal
/// and `""` stands for one quote.
pub fn parse_csv_record(line: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut buf = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                buf.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => out.push(std::mem::take(&mut buf)),
            _ => buf.push(ch),
        }
    }
    out.push(buf);
    out
}

/// Quotes a field if it contains a separator, a quote or a line break
pub fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn csv_line<I, S>(fields: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    fields
        .into_iter()
        .map(|f| csv_quote(f.as_ref()))
        .collect::<Vec<_>>()
        .join(",")
}

/// Column positions of a header row, keyed by lower-cased name
struct Header {
    columns: HashMap<String, usize>,
}

impl Header {
    fn parse(line: &str) -> Self {
        let columns = parse_csv_record(line.trim_start_matches('\u{feff}'))
            .into_iter()
            .enumerate()
            .map(|(i, name)| (name.trim().to_lowercase(), i))
            .collect();
        Self { columns }
    }

    fn index(&self, aliases: &[&str]) -> Option<usize> {
        aliases.iter().find_map(|alias| self.columns.get(*alias).copied())
    }

    fn has_any(&self, aliases: &[&str]) -> bool {
        self.index(aliases).is_some()
    }

    /// The trimmed value of the first alias present in the header
    fn get<'a>(&self, record: &'a [String], aliases: &[&str]) -> &'a str {
        self.index(aliases)
            .and_then(|i| record.get(i))
            .map(|v| v.trim())
            .unwrap_or("")
    }
}

/// Splits CSV text into records, each tagged with the file line it starts on
///
/// A line break inside a quoted field belongs to the field, so one record can
/// span several physical lines. A trailing `\r` is dropped from each record.
pub fn split_csv_records(text: &str) -> Vec<(usize, String)> {
    let mut records = Vec::new();
    let mut buf = String::new();
    let mut in_quotes = false;
    let mut line = 1;
    let mut start = 1;

    for ch in text.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                buf.push(ch);
            }
            '\n' if !in_quotes => {
                let record = std::mem::take(&mut buf);
                records.push((start, record.trim_end_matches('\r').to_string()));
                line += 1;
                start = line;
            }
            '\n' => {
                buf.push(ch);
                line += 1;
            }
            _ => buf.push(ch),
        }
    }
    if !buf.is_empty() {
        records.push((start, buf.trim_end_matches('\r').to_string()));
    }

    records
}

/// Reads the header and data records, handing each non-blank record to `parse_row`
fn parse_lines<T>(
    text: &str,
    required: &[&[&str]],
    mut parse_row: impl FnMut(&Header, &[String]) -> Result<T, String>,
) -> Parsed<T> {
    let mut parsed = Parsed::default();
    let mut records = split_csv_records(text)
        .into_iter()
        .filter(|(_, record)| !record.trim().is_empty());

    let Some((header_line, header_record)) = records.next() else {
        parsed.errors.push(LineError::new(1, "file is empty"));
        return parsed;
    };
    let header = Header::parse(&header_record);
    let missing: Vec<&str> = required
        .iter()
        .filter(|aliases| !header.has_any(aliases))
        .map(|aliases| aliases[0])
        .collect();
    if !missing.is_empty() {
        parsed
            .errors
            .push(LineError::new(header_line, format!("missing columns: {}", missing.join(", "))));
        return parsed;
    }

    for (line_number, record) in records {
        let record = parse_csv_record(&record);
        match parse_row(&header, &record) {
            Ok(row) => parsed.rows.push((line_number, row)),
            Err(message) => parsed.errors.push(LineError::new(line_number, message)),
        }
    }

    parsed
}

/// Parses a date written as `YYYY-MM-DD`, `YYYY/MM/DD`, `DD-MM-YYYY` or
/// `DD/MM/YYYY` (dots also work as separators)
pub fn parse_flexible_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if raw.contains('T') || raw.contains(':') {
        return DateTime::parse_from_rfc3339(raw).ok().map(|d| d.date_naive());
    }

    let parts: Vec<&str> = raw.split(['-', '/', '.']).collect();
    let [a, b, c] = parts.as_slice() else {
        return None;
    };
    let (year, month, day) = if a.len() == 4 { (a, b, c) } else { (c, b, a) };
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}

/// A date at noon UTC, so that no timezone shifts it to a neighbouring day
fn at_noon(date: NaiveDate) -> DateTime<Utc> {
    NaiveDateTime::new(date, NaiveTime::from_hms_opt(12, 0, 0).unwrap_or_default()).and_utc()
}

/// Parses a score in 0–100; a decimal comma is accepted
pub fn parse_score(raw: &str) -> Option<f64> {
    let score: f64 = raw.trim().replace(',', ".").parse().ok()?;
    is_valid_score(score).then_some(score)
}

fn parse_role(raw: &str) -> Option<UserRole> {
    match raw.trim().to_lowercase().as_str() {
        "student" | "estudiante" | "alumno" => Some(UserRole::Student),
        "teacher" | "profesor" | "docente" => Some(UserRole::Teacher),
        "admin" | "administrador" => Some(UserRole::Admin),
        _ => None,
    }
}

/// Parses an attendance status in English or Spanish
pub fn parse_attendance_status(raw: &str) -> Option<AttendanceStatus> {
    match raw.trim().to_lowercase().as_str() {
        "present" | "presente" | "p" => Some(AttendanceStatus::Present),
        "absent" | "ausente" | "a" => Some(AttendanceStatus::Absent),
        "late" | "tarde" | "atrasado" | "atraso" => Some(AttendanceStatus::Late),
        "excused" | "justified" | "justificado" => Some(AttendanceStatus::Excused),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// One line of the users CSV
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRow {
    pub role: UserRole,
    pub name: String,
    pub rut: Option<String>,
    pub email: Option<String>,
    pub username: String,
    pub password: String,
    pub course: Option<String>,
    pub section: Option<String>,
    pub subjects: Vec<String>,
}

/// Parses the users CSV
///
/// `subjects` may be separated by `;` or `|`. A course and a section must be
/// given together.
pub fn parse_users_csv(text: &str) -> Parsed<UserRow> {
    const REQUIRED: &[&[&str]] = &[&["role", "rol"], &["name", "nombre"], &["username", "usuario"]];

    parse_lines(text, REQUIRED, |header, record| {
        let raw_role = header.get(record, &["role", "rol"]);
        let role = parse_role(raw_role).ok_or_else(|| format!("unknown role '{}'", raw_role))?;
        let name = header.get(record, &["name", "nombre"]);
        let username = header.get(record, &["username", "usuario"]);
        let password = header.get(record, &["password", "contraseña", "clave"]);
        if name.is_empty() || username.is_empty() || password.is_empty() {
            return Err("name, username and password are required".to_string());
        }

        let rut = match non_empty_trimmed(header.get(record, &["rut"])) {
            Some(raw) => Some(canonical_rut(&raw).ok_or_else(|| format!("invalid RUT '{}'", raw))?),
            None => None,
        };
        let course = non_empty_trimmed(header.get(record, &["course", "curso"]));
        let section = non_empty_trimmed(header.get(record, &["section", "seccion", "sección"]));
        if course.is_some() != section.is_some() {
            return Err("course and section must be given together".to_string());
        }

        let subjects = header
            .get(record, &["subjects", "asignaturas"])
            .split([';', '|'])
            .filter_map(non_empty_trimmed)
            .collect();

        Ok(UserRow {
            role,
            name: name.to_string(),
            rut,
            email: non_empty_trimmed(header.get(record, &["email", "correo"])),
            username: username.to_string(),
            password: password.to_string(),
            course,
            section,
            subjects,
        })
    })
}

/// Imports the users CSV
///
/// Students with a course and section are assigned to it, creating the course
/// and section when needed. Teachers with a course, a section and subjects
/// become the assigned teacher for those subjects of every student in that
/// section. Existing usernames are skipped.
#[instrument(skip(pool, text))]
pub async fn import_users_csv(pool: &DbPool, text: &str) -> Result<CsvImportReport> {
    let parsed = parse_users_csv(text);
    let mut report = CsvImportReport { errors: parsed.errors, ..Default::default() };
    let mut teaching: Vec<(usize, UserRow)> = Vec::new();

    for (line, row) in parsed.rows {
        if repo::get_user_by_username(pool, &row.username)?.is_some() {
            report.skipped += 1;
            continue;
        }
        match import_user_row(pool, &row).await {
            Ok(()) => report.imported += 1,
            Err(e) => {
                report.errors.push(LineError::new(line, e.to_string()));
                continue;
            }
        }
        if row.role == UserRole::Teacher && row.course.is_some() && !row.subjects.is_empty() {
            teaching.push((line, row));
        }
    }

    for (line, teacher) in teaching {
        if let Err(e) = link_teacher_subjects(pool, &teacher).await {
            report.errors.push(LineError::new(line, e.to_string()));
        }
    }

    info!(
        "Users CSV: {} imported, {} skipped, {} errors",
        report.imported,
        report.skipped,
        report.errors.len()
    );
    Ok(report)
}

async fn import_user_row(pool: &DbPool, row: &UserRow) -> Result<()> {
    let placement = match (&row.course, &row.section) {
        (Some(course), Some(section)) if row.role == UserRole::Student => {
            Some(repo::ensure_course_section(pool, course, section).await?)
        }
        _ => None,
    };

    let active_courses = placement
        .iter()
        .map(|(course, section)| display_name(&course.get_name(), &section.get_name()))
        .collect();

    let user = repo::create_user(
        pool,
        NewUser {
            username: row.username.clone(),
            password: row.password.clone(),
            role: row.role,
            display_name: row.name.clone(),
            rut: row.rut.clone(),
            email: row.email.clone(),
            active_courses,
        },
    )
    .await?;

    if let Some((course, section)) = placement {
        repo::assign_student_to_section(
            pool,
            &user.get_id(),
            &course.get_id(),
            &section.get_id(),
            CSV_IMPORT_ACTOR,
        )
        .await?;
    }
    Ok(())
}

async fn link_teacher_subjects(pool: &DbPool, teacher: &UserRow) -> Result<()> {
    let (Some(course_name), Some(section_name)) = (&teacher.course, &teacher.section) else {
        return Ok(());
    };
    let (course, section) = find_course_section(pool, course_name, section_name)?;

    for student in repo::get_students_for_course_section(pool, &course.get_id(), &section.get_id())? {
        let mut assigned = student.get_assigned_teachers();
        for subject in &teacher.subjects {
            assigned.0.insert(subject.clone(), teacher.username.clone());
        }
        repo::update_user(
            pool,
            &student.get_id(),
            UserUpdate { assigned_teachers: Some(assigned), ..Default::default() },
        )
        .await?;
    }
    Ok(())
}

/// Looks up a course and one of its sections by name
fn find_course_section(pool: &DbPool, course_name: &str, section_name: &str) -> Result<(Course, Section)> {
    let course = repo::get_course_by_name(pool, course_name)?
        .ok_or_else(|| RepoError::NotFound(format!("Course '{}'", course_name)))?;
    let section = repo::find_section_by_name(pool, &course.get_id(), section_name)?
        .ok_or_else(|| RepoError::NotFound(format!("Section '{}' of {}", section_name, course.get_name())))?;
    Ok((course, section))
}

// ---------------------------------------------------------------------------
// Grades
// ---------------------------------------------------------------------------

/// One line of the grades CSV
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeRow {
    pub name: String,
    pub rut: String,
    pub course: String,
    pub section: String,
    pub subject: String,
    pub activity_type: ActivityType,
    pub graded_at: DateTime<Utc>,
    pub score: f64,
    pub topic: String,
}

const DATE_COLUMNS: &[&str] = &["fecha", "gradedat", "date"];
const SCORE_COLUMNS: &[&str] = &["nota", "score", "grade", "calificacion", "nota_final"];

/// Parses the grades CSV
///
/// `nombre`, `rut`, `curso`, `fecha` and `nota` are required on every line.
/// An unknown `tipo` counts as `evaluacion`; dates are taken at noon UTC.
pub fn parse_grades_csv(text: &str) -> Parsed<GradeRow> {
    const REQUIRED: &[&[&str]] = &[&["nombre"], &["rut"], &["curso"], DATE_COLUMNS, SCORE_COLUMNS];

    parse_lines(text, REQUIRED, |header, record| {
        let name = header.get(record, &["nombre"]);
        let rut = header.get(record, &["rut"]);
        let course = header.get(record, &["curso"]);
        let raw_date = header.get(record, DATE_COLUMNS);
        let raw_score = header.get(record, SCORE_COLUMNS);
        if [name, rut, course, raw_date, raw_score].iter().any(|v| v.is_empty()) {
            return Err("missing required fields (nombre, rut, curso, fecha, nota)".to_string());
        }

        let date = parse_flexible_date(raw_date).ok_or_else(|| format!("invalid date '{}'", raw_date))?;
        let score = parse_score(raw_score).ok_or_else(|| format!("invalid score '{}'", raw_score))?;
        let rut = canonical_rut(rut).ok_or_else(|| format!("invalid RUT '{}'", rut))?;
        let activity_type = header
            .get(record, &["tipo", "type", "activitytype"])
            .to_lowercase()
            .parse()
            .unwrap_or(ActivityType::Evaluation);

        Ok(GradeRow {
            name: name.to_string(),
            rut,
            course: course.to_string(),
            section: header.get(record, &["seccion", "sección", "section"]).to_string(),
            subject: header.get(record, &["asignatura", "subject"]).to_string(),
            activity_type,
            graded_at: at_noon(date),
            score,
            topic: header.get(record, &["tema", "topic", "theme"]).to_string(),
        })
    })
}

/// Imports the grades CSV
///
/// The course and section are looked up by name; when the line has no
/// section the student's assignment in that course supplies it. Students
/// are matched by RUT; grades for unknown RUTs are kept unlinked.
#[instrument(skip(pool, text))]
pub async fn import_grades_csv(pool: &DbPool, text: &str) -> Result<CsvImportReport> {
    let parsed = parse_grades_csv(text);
    let mut report = CsvImportReport { errors: parsed.errors, ..Default::default() };

    for (line, row) in parsed.rows {
        match import_grade_row(pool, row).await {
            Ok(()) => report.imported += 1,
            Err(e) => report.errors.push(LineError::new(line, e.to_string())),
        }
    }

    info!("Grades CSV: {} imported, {} errors", report.imported, report.errors.len());
    Ok(report)
}

async fn import_grade_row(pool: &DbPool, row: GradeRow) -> Result<()> {
    if row.subject.is_empty() {
        return Err(RepoError::Invalid("asignatura is required".to_string()).into());
    }
    let course = repo::get_course_by_name(pool, &row.course)?
        .ok_or_else(|| RepoError::NotFound(format!("Course '{}'", row.course)))?;
    let student = repo::get_user_by_rut(pool, &row.rut)?;

    let section_id = if row.section.is_empty() {
        match &student {
            Some(student) => repo::list_assignments(
                pool,
                &AssignmentFilter {
                    student_id: Some(student.get_id()),
                    course_id: Some(course.get_id()),
                    section_id: None,
                },
            )?
            .first()
            .map(|a| a.get_section_id()),
            None => None,
        }
    } else {
        let section = repo::find_section_by_name(pool, &course.get_id(), &row.section)?
            .ok_or_else(|| RepoError::NotFound(format!("Section '{}' of {}", row.section, course.get_name())))?;
        Some(section.get_id())
    };

    repo::create_grade(
        pool,
        NewGrade {
            student_id: student.map(|s| s.get_id()),
            student_rut: Some(row.rut),
            course_id: Some(course.get_id()),
            section_id,
            subject: row.subject,
            activity_type: row.activity_type,
            score: row.score,
            topic: row.topic,
            graded_at: row.graded_at,
        },
    )
    .await?;
    Ok(())
}

/// Renders grade rows in the grades CSV format
pub fn write_grades_csv(rows: &[GradeRow]) -> String {
    let mut out = String::from(GRADES_HEADER);
    out.push('\n');
    for row in rows {
        out.push_str(&csv_line([
            row.name.clone(),
            row.rut.clone(),
            row.course.clone(),
            row.section.clone(),
            row.subject.clone(),
            row.activity_type.to_string(),
            row.graded_at.format("%Y-%m-%d").to_string(),
            row.score.to_string(),
            row.topic.clone(),
        ]));
        out.push('\n');
    }
    out
}

/// Names of the users, courses and sections an export refers to
struct Names {
    users: HashMap<String, User>,
    courses: HashMap<String, String>,
    sections: HashMap<String, String>,
}

impl Names {
    fn load(pool: &DbPool) -> Result<Self> {
        Ok(Self {
            users: repo::list_users(pool, None)?
                .into_iter()
                .map(|u| (u.get_id(), u))
                .collect(),
            courses: repo::list_courses(pool)?
                .into_iter()
                .map(|c| (c.get_id(), c.get_name()))
                .collect(),
            sections: repo::list_sections(pool, None)?
                .into_iter()
                .map(|s| (s.get_id(), s.get_name()))
                .collect(),
        })
    }

    fn course(&self, id: Option<&str>) -> String {
        id.and_then(|id| self.courses.get(id)).cloned().unwrap_or_default()
    }

    fn section(&self, id: Option<&str>) -> String {
        id.and_then(|id| self.sections.get(id)).cloned().unwrap_or_default()
    }
}

/// Exports the grades of a year (or every year) as CSV
#[instrument(skip(pool))]
pub fn export_grades_csv(pool: &DbPool, year: Option<i32>) -> Result<String> {
    let names = Names::load(pool)?;
    let grades = repo::list_grades(pool, &GradeFilter { year, ..Default::default() })?;

    let rows: Vec<GradeRow> = grades
        .into_iter()
        .map(|grade| {
            let student = grade.get_student_id().and_then(|id| names.users.get(&id));
            GradeRow {
                name: student.map(|s| s.get_display_name()).unwrap_or_default(),
                rut: grade
                    .get_student_rut()
                    .or_else(|| student.and_then(|s| s.get_rut()))
                    .unwrap_or_default(),
                course: names.course(grade.get_course_id().as_deref()),
                section: names.section(grade.get_section_id().as_deref()),
                subject: grade.get_subject(),
                activity_type: grade.get_activity_type(),
                graded_at: grade.get_graded_at(),
                score: grade.get_score(),
                topic: grade.get_topic(),
            }
        })
        .collect();

    Ok(write_grades_csv(&rows))
}

// ---------------------------------------------------------------------------
// Attendance
// ---------------------------------------------------------------------------

/// One line of the attendance CSV
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRow {
    pub date: NaiveDate,
    pub course: String,
    pub section: String,
    pub student_username: String,
    pub rut: String,
    pub name: String,
    pub status: AttendanceStatus,
    pub comment: String,
}

impl From<GeneratedAttendance> for AttendanceRow {
    fn from(row: GeneratedAttendance) -> Self {
        Self {
            date: row.date,
            course: row.course,
            section: row.section,
            student_username: row.student_username,
            rut: row.rut,
            name: row.name,
            status: row.status,
            comment: row.comment,
        }
    }
}

const USERNAME_COLUMNS: &[&str] = &["studentusername", "username", "usuario"];

/// Parses the attendance CSV
///
/// Each line needs a date, a course, a status and either a username or a RUT.
pub fn parse_attendance_csv(text: &str) -> Parsed<AttendanceRow> {
    const REQUIRED: &[&[&str]] = &[&["date", "fecha"], &["course", "curso"], &["status", "estado"]];

    parse_lines(text, REQUIRED, |header, record| {
        let raw_date = header.get(record, &["date", "fecha"]);
        let course = header.get(record, &["course", "curso"]);
        let username = header.get(record, USERNAME_COLUMNS);
        let rut = header.get(record, &["rut"]);
        let raw_status = header.get(record, &["status", "estado"]);
        if raw_date.is_empty() || course.is_empty() || raw_status.is_empty() || (username.is_empty() && rut.is_empty()) {
            return Err("missing required fields (date, course, username or rut, status)".to_string());
        }

        let date = parse_flexible_date(raw_date).ok_or_else(|| format!("invalid date '{}'", raw_date))?;
        let status =
            parse_attendance_status(raw_status).ok_or_else(|| format!("unknown status '{}'", raw_status))?;

        Ok(AttendanceRow {
            date,
            course: course.to_string(),
            section: header.get(record, &["section", "seccion", "sección"]).to_string(),
            student_username: username.to_string(),
            rut: rut.to_string(),
            name: header.get(record, &["name", "nombre"]).to_string(),
            status,
            comment: header.get(record, &["comment", "comentario"]).to_string(),
        })
    })
}

/// Imports the attendance CSV
///
/// Students are matched by username, then by RUT. A line with no section
/// uses the student's assignment in the course.
#[instrument(skip(pool, text))]
pub async fn import_attendance_csv(pool: &DbPool, text: &str) -> Result<CsvImportReport> {
    let parsed = parse_attendance_csv(text);
    let mut report = CsvImportReport { errors: parsed.errors, ..Default::default() };

    for (line, row) in parsed.rows {
        match import_attendance_row(pool, row).await {
            Ok(()) => report.imported += 1,
            Err(e) => report.errors.push(LineError::new(line, e.to_string())),
        }
    }

    info!("Attendance CSV: {} imported, {} errors", report.imported, report.errors.len());
    Ok(report)
}

async fn import_attendance_row(pool: &DbPool, row: AttendanceRow) -> Result<()> {
    let student = match repo::get_user_by_username(pool, &row.student_username)? {
        Some(student) => Some(student),
        None if !row.rut.is_empty() => repo::get_user_by_rut(pool, &row.rut)?,
        None => None,
    }
    .ok_or_else(|| {
        let who = if row.student_username.is_empty() { &row.rut } else { &row.student_username };
        RepoError::NotFound(format!("Student '{}'", who))
    })?;

    let course = repo::get_course_by_name(pool, &row.course)?
        .ok_or_else(|| RepoError::NotFound(format!("Course '{}'", row.course)))?;
    let section_id = if row.section.is_empty() {
        repo::list_assignments(
            pool,
            &AssignmentFilter {
                student_id: Some(student.get_id()),
                course_id: Some(course.get_id()),
                section_id: None,
            },
        )?
        .first()
        .map(|a| a.get_section_id())
        .ok_or_else(|| {
            RepoError::Invalid(format!("{} has no section in {}", student.get_username(), course.get_name()))
        })?
    } else {
        find_course_section(pool, &row.course, &row.section)?.1.get_id()
    };

    repo::record_attendance(
        pool,
        NewAttendance {
            student_id: student.get_id(),
            course_id: course.get_id(),
            section_id,
            date: row.date,
            status: row.status,
            comment: row.comment,
        },
    )
    .await?;
    Ok(())
}

/// Renders attendance rows in the attendance CSV format
pub fn write_attendance_csv(rows: &[AttendanceRow]) -> String {
    let mut out = String::from(ATTENDANCE_HEADER);
    out.push('\n');
    for row in rows {
        out.push_str(&csv_line([
            row.date.format("%Y-%m-%d").to_string(),
            row.course.clone(),
            row.section.clone(),
            row.student_username.clone(),
            row.rut.clone(),
            row.name.clone(),
            row.status.to_string(),
            row.comment.clone(),
        ]));
        out.push('\n');
    }
    out
}

/// Exports the attendance of a year (or every year) as CSV
#[instrument(skip(pool))]
pub fn export_attendance_csv(pool: &DbPool, year: Option<i32>) -> Result<String> {
    let names = Names::load(pool)?;
    let records = repo::list_attendance(pool, &AttendanceFilter { year, ..Default::default() })?;

    let rows: Vec<AttendanceRow> = records
        .into_iter()
        .map(|record| {
            let student = names.users.get(&record.get_student_id());
            AttendanceRow {
                date: record.get_date(),
                course: names.course(Some(&record.get_course_id())),
                section: names.section(Some(&record.get_section_id())),
                student_username: student.map(|s| s.get_username()).unwrap_or_default(),
                rut: student.and_then(|s| s.get_rut()).unwrap_or_default(),
                name: student.map(|s| s.get_display_name()).unwrap_or_default(),
                status: record.get_status(),
                comment: record.get_comment(),
            }
        })
        .collect();

    Ok(write_attendance_csv(&rows))
}

/// Builds the attendance roster from every stored student assignment
///
/// Students are ordered by course, section and username so that a seed
/// always produces the same file for the same data.
pub fn roster_from_assignments(pool: &DbPool) -> Result<Vec<RosterEntry>> {
    let names = Names::load(pool)?;
    let mut roster: BTreeMap<(String, String, String), RosterEntry> = BTreeMap::new();

    for assignment in repo::list_assignments(pool, &AssignmentFilter::default())? {
        let Some(student) = names.users.get(&assignment.get_student_id()) else {
            warn!("Assignment {} names an unknown student", assignment.get_id());
            continue;
        };
        if !student.is_student() {
            continue;
        }
        let course = names.course(Some(&assignment.get_course_id()));
        let section = names.section(Some(&assignment.get_section_id()));
        roster.insert(
            (course.clone(), section.clone(), student.get_username()),
            RosterEntry {
                username: student.get_username(),
                rut: student.get_rut().unwrap_or_default(),
                name: student.get_display_name(),
                course,
                section,
            },
        );
    }

    Ok(roster.into_values().collect())
}

/// Generates a year of attendance for every assigned student, as CSV
///
/// ### Errors
///
/// Returns `RepoError::Invalid` for a year outside the supported calendar range.
#[instrument(skip(pool))]
pub fn generate_attendance_csv(pool: &DbPool, year: i32, seed: u64) -> Result<String> {
    let calendar = SchoolCalendar::for_year(year)
        .ok_or_else(|| RepoError::Invalid(format!("year {} is out of range", year)))?;
    let roster = roster_from_assignments(pool)?;
    let days = calendar::school_days(&calendar);

    let rows: Vec<AttendanceRow> = calendar::generate_attendance(&roster, &days, seed)
        .into_iter()
        .map(AttendanceRow::from)
        .collect();

    info!("Generated {} attendance rows for {} students", rows.len(), roster.len());
    Ok(write_attendance_csv(&rows))
}

#[cfg(test)]
mod tests;
