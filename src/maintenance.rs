//! Roster maintenance commands
//!
//! Each command inspects the stored data, fixes what it can fix without
//! guessing and reports the rest. Every command is idempotent: a second run
//! finds nothing left to change. With `dry_run` set nothing is written and
//! `changed` counts what would have been changed.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::course_section::display_name;
use crate::db::DbPool;
use crate::models::{AssignedTo, Course, NotificationType, Section, TaskNotification, User, UserRole};
use crate::normalize::{normalize_active_course, normalize_course_name, normalize_text, parse_active_course};
use crate::repo::{self, AssignmentFilter, GradeFilter};

/// Username recorded as the creator of assignments made by a backfill
pub const MAINTENANCE_ACTOR: &str = "maintenance";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MaintenanceCommand {
    Diagnose,
    RepairActiveCourses,
    BackfillStudentAssignments,
    SyncActiveCourses,
    RepairTaskNotifications,
    LinkGradesToStudents,
}

impl MaintenanceCommand {
    pub const ALL: &'static [MaintenanceCommand] = &[
        MaintenanceCommand::Diagnose,
        MaintenanceCommand::RepairActiveCourses,
        MaintenanceCommand::BackfillStudentAssignments,
        MaintenanceCommand::SyncActiveCourses,
        MaintenanceCommand::RepairTaskNotifications,
        MaintenanceCommand::LinkGradesToStudents,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MaintenanceCommand::Diagnose => "diagnose",
            MaintenanceCommand::RepairActiveCourses => "repair-active-courses",
            MaintenanceCommand::BackfillStudentAssignments => "backfill-student-assignments",
            MaintenanceCommand::SyncActiveCourses => "sync-active-courses",
            MaintenanceCommand::RepairTaskNotifications => "repair-task-notifications",
            MaintenanceCommand::LinkGradesToStudents => "link-grades-to-students",
        }
    }
}

impl fmt::Display for MaintenanceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MaintenanceCommand {
    type Err = String;

    /// Accepts the kebab-case name; underscores work too
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .iter()
            .copied()
            .find(|command| command.as_str() == wanted)
            .ok_or_else(|| format!("Unknown maintenance command: {:?}", s))
    }
}

/// Something a command found but did not fix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// Short machine-readable category, e.g. `unassigned_student`
    pub kind: String,
    /// The id or username the issue is about
    pub subject: String,
    pub detail: String,
}

impl Issue {
    fn new(kind: &str, subject: impl Into<String>, detail: impl Into<String>) -> Self {
        Self { kind: kind.to_string(), subject: subject.into(), detail: detail.into() }
    }
}

/// Outcome of one maintenance command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceReport {
    pub command: MaintenanceCommand,
    pub dry_run: bool,
    /// Records looked at
    pub examined: usize,
    /// Records changed, or that would be changed in a dry run
    pub changed: usize,
    pub issues: Vec<Issue>,
}

impl MaintenanceReport {
    fn new(command: MaintenanceCommand, dry_run: bool) -> Self {
        Self { command, dry_run, examined: 0, changed: 0, issues: Vec::new() }
    }

    fn issue(&mut self, kind: &str, subject: impl Into<String>, detail: impl Into<String>) {
        let issue = Issue::new(kind, subject, detail);
        warn!(command = %self.command, kind = %issue.kind, subject = %issue.subject, "{}", issue.detail);
        self.issues.push(issue);
    }
}

/// Runs one maintenance command
#[instrument(skip(pool))]
pub async fn run(pool: &DbPool, command: MaintenanceCommand, dry_run: bool) -> Result<MaintenanceReport> {
    let report = match command {
        MaintenanceCommand::Diagnose => diagnose(pool)?,
        MaintenanceCommand::RepairActiveCourses => repair_active_courses(pool, dry_run).await?,
        MaintenanceCommand::BackfillStudentAssignments => backfill_student_assignments(pool, dry_run).await?,
        MaintenanceCommand::SyncActiveCourses => sync_active_courses(pool, dry_run).await?,
        MaintenanceCommand::RepairTaskNotifications => repair_task_notifications(pool, dry_run).await?,
        MaintenanceCommand::LinkGradesToStudents => link_grades_to_students(pool, dry_run).await?,
    };

    info!(
        command = %report.command,
        dry_run = report.dry_run,
        examined = report.examined,
        changed = report.changed,
        issues = report.issues.len(),
        "Maintenance finished"
    );
    Ok(report)
}

/// Courses and sections held in memory for name lookups
struct Catalog {
    courses: Vec<Course>,
    sections: Vec<Section>,
}

impl Catalog {
    fn load(pool: &DbPool) -> Result<Self> {
        Ok(Self { courses: repo::list_courses(pool)?, sections: repo::list_sections(pool, None)? })
    }

    fn course_by_name(&self, name: &str) -> Option<&Course> {
        let wanted = normalize_course_name(name);
        self.courses
            .iter()
            .find(|c| normalize_course_name(&c.get_name()) == wanted)
    }

    fn course_by_id(&self, id: &str) -> Option<&Course> {
        self.courses.iter().find(|c| c.get_id() == id)
    }

    fn section_by_id(&self, id: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.get_id() == id)
    }

    /// Resolves an active-course label such as "4to Básico Sección A"
    fn resolve_label(&self, label: &str) -> Option<(&Course, &Section)> {
        let (course_name, section_name) = parse_active_course(label)?;
        let course = self.course_by_name(&course_name)?;
        let wanted = normalize_text(&section_name);
        let section = self.sections.iter().find(|s| {
            s.get_course_id() == course.get_id() && normalize_text(&s.get_name()) == wanted
        })?;
        Some((course, section))
    }

    fn label(&self, course_id: &str, section_id: &str) -> Option<String> {
        Some(display_name(
            &self.course_by_id(course_id)?.get_name(),
            &self.section_by_id(section_id)?.get_name(),
        ))
    }
}

fn assigned_student_ids(pool: &DbPool) -> Result<HashSet<String>> {
    Ok(repo::list_assignments(pool, &AssignmentFilter::default())?
        .into_iter()
        .map(|a| a.get_student_id())
        .collect())
}

fn counts_section_twice(label: &str) -> bool {
    normalize_text(label).matches("seccion").count() > 1
}

/// Read-only health report
///
/// Reports students without an assignment, active-course labels with the
/// section repeated or naming an unknown course, course tasks whose course
/// reference no longer resolves and grades not linked to a student.
#[instrument(skip(pool))]
pub fn diagnose(pool: &DbPool) -> Result<MaintenanceReport> {
    let mut report = MaintenanceReport::new(MaintenanceCommand::Diagnose, true);
    let catalog = Catalog::load(pool)?;
    let assigned = assigned_student_ids(pool)?;

    for student in repo::list_users(pool, Some(UserRole::Student))? {
        report.examined += 1;
        let username = student.get_username();
        if !assigned.contains(&student.get_id()) {
            report.issue("unassigned_student", &username, "student has no course-section assignment");
        }
        for label in student.get_active_courses() {
            if counts_section_twice(&label) {
                report.issue("duplicated_section_text", &username, format!("active course {:?}", label));
            }
            let course_name = parse_active_course(&label).map(|(course, _)| course).unwrap_or(label.clone());
            if catalog.course_by_name(&course_name).is_none() {
                report.issue("unknown_active_course", &username, format!("no course matches {:?}", label));
            }
        }
    }

    for task in repo::list_tasks(pool, None)? {
        report.examined += 1;
        if task.get_assigned_to() == AssignedTo::Course
            && repo::resolve_course_section(pool, &task.get_course_ref())?.is_none()
        {
            report.issue(
                "unresolved_task_course",
                task.get_id(),
                format!("course reference {:?} does not resolve", task.get_course_ref()),
            );
        }
    }

    for grade in repo::list_grades(pool, &GradeFilter::default())? {
        report.examined += 1;
        if grade.get_student_id().is_none() {
            let rut = grade.get_student_rut().unwrap_or_default();
            report.issue("unlinked_grade", grade.get_id(), format!("grade has no student (RUT {:?})", rut));
        }
    }

    Ok(report)
}

/// Normalizes every user's active-course labels and drops duplicates
#[instrument(skip(pool))]
pub async fn repair_active_courses(pool: &DbPool, dry_run: bool) -> Result<MaintenanceReport> {
    let mut report = MaintenanceReport::new(MaintenanceCommand::RepairActiveCourses, dry_run);

    for user in repo::list_users(pool, None)? {
        report.examined += 1;
        let current = user.get_active_courses();
        let mut repaired: Vec<String> = Vec::with_capacity(current.len());
        for label in &current {
            let label = normalize_active_course(label);
            if !label.is_empty() && !repaired.contains(&label) {
                repaired.push(label);
            }
        }

        if repaired != current {
            info!("Active courses of {}: {:?} -> {:?}", user.get_username(), current, repaired);
            report.changed += 1;
            if !dry_run {
                repo::set_active_courses(pool, &user.get_id(), repaired).await?;
            }
        }
    }

    Ok(report)
}

/// Creates missing assignments from active-course labels
///
/// A student without an assignment gets one only when their labels resolve
/// to exactly one course-section. Students with no resolvable label, or
/// labels naming several course-sections, are reported for an operator to
/// decide.
#[instrument(skip(pool))]
pub async fn backfill_student_assignments(pool: &DbPool, dry_run: bool) -> Result<MaintenanceReport> {
    let mut report = MaintenanceReport::new(MaintenanceCommand::BackfillStudentAssignments, dry_run);
    let catalog = Catalog::load(pool)?;
    let assigned = assigned_student_ids(pool)?;

    for student in repo::list_users(pool, Some(UserRole::Student))? {
        if assigned.contains(&student.get_id()) {
            continue;
        }
        report.examined += 1;

        let candidates: BTreeSet<(String, String)> = student
            .get_active_courses()
            .iter()
            .filter_map(|label| catalog.resolve_label(label))
            .map(|(course, section)| (course.get_id(), section.get_id()))
            .collect();

        let mut candidates = candidates.into_iter();
        match (candidates.next(), candidates.next()) {
            (Some((course_id, section_id)), None) => {
                report.changed += 1;
                if !dry_run {
                    repo::assign_student_to_section(
                        pool,
                        &student.get_id(),
                        &course_id,
                        &section_id,
                        MAINTENANCE_ACTOR,
                    )
                    .await?;
                }
            }
            (None, _) => report.issue(
                "needs_confirmation",
                student.get_username(),
                format!("no active course resolves: {:?}", student.get_active_courses()),
            ),
            (Some(_), Some(_)) => report.issue(
                "needs_confirmation",
                student.get_username(),
                format!("active courses name several sections: {:?}", student.get_active_courses()),
            ),
        }
    }

    Ok(report)
}

/// Rewrites each student's active courses from their assignments
///
/// Students without assignments keep their labels and are reported.
#[instrument(skip(pool))]
pub async fn sync_active_courses(pool: &DbPool, dry_run: bool) -> Result<MaintenanceReport> {
    let mut report = MaintenanceReport::new(MaintenanceCommand::SyncActiveCourses, dry_run);
    let catalog = Catalog::load(pool)?;

    let mut by_student: HashMap<String, Vec<String>> = HashMap::new();
    for assignment in repo::list_assignments(pool, &AssignmentFilter::default())? {
        if let Some(label) = catalog.label(&assignment.get_course_id(), &assignment.get_section_id()) {
            by_student.entry(assignment.get_student_id()).or_default().push(label);
        }
    }

    for student in repo::list_users(pool, Some(UserRole::Student))? {
        report.examined += 1;
        let Some(labels) = by_student.remove(&student.get_id()) else {
            report.issue("unassigned_student", student.get_username(), "no assignment to sync from");
            continue;
        };
        if labels != student.get_active_courses() {
            report.changed += 1;
            if !dry_run {
                repo::set_active_courses(pool, &student.get_id(), labels).await?;
            }
        }
    }

    Ok(report)
}

/// Makes every task's `new_task` notification match its current recipients
///
/// Course references are resolved again, so a task created from a bare
/// course id before anyone was assigned picks up its section once the
/// course has students. Missing notifications are created; stale recipient
/// lists are replaced, keeping the read marks of recipients that remain.
#[instrument(skip(pool))]
pub async fn repair_task_notifications(pool: &DbPool, dry_run: bool) -> Result<MaintenanceReport> {
    let mut report = MaintenanceReport::new(MaintenanceCommand::RepairTaskNotifications, dry_run);

    for mut task in repo::list_tasks(pool, None)? {
        report.examined += 1;
        let mut task_changed = false;

        if task.get_assigned_to() == AssignedTo::Course {
            let Some(resolved) = repo::resolve_course_section(pool, &task.get_course_ref())? else {
                report.issue(
                    "unresolved_task_course",
                    task.get_id(),
                    format!("course reference {:?} does not resolve; no recipients", task.get_course_ref()),
                );
                continue;
            };

            let course_id = resolved.course.get_id();
            let section_id = resolved.section.get_id();
            if task.get_course_id().as_deref() != Some(course_id.as_str())
                || task.get_section_id().as_deref() != Some(section_id.as_str())
            {
                info!("Task {} now resolves to {}", task.get_id(), resolved.display_name);
                task_changed = true;
                if !dry_run {
                    repo::set_task_course_section(pool, &task.get_id(), Some(&course_id), Some(&section_id))
                        .await?;
                }
                task = task.with_course_section(Some(course_id), Some(section_id));
            }
        }

        let recipients: Vec<String> = repo::resolve_task_recipients(pool, &task)?
            .iter()
            .map(User::get_username)
            .collect();
        let existing = repo::list_notifications_for_task(pool, &task.get_id())?
            .into_iter()
            .find(|n| n.get_notification_type() == NotificationType::NewTask);

        match existing {
            None if recipients.is_empty() => {}
            None => {
                task_changed = true;
                if !dry_run {
                    let notification = TaskNotification::new(
                        task.get_id(),
                        NotificationType::NewTask,
                        recipients,
                        task.get_created_by(),
                        task.get_course_ref(),
                    );
                    repo::create_notification(pool, &notification).await?;
                }
            }
            Some(notification) => {
                let current: BTreeSet<String> = notification.get_target_usernames().into_iter().collect();
                let wanted: BTreeSet<String> = recipients.iter().cloned().collect();
                if current != wanted {
                    task_changed = true;
                    if !dry_run {
                        repo::set_notification_targets(pool, &notification, recipients).await?;
                    }
                }
            }
        }

        if task_changed {
            report.changed += 1;
        }
    }

    Ok(report)
}

/// Links grades to students by RUT and fills in missing course and section
///
/// The course and section come from the student's assignment: the one in
/// the grade's course when it has one, otherwise the student's only
/// assignment. Students with several assignments and no course on the
/// grade are reported.
#[instrument(skip(pool))]
pub async fn link_grades_to_students(pool: &DbPool, dry_run: bool) -> Result<MaintenanceReport> {
    let mut report = MaintenanceReport::new(MaintenanceCommand::LinkGradesToStudents, dry_run);

    let by_rut: HashMap<String, String> = repo::list_users(pool, Some(UserRole::Student))?
        .into_iter()
        .filter_map(|u| u.get_rut().map(|rut| (rut, u.get_id())))
        .collect();
    let mut assignments: HashMap<String, Vec<(String, String)>> = HashMap::new();
    for a in repo::list_assignments(pool, &AssignmentFilter::default())? {
        assignments
            .entry(a.get_student_id())
            .or_default()
            .push((a.get_course_id(), a.get_section_id()));
    }

    for grade in repo::list_grades(pool, &GradeFilter::default())? {
        report.examined += 1;

        let student_id = grade
            .get_student_id()
            .or_else(|| grade.get_student_rut().and_then(|rut| by_rut.get(&rut).cloned()));
        let Some(student_id) = student_id else {
            report.issue(
                "unlinked_grade",
                grade.get_id(),
                format!("no student has RUT {:?}", grade.get_student_rut().unwrap_or_default()),
            );
            continue;
        };

        let mut course_id = grade.get_course_id();
        let mut section_id = grade.get_section_id();
        if course_id.is_none() || section_id.is_none() {
            let placements = assignments.get(&student_id).map(Vec::as_slice).unwrap_or_default();
            let placement = match &course_id {
                Some(course) => placements.iter().find(|(c, _)| c == course),
                None if placements.len() == 1 => placements.first(),
                None => None,
            };
            match placement {
                Some((course, section)) => {
                    course_id = Some(course.clone());
                    section_id = Some(section.clone());
                }
                None => report.issue(
                    "ambiguous_grade_section",
                    grade.get_id(),
                    format!("student has {} assignments; section not filled", placements.len()),
                ),
            }
        }

        let linked = (Some(student_id), course_id, section_id);
        if linked != (grade.get_student_id(), grade.get_course_id(), grade.get_section_id()) {
            report.changed += 1;
            if !dry_run {
                repo::link_grade(pool, &grade.get_id(), linked.0, linked.1, linked.2).await?;
            }
        }
    }

    Ok(report)
}
