use clap::ValueEnum;
use serde::Serialize;
use smart_student::course_section::ResolvedCourseSection;
use smart_student::csv_io::CsvImportReport;
use smart_student::dto::{AssignedDto, DeleteByYearDto};
use smart_student::legacy::ImportReport;
use smart_student::maintenance::{MaintenanceCommand, MaintenanceReport};
use smart_student::models::{
    AttendanceRecord, Course, Grade, Section, StudentAssignment, Task, TaskNotification, User,
};
use smart_student::images::ImageSearchResponse;
use smart_student::ocr::OcrResponse;
use smart_student::slides::{SlidesResponse, SlidesSource};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}

/// Bundled output configuration passed to all print functions
#[derive(Debug, Clone, Copy)]
pub struct OutputConfig {
    /// The output format
    pub format: OutputFormat,
    /// When true, print minimal output (just IDs or counts)
    pub quiet: bool,
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("Could not encode output as JSON: {}", e),
    }
}

/// Prints rows under a header, each column padded to its widest cell
fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let line = |cells: Vec<&str>| {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = width))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    println!("{}", line(headers.to_vec()));
    for row in rows {
        println!("{}", line(row.iter().map(String::as_str).collect()));
    }
}

/// Prints a list as a table, as bare ids when quiet, or as JSON
fn print_list<T: Serialize>(
    items: &[T],
    config: &OutputConfig,
    empty_message: &str,
    id: impl Fn(&T) -> String,
    headers: &[&str],
    row: impl Fn(&T) -> Vec<String>,
) {
    match config.format {
        OutputFormat::Human => {
            if items.is_empty() {
                if !config.quiet {
                    println!("{}", empty_message);
                }
                return;
            }
            if config.quiet {
                for item in items {
                    println!("{}", id(item));
                }
                return;
            }
            let rows: Vec<Vec<String>> = items.iter().map(row).collect();
            print_table(headers, &rows);
        }
        OutputFormat::Json => print_json(items),
    }
}

/// Prints a single record as labelled lines, its id when quiet, or as JSON
fn print_record<T: Serialize>(value: &T, config: &OutputConfig, id: String, fields: Vec<(&str, String)>) {
    match config.format {
        OutputFormat::Human => {
            if config.quiet {
                println!("{}", id);
                return;
            }
            let width = fields.iter().map(|(label, _)| label.len()).max().unwrap_or(0) + 1;
            for (label, value) in fields {
                println!("{:<width$} {}", format!("{}:", label), value, width = width);
            }
        }
        OutputFormat::Json => print_json(value),
    }
}

fn or_dash(value: Option<String>) -> String {
    value.filter(|v| !v.is_empty()).unwrap_or_else(|| "-".to_string())
}

pub fn print_users(users: &[User], config: &OutputConfig) {
    print_list(
        users,
        config,
        "No users found.",
        User::get_id,
        &["ID", "USERNAME", "ROLE", "NAME", "RUT"],
        |u| {
            vec![
                u.get_id(),
                u.get_username(),
                u.get_role().to_string(),
                u.get_display_name(),
                or_dash(u.get_rut()),
            ]
        },
    );
}

pub fn print_user(user: &User, config: &OutputConfig) {
    let teachers = user
        .get_assigned_teachers()
        .0
        .iter()
        .map(|(subject, teacher)| format!("{}={}", subject, teacher))
        .collect::<Vec<_>>()
        .join(", ");
    print_record(
        user,
        config,
        user.get_id(),
        vec![
            ("ID", user.get_id()),
            ("Username", user.get_username()),
            ("Role", user.get_role().to_string()),
            ("Name", user.get_display_name()),
            ("RUT", or_dash(user.get_rut())),
            ("Email", or_dash(user.get_email())),
            ("Courses", or_dash(Some(user.get_active_courses().join(", ")))),
            ("Teachers", or_dash(Some(teachers))),
            ("Created", user.get_created_at().to_string()),
        ],
    );
}

pub fn print_courses(courses: &[Course], config: &OutputConfig) {
    print_list(courses, config, "No courses found.", Course::get_id, &["ID", "NAME"], |c| {
        vec![c.get_id(), c.get_name()]
    });
}

pub fn print_course(course: &Course, config: &OutputConfig) {
    print_record(
        course,
        config,
        course.get_id(),
        vec![
            ("ID", course.get_id()),
            ("Name", course.get_name()),
            ("Created", course.get_created_at().to_string()),
        ],
    );
}

pub fn print_sections(sections: &[Section], config: &OutputConfig) {
    print_list(sections, config, "No sections found.", Section::get_id, &["ID", "COURSE", "NAME"], |s| {
        vec![s.get_id(), s.get_course_id(), s.get_name()]
    });
}

pub fn print_section(section: &Section, config: &OutputConfig) {
    print_record(
        section,
        config,
        section.get_id(),
        vec![
            ("ID", section.get_id()),
            ("Course", section.get_course_id()),
            ("Name", section.get_name()),
        ],
    );
}

pub fn print_resolved(resolved: &ResolvedCourseSection, config: &OutputConfig) {
    print_record(
        resolved,
        config,
        resolved.display_name.clone(),
        vec![
            ("Name", resolved.display_name.clone()),
            ("Course", resolved.course.get_id()),
            ("Section", resolved.section.get_id()),
        ],
    );
}

pub fn print_assignments(assignments: &[StudentAssignment], config: &OutputConfig) {
    print_list(
        assignments,
        config,
        "No assignments found.",
        StudentAssignment::get_id,
        &["ID", "STUDENT", "COURSE", "SECTION", "BY"],
        |a| {
            vec![
                a.get_id(),
                a.get_student_id(),
                a.get_course_id(),
                a.get_section_id(),
                a.get_created_by(),
            ]
        },
    );
}

pub fn print_assignment(assignment: &StudentAssignment, config: &OutputConfig) {
    print_record(
        assignment,
        config,
        assignment.get_id(),
        vec![
            ("ID", assignment.get_id()),
            ("Student", assignment.get_student_id()),
            ("Course", assignment.get_course_id()),
            ("Section", assignment.get_section_id()),
            ("By", assignment.get_created_by()),
        ],
    );
}

pub fn print_tasks(tasks: &[Task], config: &OutputConfig) {
    print_list(
        tasks,
        config,
        "No tasks found.",
        Task::get_id,
        &["ID", "TITLE", "SUBJECT", "TO", "DUE"],
        |t| {
            vec![
                t.get_id(),
                t.get_title(),
                t.get_subject(),
                t.get_assigned_to().to_string(),
                or_dash(t.get_due_date().map(|d| d.format("%Y-%m-%d").to_string())),
            ]
        },
    );
}

pub fn print_task(task: &Task, config: &OutputConfig) {
    print_record(
        task,
        config,
        task.get_id(),
        vec![
            ("ID", task.get_id()),
            ("Title", task.get_title()),
            ("Subject", task.get_subject()),
            ("Created by", task.get_created_by()),
            ("Assigned to", task.get_assigned_to().to_string()),
            ("Course ref", or_dash(Some(task.get_course_ref()))),
            ("Course", or_dash(task.get_course_id())),
            ("Section", or_dash(task.get_section_id())),
            ("Students", or_dash(Some(task.get_assigned_student_ids().join(", ")))),
            ("Due", or_dash(task.get_due_date().map(|d| d.to_rfc3339()))),
        ],
    );
}

pub fn print_notifications(notifications: &[TaskNotification], config: &OutputConfig) {
    print_list(
        notifications,
        config,
        "No notifications.",
        TaskNotification::get_id,
        &["ID", "TYPE", "TASK", "FROM", "READ BY"],
        |n| {
            vec![
                n.get_id(),
                n.get_notification_type().to_string(),
                n.get_task_id(),
                n.get_from_username(),
                n.get_read_by().len().to_string(),
            ]
        },
    );
}

pub fn print_notification(notification: &TaskNotification, config: &OutputConfig) {
    print_record(
        notification,
        config,
        notification.get_id(),
        vec![
            ("ID", notification.get_id()),
            ("Type", notification.get_notification_type().to_string()),
            ("Task", notification.get_task_id()),
            ("Targets", notification.get_target_usernames().join(", ")),
            ("Read by", or_dash(Some(notification.get_read_by().join(", ")))),
        ],
    );
}

pub fn print_grades(grades: &[Grade], config: &OutputConfig) {
    print_list(
        grades,
        config,
        "No grades found.",
        Grade::get_id,
        &["ID", "STUDENT", "SUBJECT", "TYPE", "SCORE", "DATE"],
        |g| {
            vec![
                g.get_id(),
                or_dash(g.get_student_id().or_else(|| g.get_student_rut())),
                g.get_subject(),
                g.get_activity_type().to_string(),
                format!("{:.1}", g.get_score()),
                g.get_graded_at().format("%Y-%m-%d").to_string(),
            ]
        },
    );
}

pub fn print_grade(grade: &Grade, config: &OutputConfig) {
    print_record(
        grade,
        config,
        grade.get_id(),
        vec![
            ("ID", grade.get_id()),
            ("Student", or_dash(grade.get_student_id())),
            ("RUT", or_dash(grade.get_student_rut())),
            ("Subject", grade.get_subject()),
            ("Type", grade.get_activity_type().to_string()),
            ("Score", format!("{:.1}", grade.get_score())),
            ("Topic", or_dash(Some(grade.get_topic()))),
            ("Date", grade.get_graded_at().to_rfc3339()),
        ],
    );
}

pub fn print_attendance(records: &[AttendanceRecord], config: &OutputConfig) {
    print_list(
        records,
        config,
        "No attendance found.",
        AttendanceRecord::get_id,
        &["DATE", "STUDENT", "STATUS", "COMMENT"],
        |r| {
            vec![
                r.get_date().to_string(),
                r.get_student_id(),
                r.get_status().to_string(),
                r.get_comment(),
            ]
        },
    );
}

pub fn print_attendance_record(record: &AttendanceRecord, config: &OutputConfig) {
    print_record(
        record,
        config,
        record.get_id(),
        vec![
            ("ID", record.get_id()),
            ("Student", record.get_student_id()),
            ("Date", record.get_date().to_string()),
            ("Status", record.get_status().to_string()),
            ("Comment", or_dash(Some(record.get_comment()))),
        ],
    );
}

pub fn print_assigned(assigned: &AssignedDto, config: &OutputConfig) {
    match config.format {
        OutputFormat::Human if config.quiet => println!("{}", assigned.assigned),
        OutputFormat::Human => println!(
            "Student {} {} assigned to task {}",
            assigned.student_id,
            if assigned.assigned { "is" } else { "is not" },
            assigned.task_id
        ),
        OutputFormat::Json => print_json(assigned),
    }
}

pub fn print_delete_result(result: &DeleteByYearDto, config: &OutputConfig) {
    match config.format {
        OutputFormat::Human if config.quiet => println!("{}", result.deleted),
        OutputFormat::Human => {
            println!("Deleted {} records of {} in {} pages", result.deleted, result.year, result.pages);
            if let (true, Some(cursor)) = (result.more, &result.next_cursor) {
                println!("More remain; continue with --cursor {}", cursor);
            }
        }
        OutputFormat::Json => print_json(result),
    }
}

pub fn print_csv_report(report: &CsvImportReport, config: &OutputConfig) {
    match config.format {
        OutputFormat::Human if config.quiet => println!("{}", report.imported),
        OutputFormat::Human => {
            println!("Imported {}, skipped {}, {} errors", report.imported, report.skipped, report.errors.len());
            for error in &report.errors {
                println!("  line {}: {}", error.line, error.message);
            }
        }
        OutputFormat::Json => print_json(report),
    }
}

pub fn print_legacy_reports(reports: &[ImportReport], config: &OutputConfig) {
    print_list(
        reports,
        config,
        "No recognised keys in the snapshot.",
        |r| r.key.clone(),
        &["KEY", "IMPORTED", "SKIPPED", "REJECTED"],
        |r| {
            vec![
                r.key.clone(),
                r.imported.to_string(),
                r.skipped.to_string(),
                r.rejected.len().to_string(),
            ]
        },
    );
}

pub fn print_maintenance_commands(commands: &[MaintenanceCommand], config: &OutputConfig) {
    match config.format {
        OutputFormat::Human => {
            for command in commands {
                println!("{}", command);
            }
        }
        OutputFormat::Json => print_json(commands),
    }
}

pub fn print_maintenance_report(report: &MaintenanceReport, config: &OutputConfig) {
    match config.format {
        OutputFormat::Human if config.quiet => println!("{}", report.changed),
        OutputFormat::Human => {
            println!(
                "{}{}: examined {}, {} {}, {} issues",
                report.command,
                if report.dry_run { " (dry run)" } else { "" },
                report.examined,
                if report.dry_run { "would change" } else { "changed" },
                report.changed,
                report.issues.len()
            );
            for issue in &report.issues {
                println!("  [{}] {}: {}", issue.kind, issue.subject, issue.detail);
            }
        }
        OutputFormat::Json => print_json(report),
    }
}

pub fn print_ocr_response(response: &OcrResponse, config: &OutputConfig) {
    match config.format {
        OutputFormat::Human => {
            if response.fallback {
                println!("Analysis unavailable: {}", response.error.as_deref().unwrap_or("no API key"));
            } else if let Some(analysis) = &response.analysis {
                print_json(analysis);
            } else if let Some(raw) = &response.raw_response {
                println!("Model reply was not valid JSON:\n{}", raw);
            }
        }
        OutputFormat::Json => print_json(response),
    }
}

pub fn print_slides(response: &SlidesResponse, config: &OutputConfig) {
    match config.format {
        OutputFormat::Human => {
            if config.quiet {
                println!("{}", response.slides.len());
                return;
            }
            match response.source {
                SlidesSource::Ai => {}
                SlidesSource::Mock => println!("(template slides: no Gemini key configured)\n"),
                SlidesSource::MockFallback => println!("(template slides: the model was unavailable)\n"),
            }
            for (i, slide) in response.slides.iter().enumerate() {
                println!("{}. {}", i + 1, slide.title);
                for point in &slide.content {
                    println!("   - {}", point);
                }
                if let Some(url) = &slide.image_url {
                    println!("   image: {}", url);
                }
            }
        }
        OutputFormat::Json => print_json(response),
    }
}

pub fn print_image_search(response: &ImageSearchResponse, config: &OutputConfig) {
    match config.format {
        OutputFormat::Human => {
            if !config.quiet {
                println!("{} images for {}", response.count, response.topic);
            }
            for url in &response.urls {
                println!("{}", url);
            }
        }
        OutputFormat::Json => print_json(response),
    }
}

/// Prints a success message in the specified format
pub fn print_success(message: &str, config: &OutputConfig) {
    match config.format {
        OutputFormat::Human => {
            if !config.quiet {
                println!("{}", message);
            }
        }
        OutputFormat::Json => print_json(&serde_json::json!({"status": "ok", "message": message})),
    }
}
