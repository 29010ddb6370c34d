//! Course-section identifier grammar and resolution
//!
//! Tasks and notifications refer to their audience through a single string,
//! which is either a bare course id or a course id and a section id joined
//! with `-`:
//!
//! ```text
//! guid        = 8HEX "-" 4HEX "-" 4HEX "-" 4HEX "-" 12HEX
//! course-ref  = guid                      ; bare course id (5 groups)
//!             | guid "-" guid             ; combined course-section id (10 groups)
//! ```
//!
//! Hex digits are case-insensitive and surrounding whitespace is ignored.
//! Parsed ids are returned in lower case. Anything else is unparseable and
//! resolves to `None`.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::{Course, Section, StudentAssignment};

static GUID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$")
        .expect("guid pattern is valid")
});

/// Returns true if `value` is exactly one GUID
pub fn is_guid(value: &str) -> bool {
    GUID_RE.is_match(value)
}

/// A parsed course reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CourseRef {
    /// A bare course id; the section must be inferred
    Course { course_id: String },
    /// An explicit course and section
    CourseSection { course_id: String, section_id: String },
}

impl CourseRef {
    pub fn course_id(&self) -> &str {
        match self {
            CourseRef::Course { course_id } => course_id,
            CourseRef::CourseSection { course_id, .. } => course_id,
        }
    }
}

/// The course and section ids a reference denotes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseSectionIds {
    pub course_id: String,
    pub section_id: String,
}

/// A course reference resolved against the reference data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedCourseSection {
    pub course: Course,
    pub section: Section,
    /// Human readable label, e.g. "4to Básico Sección A"
    pub display_name: String,
}

/// Parses a course reference
///
/// ### Returns
///
/// `None` when the input is neither one GUID nor two GUIDs joined with `-`
pub fn parse_course_ref(raw: &str) -> Option<CourseRef> {
    let trimmed = raw.trim();
    if is_guid(trimmed) {
        return Some(CourseRef::Course {
            course_id: trimmed.to_lowercase(),
        });
    }
    split_combined_id(trimmed).map(|(course_id, section_id)| CourseRef::CourseSection {
        course_id,
        section_id,
    })
}

/// Joins a course id and a section id into a combined id
pub fn combine_ids(course_id: &str, section_id: &str) -> String {
    format!("{}-{}", course_id.trim(), section_id.trim())
}

/// Splits a combined course-section id into its two GUIDs
///
/// Every hyphen is tried as the boundary and the first split whose halves
/// are both GUIDs wins.
pub fn split_combined_id(raw: &str) -> Option<(String, String)> {
    let trimmed = raw.trim();
    trimmed
        .match_indices('-')
        .map(|(index, _)| (&trimmed[..index], &trimmed[index + 1..]))
        .find(|(course, section)| is_guid(course) && is_guid(section))
        .map(|(course, section)| (course.to_lowercase(), section.to_lowercase()))
}

/// Resolves a course reference to course and section ids
///
/// A combined id yields its two halves directly. A bare course id falls back
/// to the section of the earliest assignment (by creation time, then id)
/// referencing that course.
///
/// ### Returns
///
/// `None` if the reference is unparseable, or is a bare course id that no
/// assignment references
pub fn resolve_course_section_ids(
    raw: &str,
    assignments: &[StudentAssignment],
) -> Option<CourseSectionIds> {
    match parse_course_ref(raw)? {
        CourseRef::CourseSection {
            course_id,
            section_id,
        } => Some(CourseSectionIds {
            course_id,
            section_id,
        }),
        CourseRef::Course { course_id } => assignments
            .iter()
            .filter(|a| a.get_course_id().eq_ignore_ascii_case(&course_id))
            .min_by_key(|a| (a.get_created_at_raw(), a.get_id()))
            .map(|a| CourseSectionIds {
                course_id,
                section_id: a.get_section_id().to_lowercase(),
            }),
    }
}

/// Resolves a course reference against courses and sections
///
/// The section must belong to the resolved course; a mismatch counts as not
/// found.
pub fn resolve_course_section(
    raw: &str,
    courses: &[Course],
    sections: &[Section],
    assignments: &[StudentAssignment],
) -> Option<ResolvedCourseSection> {
    let ids = resolve_course_section_ids(raw, assignments)?;
    let course = courses
        .iter()
        .find(|c| c.get_id().eq_ignore_ascii_case(&ids.course_id))?;
    let section = sections.iter().find(|s| {
        s.get_id().eq_ignore_ascii_case(&ids.section_id)
            && s.get_course_id().eq_ignore_ascii_case(&course.get_id())
    })?;

    Some(ResolvedCourseSection {
        display_name: display_name(&course.get_name(), &section.get_name()),
        course: course.clone(),
        section: section.clone(),
    })
}

/// Formats the label used for a course-section in `active_courses`
pub fn display_name(course_name: &str, section_name: &str) -> String {
    format!("{} Sección {}", course_name.trim(), section_name.trim())
}
