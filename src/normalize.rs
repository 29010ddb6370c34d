//! Name normalization for courses, sections and free text
//!
//! Course names arrive in many spellings ("1ro Básico", "1° basico",
//! "Primero Básico" is not supported). Matching always goes through these
//! functions so that every caller agrees on what counts as the same name.

use std::sync::LazyLock;

use regex::Regex;

use crate::course_section::display_name;

static COURSE_LEVEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2})(?:ero|ro|do|er|to|mo|vo|no)?\b.*?\b(basico|medio)\b")
        .expect("course level pattern is valid")
});

static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s*\bsecci[oó]n\s+(\S+)").expect("section pattern is valid")
});

/// Maps a Spanish accented character to its base letter
fn strip_accent(c: char) -> char {
    match c {
        'á' | 'à' | 'ä' | 'â' => 'a',
        'é' | 'è' | 'ë' | 'ê' => 'e',
        'í' | 'ì' | 'ï' | 'î' => 'i',
        'ó' | 'ò' | 'ö' | 'ô' => 'o',
        'ú' | 'ù' | 'ü' | 'û' => 'u',
        'ñ' => 'n',
        'Á' | 'À' | 'Ä' | 'Â' => 'A',
        'É' | 'È' | 'Ë' | 'Ê' => 'E',
        'Í' | 'Ì' | 'Ï' | 'Î' => 'I',
        'Ó' | 'Ò' | 'Ö' | 'Ô' => 'O',
        'Ú' | 'Ù' | 'Ü' | 'Û' => 'U',
        'Ñ' => 'N',
        other => other,
    }
}

/// Collapses runs of whitespace to single spaces and trims the ends
pub fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lower-cases, strips diacritics and collapses whitespace
pub fn normalize_text(value: &str) -> String {
    let stripped: String = value.chars().map(strip_accent).collect();
    collapse_whitespace(&stripped.to_lowercase())
}

/// Normalizes a course name for matching
///
/// `"1ro Básico"`, `"1° basico"` and `"1 BÁSICO"` all become `"1 basico"`.
/// Names without a recognizable level are only passed through
/// [`normalize_text`].
pub fn normalize_course_name(name: &str) -> String {
    let without_ordinals: String = name.chars().filter(|c| !matches!(c, 'º' | '°')).collect();
    let text = normalize_text(&without_ordinals);
    match COURSE_LEVEL_RE.captures(&text) {
        Some(caps) => format!("{} {}", &caps[1], &caps[2]),
        None => text,
    }
}

/// Splits an active-course label into course name and section name
///
/// `"4to Básico Sección A"` gives `("4to Básico", "A")`. When the section
/// text is repeated, the last one wins.
pub fn parse_active_course(label: &str) -> Option<(String, String)> {
    let first = SECTION_RE.find(label)?;
    let section = SECTION_RE
        .captures_iter(label)
        .last()
        .map(|caps| caps[1].to_string())?;
    let course = collapse_whitespace(&label[..first.start()]);
    if course.is_empty() {
        return None;
    }
    Some((course, section))
}

/// Rewrites an active-course label into canonical form
///
/// Duplicated "Sección X" segments collapse into one and whitespace is
/// normalized. Labels with no section are returned with collapsed whitespace.
pub fn normalize_active_course(label: &str) -> String {
    match parse_active_course(label) {
        Some((course, section)) => display_name(&course, &section),
        None => collapse_whitespace(label),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::arb_messy_string;
    use proptest::prelude::*;

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  Ciencias   Naturales "), "ciencias naturales");
        assert_eq!(normalize_text("Lenguaje y Comunicación"), "lenguaje y comunicacion");
        assert_eq!(normalize_text("ÑANDÚ"), "nandu");
    }

    #[test]
    fn test_normalize_course_name_variants() {
        for raw in ["1ro Básico", "1° basico", "1 BÁSICO", "1º Básico", "1ero básico"] {
            assert_eq!(normalize_course_name(raw), "1 basico", "input {:?}", raw);
        }
        assert_eq!(normalize_course_name("4to Medio"), "4 medio");
        assert_eq!(normalize_course_name("2do Básico"), "2 basico");
        assert_eq!(normalize_course_name("8vo Básico"), "8 basico");
    }

    #[test]
    fn test_normalize_course_name_passes_through_unknown_shapes() {
        assert_eq!(normalize_course_name("Taller de Música"), "taller de musica");
    }

    #[test]
    fn test_parse_active_course() {
        assert_eq!(
            parse_active_course("4to Básico Sección A"),
            Some(("4to Básico".to_string(), "A".to_string()))
        );
        assert_eq!(
            parse_active_course("4to Básico Seccion B Sección B"),
            Some(("4to Básico".to_string(), "B".to_string()))
        );
        assert_eq!(parse_active_course("4to Básico"), None);
        assert_eq!(parse_active_course("Sección A"), None);
    }

    #[test]
    fn test_normalize_active_course_collapses_duplicates() {
        assert_eq!(
            normalize_active_course("5to Básico  Sección A Sección A"),
            "5to Básico Sección A"
        );
        assert_eq!(normalize_active_course(" 5to   Básico "), "5to Básico");
    }

    proptest! {
        #[test]
        fn prop_normalize_text_is_idempotent(raw in arb_messy_string()) {
            let once = normalize_text(&raw);
            prop_assert_eq!(normalize_text(&once), once);
        }

        #[test]
        fn prop_normalize_active_course_is_idempotent(raw in arb_messy_string()) {
            let once = normalize_active_course(&raw);
            prop_assert_eq!(normalize_active_course(&once), once);
        }
    }
}
