//! Display style (abbreviation and colours) for school subjects

use serde::{Deserialize, Serialize};

use crate::normalize::normalize_text;

/// How a subject is rendered in grade books and calendars
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectStyle {
    pub name: String,
    /// Three letter abbreviation
    pub abbreviation: String,
    pub color: String,
    pub bg_color: String,
    pub text_color: String,
}

struct KnownSubject {
    name: &'static str,
    abbreviation: &'static str,
    color: &'static str,
    bg_color: &'static str,
    text_color: &'static str,
}

const KNOWN_SUBJECTS: &[KnownSubject] = &[
    KnownSubject { name: "Ciencias Naturales", abbreviation: "CNT", color: "green", bg_color: "#bbf7d0", text_color: "#14532d" },
    KnownSubject { name: "Historia, Geografía y Ciencias Sociales", abbreviation: "HIS", color: "yellow", bg_color: "#fef3c7", text_color: "#78350f" },
    KnownSubject { name: "Lenguaje y Comunicación", abbreviation: "LEN", color: "red", bg_color: "#fecaca", text_color: "#7f1d1d" },
    KnownSubject { name: "Matemáticas", abbreviation: "MAT", color: "blue", bg_color: "#bfdbfe", text_color: "#1e3a8a" },
    KnownSubject { name: "Biología", abbreviation: "BIO", color: "green", bg_color: "#bbf7d0", text_color: "#14532d" },
    KnownSubject { name: "Física", abbreviation: "FIS", color: "purple", bg_color: "#e9d5ff", text_color: "#581c87" },
    KnownSubject { name: "Química", abbreviation: "QUI", color: "pink", bg_color: "#fecdd3", text_color: "#831843" },
    KnownSubject { name: "Ciencias para la Ciudadanía", abbreviation: "CPC", color: "teal", bg_color: "#99f6e4", text_color: "#134e4a" },
    KnownSubject { name: "Educación Ciudadana", abbreviation: "EDC", color: "indigo", bg_color: "#c7d2fe", text_color: "#312e81" },
    KnownSubject { name: "Filosofía", abbreviation: "FIL", color: "gray", bg_color: "#e5e7eb", text_color: "#111827" },
];

const FALLBACK_COLOR: &str = "gray";
const FALLBACK_BG: &str = "#f3f4f6";
const FALLBACK_TEXT: &str = "#1f2937";
const FALLBACK_ABBREVIATION: &str = "ASG";

/// Lists every subject with a fixed style
pub fn known_subjects() -> Vec<SubjectStyle> {
    KNOWN_SUBJECTS.iter().map(|s| to_style(s, s.name)).collect()
}

fn to_style(known: &KnownSubject, name: &str) -> SubjectStyle {
    SubjectStyle {
        name: name.to_string(),
        abbreviation: known.abbreviation.to_string(),
        color: known.color.to_string(),
        bg_color: known.bg_color.to_string(),
        text_color: known.text_color.to_string(),
    }
}

fn first_upper(word: &str, skip: usize) -> Option<char> {
    word.chars().nth(skip).map(|c| c.to_uppercase().next().unwrap_or(c))
}

/// Derives a three letter abbreviation for a subject with no fixed style
///
/// Three or more words use their initials; two words use both initials plus
/// the second letter of the second word; one word uses its first three letters.
pub fn derive_abbreviation(name: &str) -> String {
    let words: Vec<&str> = name.split_whitespace().collect();
    let letters: String = match words.as_slice() {
        [] => String::new(),
        [single] => single.chars().take(3).flat_map(char::to_uppercase).collect(),
        [first, second] => [
            first_upper(first, 0),
            first_upper(second, 0),
            first_upper(second, 1).or_else(|| first_upper(first, 1)),
        ]
        .into_iter()
        .flatten()
        .collect(),
        many => many.iter().take(3).filter_map(|w| first_upper(w, 0)).collect(),
    };

    if letters.is_empty() {
        FALLBACK_ABBREVIATION.to_string()
    } else {
        letters
    }
}

/// Looks up the style for a subject
///
/// Matching ignores case, accents and extra whitespace. Unknown subjects get
/// a derived abbreviation and a neutral grey palette.
pub fn subject_style(name: &str) -> SubjectStyle {
    let wanted = normalize_text(name);
    match KNOWN_SUBJECTS.iter().find(|s| normalize_text(s.name) == wanted) {
        Some(known) => to_style(known, known.name),
        None => SubjectStyle {
            name: name.trim().to_string(),
            abbreviation: derive_abbreviation(name),
            color: FALLBACK_COLOR.to_string(),
            bg_color: FALLBACK_BG.to_string(),
            text_color: FALLBACK_TEXT.to_string(),
        },
    }
}
