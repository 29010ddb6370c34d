//! Slide content for class presentations
//!
//! A request names a topic, a subject and how many slides are wanted. With a
//! Gemini client the content comes from the model; without one, or when the
//! model cannot be reached, slides are built from per-subject templates.
//! Either way every slide gets an illustrative image from [`crate::images`].

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::images::{ImageSearch, build_image_keywords};
use crate::normalize::normalize_text;
use crate::ocr::{GeminiClient, parse_analysis};

pub const MAX_SLIDES: u32 = 30;

static GENERIC_TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)aspecto|aspect|parte|seccion|section|slide\s*\d+").expect("valid regex"));

static GENERIC_POINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)punto clave|key point|aspecto|aspect|item \d+|punto \d+").expect("valid regex")
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlideLanguage {
    #[default]
    Es,
    En,
}

/// Body of `POST /slides/generate`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlidesRequest {
    pub topic: String,
    pub subject: String,
    #[serde(alias = "slideCount")]
    pub slide_count: u32,
    #[serde(default)]
    pub language: SlideLanguage,
}

impl SlidesRequest {
    /// Checks the request, returning the message to show when it is unusable
    pub fn validate(&self) -> Result<(), String> {
        if self.topic.trim().is_empty() {
            return Err("El tema es requerido".to_string());
        }
        if self.subject.trim().is_empty() {
            return Err("La asignatura es requerida".to_string());
        }
        if !(1..=MAX_SLIDES).contains(&self.slide_count) {
            return Err(format!("El número de diapositivas debe estar entre 1 y {}", MAX_SLIDES));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slide {
    pub title: String,
    #[serde(default)]
    pub content: Vec<String>,
    /// Short English query for the slide's image
    #[serde(default, alias = "imageSearchQuery", skip_serializing_if = "Option::is_none")]
    pub image_search_query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// Where the slide content came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SlidesSource {
    /// Written by the model
    Ai,
    /// Templates, because no API key is configured
    Mock,
    /// Templates, because the model failed or gave nothing usable
    MockFallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlidesResponse {
    pub slides: Vec<Slide>,
    pub generated: bool,
    pub source: SlidesSource,
}

/// Template text for one subject, `{t}` standing for the topic
struct SubjectTemplate {
    /// Normalized subject name that selects this template
    key: &'static str,
    aspects_es: [&'static str; 5],
    aspects_en: [&'static str; 5],
    points_es: [&'static str; 4],
    points_en: [&'static str; 4],
}

static TEMPLATES: [SubjectTemplate; 4] = [
    SubjectTemplate {
        key: "ciencias naturales",
        aspects_es: ["Definición y contexto", "Características clave", "Estructura y componentes", "Procesos principales", "Importancia y aplicaciones"],
        aspects_en: ["Definition & context", "Key characteristics", "Structure & components", "Main processes", "Importance & applications"],
        points_es: [
            "Descripción específica de {t} en Ciencias Naturales",
            "Elementos/partes principales y su función",
            "Ejemplo real o fenómeno relacionado con {t}",
            "Relación de {t} con el entorno o sistemas biológicos/químicos/físicos",
        ],
        points_en: [
            "Specific description of {t} in Natural Sciences",
            "Main elements/parts and their function",
            "Real example or phenomenon related to {t}",
            "Relation of {t} with environment or biological/chemical/physical systems",
        ],
    },
    SubjectTemplate {
        key: "lenguaje y comunicacion",
        aspects_es: ["Concepto y uso", "Estructura/gramática", "Ejemplos y análisis", "Recursos expresivos", "Aplicación comunicativa"],
        aspects_en: ["Concept & use", "Structure/grammar", "Examples & analysis", "Expressive resources", "Communicative application"],
        points_es: [
            "Definición precisa de {t} y su función comunicativa",
            "Reglas o estructuras asociadas a {t}",
            "Ejemplo textual breve que ilustre {t}",
            "Recomendaciones para usar {t} correctamente",
        ],
        points_en: [
            "Precise definition of {t} and its communicative function",
            "Rules or structures associated with {t}",
            "Short text example illustrating {t}",
            "Recommendations to use {t} correctly",
        ],
    },
    SubjectTemplate {
        key: "matematicas",
        aspects_es: ["Definición", "Propiedades", "Procedimiento", "Ejemplos resueltos", "Aplicaciones"],
        aspects_en: ["Definition", "Properties", "Procedure", "Solved examples", "Applications"],
        points_es: [
            "Explicación formal de {t}",
            "Propiedades o teoremas clave vinculados a {t}",
            "Pasos para resolver ejercicios de {t}",
            "Ejemplo resuelto paso a paso",
        ],
        points_en: [
            "Formal explanation of {t}",
            "Key properties or theorems related to {t}",
            "Steps to solve {t} exercises",
            "Step-by-step solved example",
        ],
    },
    SubjectTemplate {
        key: "historia",
        aspects_es: ["Contexto histórico", "Acontecimientos clave", "Personajes relevantes", "Causas y consecuencias", "Legado e impacto"],
        aspects_en: ["Historical context", "Key events", "Relevant figures", "Causes and consequences", "Legacy and impact"],
        points_es: [
            "Marco temporal y geográfico de {t}",
            "Hechos determinantes relacionados con {t}",
            "Actores/personajes y su rol",
            "Consecuencias a corto y largo plazo",
        ],
        points_en: [
            "Time and geographic frame of {t}",
            "Determinant facts related to {t}",
            "Actors/figures and their role",
            "Short and long-term consequences",
        ],
    },
];

/// The template whose key appears in the subject; natural sciences otherwise
fn template_for(subject: &str) -> &'static SubjectTemplate {
    let subject = normalize_text(subject);
    TEMPLATES
        .iter()
        .find(|template| subject.contains(template.key))
        .unwrap_or(&TEMPLATES[0])
}

/// Builds `count` slides from the subject's template
pub fn heuristic_slides(topic: &str, subject: &str, count: usize, language: SlideLanguage) -> Vec<Slide> {
    let topic = topic.trim();
    let template = template_for(subject);
    let (aspects, points) = match language {
        SlideLanguage::Es => (&template.aspects_es, &template.points_es),
        SlideLanguage::En => (&template.aspects_en, &template.points_en),
    };

    (0..count)
        .map(|i| Slide {
            title: format!("{}: {}", topic, aspects[i % aspects.len()]),
            content: points.iter().map(|p| p.replace("{t}", topic)).collect(),
            image_search_query: Some(format!("{} {} educational slide, high quality, {}", topic, subject, i + 1)),
            image_url: None,
        })
        .collect()
}

pub fn is_generic_title(title: &str) -> bool {
    GENERIC_TITLE.is_match(title)
}

pub fn is_generic_point(point: &str) -> bool {
    GENERIC_POINT.is_match(point)
}

/// Replaces placeholder titles and filler bullet lists with template text
///
/// A title is replaced when blank or generic ("Aspecto 2", "Slide 3"); the
/// bullets only when every one of them is blank or generic.
pub fn refine_generic_slides(slides: Vec<Slide>, topic: &str, subject: &str, language: SlideLanguage) -> Vec<Slide> {
    let templates = heuristic_slides(topic, subject, slides.len(), language);

    slides
        .into_iter()
        .zip(templates)
        .map(|(mut slide, template)| {
            if slide.title.trim().is_empty() || is_generic_title(&slide.title) {
                slide.title = template.title;
            }
            if slide.content.iter().all(|p| p.trim().is_empty() || is_generic_point(p)) {
                slide.content = template.content;
            }
            slide
        })
        .collect()
}

pub fn build_slides_prompt(request: &SlidesRequest) -> String {
    let SlidesRequest { topic, subject, slide_count: count, .. } = request;
    let shape = r#"Responde SOLO con JSON: {"slides":[{"title":"...","content":["..."],"imageSearchQuery":"..."}]}"#;

    match request.language {
        SlideLanguage::Es => format!(
            "Genera el contenido para una presentación educativa de {count} diapositivas sobre \"{topic}\" en la asignatura \"{subject}\".\n\n\
             Requisitos por cada diapositiva:\n\
             - Título concreto y temático (evita \"Aspecto\", \"Parte\", numeraciones genéricas).\n\
             - 3 a 5 puntos clave con información específica del tema; evita frases vacías como \"punto clave\".\n\
             - Contenido factual y adecuado al nivel de la asignatura, con definiciones, ejemplos reales o aplicaciones.\n\
             - Campo \"imageSearchQuery\" con consulta breve en inglés para buscar una imagen (solo palabras clave, sin comillas).\n\n\
             No generes diapositiva de portada ni de conclusión: entrega exactamente {count} diapositivas de contenido.\n\
             El lenguaje debe ser claro y pedagógico.\n{shape}"
        ),
        SlideLanguage::En => format!(
            "Generate content for an educational presentation of {count} slides about \"{topic}\" for the subject \"{subject}\".\n\n\
             Requirements per slide:\n\
             - Concrete, topic-focused title (avoid generic \"Aspect\", \"Part\", numeric-only names).\n\
             - 3 to 5 key points with specific information; avoid filler like \"key point\".\n\
             - Factual content appropriate for the subject level, include definitions, real examples or applications.\n\
             - An \"imageSearchQuery\" in English with short keywords (no quotes).\n\n\
             Do not include a cover or conclusion slide: produce exactly {count} content slides.\n\
             Use clear, pedagogical language.\n{shape}"
        ),
    }
}

#[derive(Deserialize)]
struct SlidesReply {
    slides: Vec<Slide>,
}

/// Reads the slides out of a model reply; `None` when there are none
pub fn parse_slides(text: &str) -> Option<Vec<Slide>> {
    let reply: SlidesReply = serde_json::from_value(parse_analysis(text)?).ok()?;
    let slides: Vec<Slide> = reply.slides.into_iter().take(MAX_SLIDES as usize).collect();
    if slides.is_empty() { None } else { Some(slides) }
}

/// Asks the model for slides; `None` when it fails or says nothing usable
async fn ai_slides(client: &GeminiClient, request: &SlidesRequest) -> Option<Vec<Slide>> {
    let text = match client.generate_json(&build_slides_prompt(request), 0.4, 3072).await {
        Ok(text) => text,
        Err(e) => {
            warn!("Slide generation failed, using templates: {}", e);
            return None;
        }
    };
    let slides = parse_slides(&text);
    if slides.is_none() {
        warn!("Model reply had no usable slides, using templates");
    }
    slides
}

/// Gives every slide an image URL, searching with its own query or with
/// keywords taken from the topic, subject and slide text
async fn attach_images(images: &ImageSearch, slides: Vec<Slide>, topic: &str, subject: &str) -> Vec<Slide> {
    let queries: Vec<String> = slides
        .iter()
        .map(|slide| match slide.image_search_query.as_deref().map(str::trim) {
            Some(query) if !query.is_empty() => query.to_string(),
            _ => build_image_keywords(&[topic, subject, &slide.title, &slide.content.join(" ")]),
        })
        .collect();
    let urls = images.find_images(queries).await;

    slides
        .into_iter()
        .zip(urls)
        .map(|(slide, url)| Slide { image_url: Some(url), ..slide })
        .collect()
}

/// Generates the slides of a presentation
///
/// The request must already be valid (see [`SlidesRequest::validate`]).
/// This never fails: model errors fall back to the templates.
#[instrument(skip(gemini, images), fields(topic = %request.topic, count = request.slide_count))]
pub async fn generate_slides(
    gemini: Option<&GeminiClient>,
    images: &ImageSearch,
    request: &SlidesRequest,
) -> SlidesResponse {
    let count = request.slide_count as usize;
    let topic = request.topic.trim();
    let subject = request.subject.trim();

    let (slides, source) = match gemini {
        None => {
            warn!("Gemini API key not configured; building slides from templates");
            (heuristic_slides(topic, subject, count, request.language), SlidesSource::Mock)
        }
        Some(client) => match ai_slides(client, request).await {
            Some(slides) => (refine_generic_slides(slides, topic, subject, request.language), SlidesSource::Ai),
            None => (heuristic_slides(topic, subject, count, request.language), SlidesSource::MockFallback),
        },
    };

    let slides = attach_images(images, slides, topic, subject).await;
    info!("Generated {} slides ({:?})", slides.len(), source);
    SlidesResponse { slides, generated: true, source }
}

#[cfg(test)]
mod tests;
