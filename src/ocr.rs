//! Answer sheet analysis through a Gemini vision model
//!
//! The request carries one scanned page and, optionally, the expected
//! question structure of the test. The model is asked to return a JSON
//! analysis of the marks it sees; this module builds the prompt, talks to the
//! `generateContent` endpoint and turns the reply into an [`OcrResponse`].

use std::sync::LazyLock;
use std::time::Duration;

use base64::{Engine, engine::general_purpose::STANDARD};
use regex::Regex;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Retries after a 429 or 503 reply to a vision request
const VISION_RETRIES: u32 = 3;
const VISION_RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

/// Text-only requests (slides, image queries) give up sooner
const TEXT_RETRIES: u32 = 2;
const TEXT_RETRY_BASE_DELAY: Duration = Duration::from_millis(600);
const TEXT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

static DATA_URL_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^data:image/(?:png|jpeg|jpg|webp);base64,").expect("valid regex"));

#[derive(Error, Debug)]
pub enum OcrError {
    #[error("La imagen es requerida")]
    MissingImage,
    #[error("Invalid image payload: {0}")]
    InvalidImage(String),
    #[error("Gemini request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Gemini returned {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error("Gemini reply had no text")]
    EmptyReply,
}

/// Kind of question on the answer sheet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionKind {
    /// True/false
    Tf,
    /// Multiple choice, one answer
    Mc,
    /// Multiple selection
    Ms,
    /// Written development answer
    Des,
    #[serde(other)]
    Other,
}

/// An option is either plain text or an object with a `text` field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QuestionOption {
    Text(String),
    Object { text: String },
}

impl QuestionOption {
    pub fn text(&self) -> &str {
        match self {
            QuestionOption::Text(text) | QuestionOption::Object { text } => text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrQuestion {
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub options: Vec<QuestionOption>,
}

/// One page to analyze
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrRequest {
    #[serde(alias = "imageBase64")]
    pub image_base64: String,
    #[serde(default)]
    pub questions: Vec<OcrQuestion>,
    #[serde(default, alias = "pageNumber")]
    pub page_number: Option<u32>,
    #[serde(default, alias = "focusQuestionNums")]
    pub focus_question_nums: Vec<u32>,
    #[serde(default, alias = "focusDevelopment")]
    pub focus_development: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub fallback: bool,
}

impl OcrResponse {
    fn fallback(error: &str) -> Self {
        Self {
            success: false,
            analysis: None,
            page_number: None,
            raw_response: None,
            error: Some(error.to_string()),
            fallback: true,
        }
    }
}

/// Removes a `data:image/...;base64,` prefix and checks the rest is base64
pub fn clean_image_base64(raw: &str) -> Result<String, OcrError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(OcrError::MissingImage);
    }
    let payload = DATA_URL_PREFIX.replace(trimmed, "");
    STANDARD
        .decode(payload.as_bytes())
        .map_err(|e| OcrError::InvalidImage(e.to_string()))?;
    Ok(payload.into_owned())
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn option_letter(index: usize) -> char {
    (b'A' + (index % 26) as u8) as char
}

fn describe_question(number: usize, question: &OcrQuestion) -> String {
    let options = |width: usize| {
        question
            .options
            .iter()
            .enumerate()
            .map(|(i, o)| format!("{}={}", option_letter(i), truncate(o.text(), width)))
            .collect::<Vec<_>>()
            .join(" | ")
    };
    match question.kind {
        QuestionKind::Tf => format!("P{}: [Verdadero/Falso] \"{}\"", number, truncate(&question.text, 50)),
        QuestionKind::Mc => format!(
            "P{}: [MC - Opciones: {}] \"{}\"",
            number,
            options(20),
            truncate(&question.text, 30)
        ),
        QuestionKind::Ms => format!(
            "P{}: [MS - Múltiples: {}] \"{}\"",
            number,
            options(15),
            truncate(&question.text, 30)
        ),
        QuestionKind::Des => format!(
            "P{}: [DESARROLLO - Extraer TEXTO MANUSCRITO completo] \"{}\"",
            number,
            truncate(&question.text, 50)
        ),
        QuestionKind::Other => format!("P{}: [Otro tipo]", number),
    }
}

/// Builds the instruction text sent along with the page image
pub fn build_prompt(request: &OcrRequest) -> String {
    let total = request.questions.len();
    let last = if total > 0 { total.to_string() } else { "ÚLTIMO NÚMERO VISIBLE".to_string() };

    let structure = if request.questions.is_empty() {
        "Estructura genérica: Busca preguntas numeradas.".to_string()
    } else {
        let lines: Vec<String> = request
            .questions
            .iter()
            .enumerate()
            .map(|(i, q)| describe_question(i + 1, q))
            .collect();
        format!(
            "ESTRUCTURA ESPERADA DE LA PRUEBA (las opciones están en orden A, B, C, D de arriba a abajo):\n{}",
            lines.join("\n")
        )
    };

    let focus: Vec<String> = request
        .focus_question_nums
        .iter()
        .filter(|n| **n > 0)
        .map(|n| n.to_string())
        .collect();
    let mut focus_section = String::new();
    if !focus.is_empty() {
        focus_section = format!(
            "MODO RE-CHEQUEO (FOCO): Analiza SOLO estas preguntas: {}.\n\
             - Ignora el resto del documento.\n\
             - Devuelve exactamente esas preguntas en \"answers\".\n",
            focus.join(", ")
        );
        if request.focus_development {
            focus_section.push_str(
                "MODO DESARROLLO OBLIGATORIO: extrae TODO el texto manuscrito, \
                 incluidos números y operaciones. val debe contener el texto, no null.\n",
            );
        }
    }

    format!(
        "ROL: Auditor de Exámenes Escolares (Visión Artificial OMR).\n\
         \n\
         TAREA: Analizar la imagen y extraer TODAS las preguntas visibles, del 1 al {last}.\n\
         \n\
         {focus_section}\n\
         {structure}\n\
         \n\
         TIPOS:\n\
         - tf: marca en V o F -> val = \"V\" o \"F\"\n\
         - mc: la opción marcada según su posición (1ª=A, 2ª=B, 3ª=C, 4ª=D)\n\
         - ms: todas las letras marcadas, separadas por coma y en orden (\"A,C\")\n\
         - des: el texto manuscrito del estudiante (máximo 500 caracteres)\n\
         Sin marca o marca dudosa -> val = null.\n\
         \n\
         FORMATO (JSON puro):\n\
         {{\"questionsFound\": n, \"student\": {{\"name\": null, \"rut\": null}}, \
         \"answers\": [{{\"q\": 1, \"type\": \"tf\", \"evidence\": \"STRONG_X en V\", \"val\": \"V\"}}], \
         \"confidence\": \"High\"}}\n\
         \n\
         Devuelve SOLO JSON válido."
    )
}

/// Removes markdown code fences around a model reply
pub fn strip_code_fences(text: &str) -> String {
    text.replace("```json", "").replace("```", "").trim().to_string()
}

/// Parses the model's JSON analysis, falling back to the outermost braces
pub fn parse_analysis(text: &str) -> Option<Value> {
    let clean = strip_code_fences(text);
    if let Ok(value) = serde_json::from_str::<Value>(&clean) {
        return Some(value);
    }
    let start = clean.find('{')?;
    let end = clean.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&clean[start..=end]).ok()
}

/// Minimal client for the Gemini `generateContent` endpoint
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    /// Overrides both retry base delays
    retry_base_delay: Option<Duration>,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            model,
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            retry_base_delay: None,
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = Some(delay);
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }

    /// Sends the prompt and image, retrying on 429 and 503 with exponential backoff
    ///
    /// ### Returns
    ///
    /// The concatenated text parts of the first candidate
    #[instrument(skip(self, prompt, image_base64), fields(model = %self.model))]
    pub async fn generate(&self, prompt: &str, image_base64: &str) -> Result<String, OcrError> {
        let body = json!({
            "contents": [{
                "parts": [
                    { "text": prompt },
                    { "inline_data": { "mime_type": "image/jpeg", "data": image_base64 } }
                ]
            }]
        });

        self.post_with_retry(&body, VISION_RETRIES, VISION_RETRY_BASE_DELAY, None).await
    }

    /// Sends a text prompt asking for a JSON reply
    ///
    /// Each attempt is bounded by a 15 second timeout; timeouts, 429 and 503
    /// are retried twice with a 600 ms base delay.
    #[instrument(skip(self, prompt), fields(model = %self.model))]
    pub async fn generate_json(
        &self,
        prompt: &str,
        temperature: f32,
        max_output_tokens: u32,
    ) -> Result<String, OcrError> {
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": temperature,
                "maxOutputTokens": max_output_tokens,
                "responseMimeType": "application/json"
            }
        });

        self.post_with_retry(&body, TEXT_RETRIES, TEXT_RETRY_BASE_DELAY, Some(TEXT_REQUEST_TIMEOUT))
            .await
    }

    async fn post_with_retry(
        &self,
        body: &Value,
        max_retries: u32,
        base_delay: Duration,
        timeout: Option<Duration>,
    ) -> Result<String, OcrError> {
        let base_delay = self.retry_base_delay.unwrap_or(base_delay);
        let mut attempt = 0;
        loop {
            let mut request = self
                .http
                .post(self.endpoint())
                .header("x-goog-api-key", &self.api_key)
                .json(body);
            if let Some(timeout) = timeout {
                request = request.timeout(timeout);
            }
            let delay = base_delay * 2u32.pow(attempt);

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) if e.is_timeout() && attempt < max_retries => {
                    warn!("Gemini timed out, retrying in {:?} (attempt {})", delay, attempt + 1);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let status = response.status();
            let retryable =
                status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE;
            if retryable && attempt < max_retries {
                warn!("Gemini returned {}, retrying in {:?} (attempt {})", status, delay, attempt + 1);
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(OcrError::Api { status, body });
            }

            let reply: Value = response.json().await?;
            return extract_text(&reply).ok_or(OcrError::EmptyReply);
        }
    }
}

/// Joins the text parts of the first candidate of a `generateContent` reply
fn extract_text(reply: &Value) -> Option<String> {
    let parts = reply
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();
    if text.is_empty() { None } else { Some(text) }
}

/// Analyzes one answer sheet page
///
/// Without a client (no API key configured) no request is made and a
/// `fallback` response is returned.
///
/// ### Errors
///
/// Returns `MissingImage` or `InvalidImage` for a bad payload, and the client
/// error when the model cannot be reached.
pub async fn analyze(client: Option<&GeminiClient>, request: &OcrRequest) -> Result<OcrResponse, OcrError> {
    let image = clean_image_base64(&request.image_base64)?;

    let Some(client) = client else {
        warn!("Gemini API key not configured; returning fallback");
        return Ok(OcrResponse::fallback("API key no configurada"));
    };

    info!("Analyzing page {:?}", request.page_number);
    let prompt = build_prompt(request);
    let text = client.generate(&prompt, &image).await?;
    debug!("Raw model reply: {}", truncate(&text, 500));

    Ok(match parse_analysis(&text) {
        Some(analysis) => OcrResponse {
            success: true,
            analysis: Some(analysis),
            page_number: request.page_number,
            raw_response: None,
            error: None,
            fallback: false,
        },
        None => OcrResponse {
            success: false,
            analysis: None,
            page_number: request.page_number,
            raw_response: Some(text),
            error: Some("Error parseando respuesta de IA".to_string()),
            fallback: false,
        },
    })
}

#[cfg(test)]
mod tests;
