//! Illustrative images for generated slides
//!
//! Each lookup asks the configured providers in order (Pexels, Unsplash,
//! Google Custom Search) for one landscape photo. A provider without a key is
//! skipped, a failing one is logged and skipped, and when nothing answers in
//! time the image is a keyword URL on `source.unsplash.com`.

use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use crate::normalize::normalize_text;
use crate::ocr::GeminiClient;

pub const FALLBACK_IMAGE_BASE: &str = "https://source.unsplash.com/featured/1280x720/";

/// Upper bound for one image lookup across all providers
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(4);

/// Words appended to every keyword query
const EXTRA_KEYWORDS: [&str; 4] = ["education", "learning", "classroom", "illustration"];

pub const MAX_IMAGES: usize = 30;

static NON_ALPHANUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9\s]+").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageProvider {
    Pexels,
    Unsplash,
    GoogleCse,
}

impl ImageProvider {
    pub const ALL: [ImageProvider; 3] = [ImageProvider::Pexels, ImageProvider::Unsplash, ImageProvider::GoogleCse];

    fn default_base_url(self) -> &'static str {
        match self {
            ImageProvider::Pexels => "https://api.pexels.com",
            ImageProvider::Unsplash => "https://api.unsplash.com",
            ImageProvider::GoogleCse => "https://www.googleapis.com",
        }
    }
}

impl fmt::Display for ImageProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ImageProvider::Pexels => "pexels",
            ImageProvider::Unsplash => "unsplash",
            ImageProvider::GoogleCse => "google_cse",
        };
        f.write_str(name)
    }
}

/// API keys of the image providers; blank keys count as missing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageKeys {
    pub pexels_api_key: Option<String>,
    pub unsplash_access_key: Option<String>,
    pub google_cse_id: Option<String>,
    pub google_api_key: Option<String>,
}

fn present(key: &Option<String>) -> Option<&str> {
    key.as_deref().map(str::trim).filter(|k| !k.is_empty())
}

impl ImageKeys {
    /// Providers that have the keys they need, in lookup order
    pub fn configured(&self) -> Vec<ImageProvider> {
        ImageProvider::ALL
            .into_iter()
            .filter(|provider| match provider {
                ImageProvider::Pexels => present(&self.pexels_api_key).is_some(),
                ImageProvider::Unsplash => present(&self.unsplash_access_key).is_some(),
                ImageProvider::GoogleCse => {
                    present(&self.google_cse_id).is_some() && present(&self.google_api_key).is_some()
                }
            })
            .collect()
    }
}

/// Builds a comma separated English-friendly keyword query
///
/// Accents and punctuation are dropped, the first ten words of the inputs
/// are kept and the generic classroom keywords are appended, without
/// repeating a word.
pub fn build_image_keywords(parts: &[&str]) -> String {
    let joined = parts.iter().map(|p| normalize_text(p)).collect::<Vec<_>>().join(" ");
    let cleaned = NON_ALPHANUMERIC.replace_all(&joined, " ");

    let mut seen = HashSet::new();
    cleaned
        .split_whitespace()
        .take(10)
        .chain(EXTRA_KEYWORDS)
        .filter(|word| seen.insert(word.to_string()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// The image used when no provider answers
///
/// `index` makes the URL distinct per slide so the same query does not give
/// every slide the same picture.
pub fn fallback_image_url(query: &str, index: usize) -> String {
    match Url::parse(FALLBACK_IMAGE_BASE) {
        Ok(mut url) => {
            url.query_pairs_mut()
                .append_key_only(query.trim())
                .append_pair("sig", &(index + 1).to_string());
            url.into()
        }
        Err(_) => FALLBACK_IMAGE_BASE.to_string(),
    }
}

/// First string found at any of the JSON pointers
fn first_string(body: &Value, pointers: &[&str]) -> Option<String> {
    pointers
        .iter()
        .find_map(|pointer| body.pointer(pointer).and_then(Value::as_str))
        .filter(|url| !url.is_empty())
        .map(str::to_string)
}

/// Image lookups against the configured providers
#[derive(Debug, Clone)]
pub struct ImageSearch {
    http: reqwest::Client,
    keys: ImageKeys,
    base_urls: [String; 3],
}

impl ImageSearch {
    pub fn new(keys: ImageKeys) -> Self {
        Self {
            http: reqwest::Client::new(),
            keys,
            base_urls: ImageProvider::ALL.map(|p| p.default_base_url().to_string()),
        }
    }

    /// Points one provider at another host (a local stand-in in tests)
    pub fn with_base_url(mut self, provider: ImageProvider, base_url: &str) -> Self {
        self.base_urls[provider as usize] = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn providers(&self) -> Vec<ImageProvider> {
        self.keys.configured()
    }

    fn base_url(&self, provider: ImageProvider) -> &str {
        &self.base_urls[provider as usize]
    }

    /// One image URL for `query`; never fails
    ///
    /// The providers together get [`LOOKUP_TIMEOUT`]; after that, or when none
    /// returns a photo, the fallback URL is used.
    pub async fn find_image(&self, query: &str, index: usize) -> String {
        match tokio::time::timeout(LOOKUP_TIMEOUT, self.try_providers(query, index)).await {
            Ok(Some(url)) => url,
            Ok(None) => fallback_image_url(query, index),
            Err(_) => {
                warn!("Image lookup for {:?} timed out", query);
                fallback_image_url(query, index)
            }
        }
    }

    /// Looks up one image per query, all at once, keeping the query order
    pub async fn find_images(&self, queries: Vec<String>) -> Vec<String> {
        let mut lookups = JoinSet::new();
        for (index, query) in queries.iter().cloned().enumerate() {
            let search = self.clone();
            lookups.spawn(async move { (index, search.find_image(&query, index).await) });
        }

        let mut urls: Vec<Option<String>> = vec![None; queries.len()];
        while let Some(joined) = lookups.join_next().await {
            match joined {
                Ok((index, url)) => urls[index] = Some(url),
                Err(e) => warn!("Image lookup task failed: {}", e),
            }
        }

        urls.into_iter()
            .zip(queries.iter())
            .enumerate()
            .map(|(index, (url, query))| url.unwrap_or_else(|| fallback_image_url(query, index)))
            .collect()
    }

    async fn try_providers(&self, query: &str, index: usize) -> Option<String> {
        for provider in self.providers() {
            match self.query_provider(provider, query, index).await {
                Ok(Some(url)) => {
                    debug!("{} found an image for {:?}", provider, query);
                    return Some(url);
                }
                Ok(None) => debug!("{} had no image for {:?}", provider, query),
                Err(e) => warn!("{} lookup failed: {}", provider, e),
            }
        }
        None
    }

    async fn query_provider(
        &self,
        provider: ImageProvider,
        query: &str,
        index: usize,
    ) -> Result<Option<String>, reqwest::Error> {
        let base = self.base_url(provider);
        let request = match provider {
            ImageProvider::Pexels => self
                .http
                .get(format!("{}/v1/search", base))
                .header("Authorization", present(&self.keys.pexels_api_key).unwrap_or_default())
                .query(&[
                    ("query", query.to_string()),
                    ("per_page", "1".to_string()),
                    ("page", ((index % 50) + 1).to_string()),
                ]),
            ImageProvider::Unsplash => self.http.get(format!("{}/search/photos", base)).query(&[
                ("query", query.to_string()),
                ("per_page", "1".to_string()),
                ("page", ((index % 30) + 1).to_string()),
                ("orientation", "landscape".to_string()),
                ("client_id", present(&self.keys.unsplash_access_key).unwrap_or_default().to_string()),
            ]),
            ImageProvider::GoogleCse => self.http.get(format!("{}/customsearch/v1", base)).query(&[
                ("q", query),
                ("cx", present(&self.keys.google_cse_id).unwrap_or_default()),
                ("searchType", "image"),
                ("num", "1"),
                ("safe", "active"),
                ("imgType", "photo"),
                ("imgSize", "large"),
                ("key", present(&self.keys.google_api_key).unwrap_or_default()),
            ]),
        };

        let body: Value = request.send().await?.error_for_status()?.json().await?;
        let pointers: &[&str] = match provider {
            ImageProvider::Pexels => &["/photos/0/src/large", "/photos/0/src/landscape", "/photos/0/src/medium"],
            ImageProvider::Unsplash => &["/results/0/urls/regular", "/results/0/urls/full", "/results/0/urls/small"],
            ImageProvider::GoogleCse => &["/items/0/link"],
        };
        Ok(first_string(&body, pointers))
    }
}

/// Query of `GET /images/search`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSearchQuery {
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub subject: String,
    /// How many images, clamped to 1..=30; 30 when absent
    #[serde(default)]
    pub n: Option<usize>,
    /// `gemini` asks the model for varied queries instead of one keyword query
    #[serde(default)]
    pub ai: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSearchResponse {
    pub topic: String,
    pub subject: String,
    pub count: usize,
    pub urls: Vec<String>,
}

#[derive(Deserialize)]
struct QueryList {
    queries: Vec<String>,
}

fn query_list_prompt(count: usize, topic: &str, subject: &str) -> String {
    format!(
        "Generate {count} diverse, concise English image search queries for educational presentation \
         slide backgrounds about topic: \"{topic}\" and subject: \"{subject}\".\n\
         Requirements:\n\
         - Landscape photos, high-quality, classroom-friendly, illustrative\n\
         - No quotes, no punctuation at the end, 3-7 words each\n\
         - Vary subtopics and perspectives to avoid duplicates\n\n\
         Return ONLY JSON as: {{\"queries\":[\"...\"]}}"
    )
}

/// Asks Gemini for `count` varied queries; `None` on any failure
async fn ai_queries(client: &GeminiClient, count: usize, topic: &str, subject: &str) -> Option<Vec<String>> {
    let prompt = query_list_prompt(count, topic, subject);
    let text = match client.generate_json(&prompt, 0.6, 1024).await {
        Ok(text) => text,
        Err(e) => {
            warn!("Gemini query generation failed, using keywords: {}", e);
            return None;
        }
    };
    let list: QueryList = serde_json::from_value(crate::ocr::parse_analysis(&text)?).ok()?;
    let queries: Vec<String> = list
        .queries
        .into_iter()
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .take(count)
        .collect();
    if queries.is_empty() { None } else { Some(queries) }
}

/// Finds up to 30 background images for a topic
///
/// Every image uses the same keyword query unless `ai=gemini` is given and a
/// Gemini client is configured, in which case the model proposes one query
/// per image; missing model queries are filled with the keyword query.
#[instrument(skip(search, gemini))]
pub async fn search_images(
    search: &ImageSearch,
    gemini: Option<&GeminiClient>,
    query: &ImageSearchQuery,
) -> ImageSearchResponse {
    let count = query.n.unwrap_or(MAX_IMAGES).clamp(1, MAX_IMAGES);
    let keywords = build_image_keywords(&[&query.topic, &query.subject]);

    let wants_ai = query.ai.as_deref().is_some_and(|ai| ai.eq_ignore_ascii_case("gemini"));
    let mut queries = match (wants_ai, gemini) {
        (true, Some(client)) => ai_queries(client, count, &query.topic, &query.subject)
            .await
            .unwrap_or_default(),
        _ => Vec::new(),
    };
    queries.resize(count, keywords);

    let urls = search.find_images(queries).await;
    info!("Found {} images for {:?}", urls.len(), query.topic);
    ImageSearchResponse {
        topic: query.topic.clone(),
        subject: query.subject.clone(),
        count: urls.len(),
        urls,
    }
}

#[cfg(test)]
mod tests;
