//! `yt-dlp` backed media resolver.
//!
//! Direct `http(s)://` locators are passed through unchanged. Text queries are
//! shaped toward music results: words containing an excluded term are dropped,
//! a suffix is appended, and the top results of a search are inspected until
//! one carries a direct stream URL.

use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use super::traits::{MediaResolver, ResolveError};
use super::types::{StreamSource, TrackDescriptor, UNKNOWN_TITLE};

/// Configuration for the `yt-dlp` resolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct YtDlpConfig {
    /// Executable to run.
    pub program: String,
    /// Format selector passed with `-f`.
    pub format: String,
    /// Terms appended to every text search.
    pub search_suffix: String,
    /// Words containing any of these terms are removed from text searches.
    pub search_exclude: Vec<String>,
    /// Number of search results inspected when resolving a text query.
    pub search_results: usize,
}

impl Default for YtDlpConfig {
    fn default() -> Self {
        Self {
            program: "yt-dlp".to_string(),
            format: "bestaudio/best".to_string(),
            search_suffix: "music lyrics audio".to_string(),
            search_exclude: vec![
                "interview".to_string(),
                "podcast".to_string(),
                "trailer".to_string(),
            ],
            search_results: 10,
        }
    }
}

/// Returns true if `query` is a direct web locator.
#[must_use]
pub fn is_url(query: &str) -> bool {
    let query = query.trim();
    query.starts_with("http://") || query.starts_with("https://")
}

/// Drops every word that contains one of the `exclude` terms (case-insensitive).
#[must_use]
pub fn clean_query(query: &str, exclude: &[String]) -> String {
    query
        .split_whitespace()
        .filter(|word| {
            let word = word.to_lowercase();
            !exclude.iter().any(|term| word.contains(&term.to_lowercase()))
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Builds the `yt-dlp` input for a query: a URL as-is, or a `ytsearchN:` term.
#[must_use]
pub fn build_search_input(query: &str, config: &YtDlpConfig, limit: usize) -> String {
    if is_url(query) {
        return query.trim().to_string();
    }
    let cleaned = clean_query(query, &config.search_exclude);
    let terms = format!("{} {}", cleaned, config.search_suffix);
    format!("ytsearch{}:{}", limit, terms.trim())
}

/// Builds a descriptor from one `--dump-json` entry.
///
/// Returns `None` for entries without a direct stream URL.
pub(crate) fn descriptor_from_json(value: serde_json::Value) -> Option<TrackDescriptor> {
    let non_empty = |key: &str| {
        value
            .get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let stream_url = non_empty("url")?;
    let title = non_empty("title").unwrap_or_else(|| UNKNOWN_TITLE.to_string());
    let webpage_url = non_empty("webpage_url");
    let thumbnail = non_empty("thumbnail");
    let duration_secs = value
        .get("duration")
        .and_then(|v| v.as_f64())
        .filter(|d| *d >= 0.0)
        .map(|d| d as u64);

    Some(TrackDescriptor {
        stream_url,
        title,
        webpage_url,
        thumbnail,
        duration_secs,
        raw: value,
    })
}

/// Parses newline-delimited JSON entries, skipping ones with no stream URL.
fn parse_entries(stdout: &str) -> Result<Vec<TrackDescriptor>, ResolveError> {
    let mut entries = Vec::new();
    for line in stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let value: serde_json::Value =
            serde_json::from_str(line).map_err(|e| ResolveError::Parse(e.to_string()))?;
        if let Some(descriptor) = descriptor_from_json(value) {
            entries.push(descriptor);
        }
    }
    Ok(entries)
}

/// Media resolver that runs `yt-dlp --dump-json` as a subprocess.
pub struct YtDlpResolver {
    config: YtDlpConfig,
}

impl YtDlpResolver {
    pub fn new(config: YtDlpConfig) -> Self {
        Self { config }
    }

    fn command_args(&self, input: &str, limit: usize) -> Vec<String> {
        vec![
            "--dump-json".to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--ignore-errors".to_string(),
            "-f".to_string(),
            self.config.format.clone(),
            "--playlist-end".to_string(),
            limit.max(1).to_string(),
            "--".to_string(),
            input.to_string(),
        ]
    }

    async fn run(&self, input: &str, limit: usize) -> Result<Vec<TrackDescriptor>, ResolveError> {
        log::debug!("[YtDlp] Running {} for {:?}", self.config.program, input);

        let output = Command::new(&self.config.program)
            .args(self.command_args(input, limit))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ResolveError::Process(format!("{}: {}", self.config.program, e)))?;

        // --ignore-errors can exit non-zero while still printing usable entries.
        let entries = parse_entries(&String::from_utf8_lossy(&output.stdout))?;
        if entries.is_empty() && !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .unwrap_or("no output")
                .trim()
                .to_string();
            return Err(ResolveError::Process(format!("{} ({})", reason, output.status)));
        }
        Ok(entries)
    }
}

#[async_trait]
impl MediaResolver for YtDlpResolver {
    async fn resolve(&self, query: &str) -> Result<TrackDescriptor, ResolveError> {
        let input = build_search_input(query, &self.config, self.config.search_results);
        let entries = self.run(&input, self.config.search_results).await?;
        let descriptor = entries
            .into_iter()
            .next()
            .ok_or_else(|| ResolveError::NotFound(query.trim().to_string()))?;

        log::info!("[YtDlp] Resolved {:?} -> {}", query, descriptor.title);
        Ok(descriptor)
    }

    async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<TrackDescriptor>, ResolveError> {
        let input = build_search_input(query, &self.config, limit);
        let mut entries = self.run(&input, limit).await?;
        entries.truncate(limit);
        if entries.is_empty() {
            return Err(ResolveError::NotFound(query.trim().to_string()));
        }
        Ok(entries)
    }

    async fn reopen_at(
        &self,
        descriptor: &TrackDescriptor,
        offset_secs: u64,
    ) -> Result<StreamSource, ResolveError> {
        if descriptor.stream_url.is_empty() {
            return Err(ResolveError::Unplayable(descriptor.title.clone()));
        }
        Ok(StreamSource::track(&descriptor.stream_url, offset_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::SourceKind;
    use serde_json::json;

    #[test]
    fn detects_direct_locators() {
        assert!(is_url("https://youtu.be/abc"));
        assert!(is_url("  http://example.com/a.mp3"));
        assert!(!is_url("daft punk"));
        assert!(!is_url("ftp://example.com"));
    }

    #[test]
    fn clean_query_drops_words_containing_excluded_terms() {
        let exclude = YtDlpConfig::default().search_exclude;
        assert_eq!(
            clean_query("Radiohead Interview Creep podcasts", &exclude),
            "Radiohead Creep"
        );
        assert_eq!(clean_query("movie-trailer", &exclude), "");
    }

    #[test]
    fn build_search_input_shapes_text_queries() {
        let config = YtDlpConfig::default();
        assert_eq!(
            build_search_input("daft punk podcast", &config, 10),
            "ytsearch10:daft punk music lyrics audio"
        );
        assert_eq!(
            build_search_input("https://youtu.be/abc ", &config, 10),
            "https://youtu.be/abc"
        );
        assert_eq!(
            build_search_input("trailer", &config, 3),
            "ytsearch3:music lyrics audio"
        );
    }

    #[test]
    fn descriptor_from_json_requires_stream_url() {
        assert!(descriptor_from_json(json!({ "title": "No URL" })).is_none());

        let d = descriptor_from_json(json!({
            "url": "https://cdn/a.webm",
            "title": "",
            "webpage_url": "https://video/a",
            "thumbnail": "",
            "duration": 212.4,
        }))
        .unwrap();
        assert_eq!(d.title, UNKNOWN_TITLE);
        assert_eq!(d.webpage_url.as_deref(), Some("https://video/a"));
        assert_eq!(d.thumbnail, None);
        assert_eq!(d.duration_secs, Some(212));
        assert_eq!(d.raw["duration"], 212.4);
    }

    #[test]
    fn parse_entries_skips_unplayable_lines() {
        let stdout = "{\"title\":\"bad\"}\n\n{\"url\":\"https://cdn/b\",\"title\":\"B\"}\n";
        let entries = parse_entries(stdout).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "B");

        assert!(matches!(
            parse_entries("not json"),
            Err(ResolveError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn reopen_at_uses_stored_locator() {
        let resolver = YtDlpResolver::new(YtDlpConfig::default());
        let d = TrackDescriptor::new("https://cdn/a.webm", "A");

        let source = resolver.reopen_at(&d, 42).await.unwrap();
        assert_eq!(source.locator, "https://cdn/a.webm");
        assert_eq!(source.start_offset_secs, 42);
        assert_eq!(source.kind, SourceKind::Track);

        let broken = TrackDescriptor::new("", "Broken");
        assert!(matches!(
            resolver.reopen_at(&broken, 0).await,
            Err(ResolveError::Unplayable(_))
        ));
    }

    #[tokio::test]
    async fn missing_program_is_a_process_error() {
        let resolver = YtDlpResolver::new(YtDlpConfig {
            program: "guildtune-no-such-binary".to_string(),
            ..Default::default()
        });
        assert!(matches!(
            resolver.resolve("anything").await,
            Err(ResolveError::Process(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_program_with_no_output_is_a_process_error() {
        let resolver = YtDlpResolver::new(YtDlpConfig {
            program: "false".to_string(),
            ..Default::default()
        });
        assert!(matches!(
            resolver.search("anything", 5).await,
            Err(ResolveError::Process(_))
        ));
    }
}
