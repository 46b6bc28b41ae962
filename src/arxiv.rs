//! arXiv search and PDF download.
//!
//! Queries the public Atom export API sorted by submission date (newest
//! first), parses the feed with `quick-xml`, and downloads PDFs over plain
//! HTTPS. Pagination and upstream retry policy are deliberately absent: one
//! request returns at most `max_results` entries.
//!
//! # Configuration
//!
//! ```toml
//! [search]
//! query = "causal"            # sent as all:causal
//! # query = "cat:cs.LG"      # field-prefixed queries are sent unchanged
//! max_results = 2
//! api_url = "https://export.arxiv.org/api/query"
//! ```

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use std::path::Path;
use std::time::Duration;

use crate::config::SearchConfig;
use crate::fetch::{PaperSource, SearchQuery, SortOrder};
use crate::models::PaperEntry;

const USER_AGENT: &str = concat!("paper-digest/", env!("CARGO_PKG_VERSION"));

/// Field prefixes understood by the arXiv query grammar.
const FIELD_PREFIXES: &[&str] = &[
    "all:", "ti:", "au:", "abs:", "co:", "jr:", "cat:", "rn:", "id:",
];

/// [`PaperSource`] backed by the arXiv export API.
pub struct ArxivClient {
    client: reqwest::Client,
    api_url: String,
}

impl ArxivClient {
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            api_url: config.api_url.clone(),
        })
    }
}

#[async_trait]
impl PaperSource for ArxivClient {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<PaperEntry>> {
        let (sort_by, sort_order) = match query.order {
            SortOrder::SubmittedDescending => ("submittedDate", "descending"),
        };
        let max_results = query.max_results.to_string();
        let search_query = build_search_query(&query.text);

        tracing::debug!(query = %search_query, max_results = query.max_results, "arxiv search");

        let resp = self
            .client
            .get(&self.api_url)
            .query(&[
                ("search_query", search_query.as_str()),
                ("start", "0"),
                ("max_results", max_results.as_str()),
                ("sortBy", sort_by),
                ("sortOrder", sort_order),
            ])
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("arXiv search request failed: {}", e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!(
                "arXiv search failed (HTTP {}): {}",
                status,
                body.chars().take(500).collect::<String>()
            );
        }

        let xml = resp.text().await?;
        let mut entries = parse_feed(&xml)?;
        entries.truncate(query.max_results);
        Ok(entries)
    }

    async fn download(&self, entry: &PaperEntry, dest: &Path) -> Result<()> {
        let resp = self
            .client
            .get(&entry.pdf_url)
            .send()
            .await
            .with_context(|| format!("Failed to download {}", entry.pdf_url))?;

        let status = resp.status();
        if !status.is_success() {
            bail!("Download of {} failed (HTTP {})", entry.pdf_url, status);
        }

        let bytes = resp.bytes().await?;

        // Write next to the target and rename so a failed transfer never
        // leaves a truncated `<id>.pdf` behind.
        let partial = dest.with_extension("pdf.part");
        tokio::fs::write(&partial, &bytes)
            .await
            .with_context(|| format!("Failed to write {}", partial.display()))?;
        tokio::fs::rename(&partial, dest)
            .await
            .with_context(|| format!("Failed to move download into {}", dest.display()))?;
        Ok(())
    }
}

/// Plain terms search every field; field-prefixed queries pass through.
pub fn build_search_query(text: &str) -> String {
    let text = text.trim();
    if FIELD_PREFIXES.iter().any(|p| text.starts_with(p)) {
        text.to_string()
    } else {
        format!("all:{}", text)
    }
}

/// Short identifier from an entry id URL.
///
/// `http://arxiv.org/abs/2410.01234v1` → `2410.01234v1`,
/// `http://arxiv.org/abs/hep-th/9901001v1` → `hep-th/9901001v1`.
pub fn short_id(id_url: &str) -> String {
    let id_url = id_url.trim();
    if let Some(pos) = id_url.rfind("/abs/") {
        id_url[pos + "/abs/".len()..].to_string()
    } else if let Some(pos) = id_url.rfind("/pdf/") {
        id_url[pos + "/pdf/".len()..]
            .trim_end_matches(".pdf")
            .to_string()
    } else {
        id_url.to_string()
    }
}

#[derive(Default)]
struct EntryBuilder {
    id_url: String,
    title: String,
    published: String,
    pdf_url: Option<String>,
}

impl EntryBuilder {
    fn finish(self) -> Option<PaperEntry> {
        if self.id_url.trim().is_empty() {
            return None;
        }
        let id = short_id(&self.id_url);
        let pdf_url = self
            .pdf_url
            .unwrap_or_else(|| format!("https://arxiv.org/pdf/{}", id));
        let published = DateTime::parse_from_rfc3339(self.published.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc));
        Some(PaperEntry {
            id,
            title: normalize_whitespace(&self.title),
            pdf_url,
            published,
        })
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Field {
    Id,
    Title,
    Published,
}

/// Parse an Atom feed into entries, preserving feed order.
pub fn parse_feed(xml: &str) -> Result<Vec<PaperEntry>> {
    let mut reader = quick_xml::Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut current: Option<EntryBuilder> = None;
    let mut field: Option<Field> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"entry" => current = Some(EntryBuilder::default()),
                b"id" if current.is_some() => field = Some(Field::Id),
                b"title" if current.is_some() => field = Some(Field::Title),
                b"published" if current.is_some() => field = Some(Field::Published),
                b"link" => {
                    if let Some(entry) = current.as_mut() {
                        read_pdf_link(&e, entry);
                    }
                }
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"link" {
                    if let Some(entry) = current.as_mut() {
                        read_pdf_link(&e, entry);
                    }
                }
            }
            Ok(Event::Text(te)) => {
                if let (Some(f), Some(entry)) = (field, current.as_mut()) {
                    let text = te.unescape().unwrap_or_default();
                    match f {
                        Field::Id => entry.id_url.push_str(&text),
                        Field::Title => entry.title.push_str(&text),
                        Field::Published => entry.published.push_str(&text),
                    }
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"entry" => {
                    if let Some(entry) = current.take().and_then(EntryBuilder::finish) {
                        entries.push(entry);
                    }
                    field = None;
                }
                b"id" | b"title" | b"published" => field = None,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => bail!(
                "Invalid arXiv feed at position {}: {}",
                reader.buffer_position(),
                e
            ),
            _ => {}
        }
    }

    Ok(entries)
}

fn read_pdf_link(e: &BytesStart<'_>, entry: &mut EntryBuilder) {
    let mut href = None;
    let mut is_pdf = false;
    for attr in e.attributes().flatten() {
        let value = attr.unescape_value().unwrap_or_default();
        match attr.key.local_name().as_ref() {
            b"href" => href = Some(value.to_string()),
            b"title" if value == "pdf" => is_pdf = true,
            b"type" if value == "application/pdf" => is_pdf = true,
            _ => {}
        }
    }
    if is_pdf {
        if let Some(href) = href {
            entry.pdf_url = Some(href.replacen("http://", "https://", 1));
        }
    }
}

fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <link href="http://arxiv.org/api/query?search_query%3Dall%3Acausal" rel="self" type="application/atom+xml"/>
  <title type="html">ArXiv Query: search_query=all:causal</title>
  <id>http://arxiv.org/api/abc</id>
  <entry>
    <id>http://arxiv.org/abs/2410.05678v1</id>
    <updated>2024-10-08T17:59:01Z</updated>
    <published>2024-10-08T17:59:01Z</published>
    <title>Causal Discovery
      with Latent Confounders &amp; Cycles</title>
    <author><name>A. Author</name></author>
    <link href="http://arxiv.org/abs/2410.05678v1" rel="alternate" type="text/html"/>
    <link title="pdf" href="http://arxiv.org/pdf/2410.05678v1" rel="related" type="application/pdf"/>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/hep-th/9901001v1</id>
    <published>1999-01-01T00:00:00Z</published>
    <title>Old Style</title>
  </entry>
</feed>"#;

    #[test]
    fn parses_entries_in_feed_order() {
        let entries = parse_feed(FEED).unwrap();
        assert_eq!(entries.len(), 2);

        assert_eq!(entries[0].id, "2410.05678v1");
        assert_eq!(
            entries[0].title,
            "Causal Discovery with Latent Confounders & Cycles"
        );
        assert_eq!(entries[0].pdf_url, "https://arxiv.org/pdf/2410.05678v1");
        assert!(entries[0].published.is_some());

        assert_eq!(entries[1].id, "hep-th/9901001v1");
        assert_eq!(entries[1].pdf_url, "https://arxiv.org/pdf/hep-th/9901001v1");
    }

    #[test]
    fn feed_header_id_is_not_an_entry() {
        let feed = r#"<feed><id>http://arxiv.org/api/xyz</id><title>empty</title></feed>"#;
        assert!(parse_feed(feed).unwrap().is_empty());
    }

    #[test]
    fn short_id_variants() {
        assert_eq!(short_id("http://arxiv.org/abs/2410.01234v2"), "2410.01234v2");
        assert_eq!(short_id("https://arxiv.org/pdf/2410.01234v2.pdf"), "2410.01234v2");
        assert_eq!(short_id("2410.01234"), "2410.01234");
    }

    #[test]
    fn plain_queries_search_all_fields() {
        assert_eq!(build_search_query("causal"), "all:causal");
        assert_eq!(build_search_query(" cat:cs.LG "), "cat:cs.LG");
        assert_eq!(build_search_query("ti:transformer"), "ti:transformer");
    }

    #[test]
    fn malformed_feed_is_an_error() {
        assert!(parse_feed("<feed><entry><id>x</entry></feed>").is_err());
    }
}
