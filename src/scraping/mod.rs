//! Tiered web scraper (spec.md §4.1), grounded on
//! `original_source/backend/core/infrastructure/scraping/scraper.py`.
//!
//! Four tiers, each tried in order and accepted once its confidence
//! clears its own gate:
//! 1. JSON-LD (`<script type="application/ld+json">`) — gate > 0.7
//! 2. Meta tags / Open Graph / Twitter Card — gate > 0.5
//! 3. Headless browser (JS-rendered content) — always accepted
//! 4. Plain request fallback — used only if the headless tier errors
//!
//! The source drives tiers 1-2 and 4 with `aiohttp` + `BeautifulSoup` and
//! tier 3 with Playwright. Here tiers 1, 2 and 4 share one `scraper`-crate
//! (html5ever) parse of a plain `reqwest` fetch, and tier 3 drives a real
//! browser through `fantoccini`'s WebDriver protocol, composing with the
//! same tokio runtime instead of spawning a subprocess event loop.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use scraper::{Html, Selector};
use serde_json::Value;

use crate::domain::DataSource;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Clone)]
pub struct ScrapingResult {
    pub success: bool,
    pub data: BTreeMap<String, Value>,
    pub method: DataSource,
    pub confidence: f64,
    pub processing_time: Duration,
    pub error_message: Option<String>,
}

impl ScrapingResult {
    fn failed(method: DataSource, error_message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: BTreeMap::new(),
            method,
            confidence: 0.0,
            processing_time: Duration::ZERO,
            error_message: Some(error_message.into()),
        }
    }
}

pub struct TieredScraper {
    client: ClientWithMiddleware,
    webdriver_url: Option<String>,
    headless_timeout: Duration,
}

impl TieredScraper {
    /// `webdriver_url` is the address of a running WebDriver endpoint
    /// (e.g. `http://localhost:9515` for chromedriver). When `None` the
    /// headless tier is skipped and the plain-request fallback runs in
    /// its place — matching the source's behavior when Playwright isn't
    /// installed.
    pub fn new(request_timeout: Duration, webdriver_url: Option<String>) -> Self {
        let reqwest_client = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(request_timeout)
            .connect_timeout(Duration::from_secs(5))
            .user_agent(USER_AGENT)
            .build()
            .expect("failed to build HTTP client");

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(2);
        let client = ClientBuilder::new(reqwest_client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Self {
            client,
            webdriver_url,
            headless_timeout: Duration::from_secs(3),
        }
    }

    pub async fn scrape(&self, url: &str) -> ScrapingResult {
        let start = Instant::now();

        let result = self.extract_json_ld(url).await;
        if result.success && result.confidence > 0.7 {
            return with_elapsed(result, start);
        }

        let result = self.extract_meta_data(url).await;
        if result.success && result.confidence > 0.5 {
            return with_elapsed(result, start);
        }

        let result = match &self.webdriver_url {
            Some(endpoint) => match self.scrape_headless(endpoint, url).await {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!("headless scrape failed for {url}: {e}, falling back to plain request");
                    self.scrape_requests_fallback(url).await
                }
            },
            None => self.scrape_requests_fallback(url).await,
        };
        with_elapsed(result, start)
    }

    async fn fetch_html(&self, url: &str) -> Result<String, String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("HTTP {}", response.status().as_u16()));
        }
        response.text().await.map_err(|e| e.to_string())
    }

    async fn extract_json_ld(&self, url: &str) -> ScrapingResult {
        let html = match self.fetch_html(url).await {
            Ok(h) => h,
            Err(e) => return ScrapingResult::failed(DataSource::JsonLd, e),
        };

        let document = Html::parse_document(&html);
        let selector = Selector::parse(r#"script[type="application/ld+json"]"#).unwrap();

        let mut all_data = BTreeMap::new();
        let mut found_any_script = false;
        for el in document.select(&selector) {
            found_any_script = true;
            let text = el.text().collect::<String>();
            if let Ok(json) = serde_json::from_str::<Value>(&text) {
                match json {
                    Value::Array(items) => {
                        for item in items {
                            flatten_json(&item, "", &mut all_data);
                        }
                    }
                    other => flatten_json(&other, "", &mut all_data),
                }
            }
        }

        if !found_any_script {
            return ScrapingResult::failed(DataSource::JsonLd, "No JSON-LD found");
        }
        if all_data.is_empty() {
            return ScrapingResult::failed(DataSource::JsonLd, "Invalid JSON-LD");
        }

        let confidence = json_ld_confidence(&all_data);
        ScrapingResult {
            success: true,
            data: all_data,
            method: DataSource::JsonLd,
            confidence,
            processing_time: Duration::ZERO,
            error_message: None,
        }
    }

    async fn extract_meta_data(&self, url: &str) -> ScrapingResult {
        let html = match self.fetch_html(url).await {
            Ok(h) => h,
            Err(e) => return ScrapingResult::failed(DataSource::StructuredData, e),
        };

        let document = Html::parse_document(&html);
        let mut data = BTreeMap::new();

        if let Some(title) = select_text(&document, "title") {
            data.insert("title".to_string(), Value::String(title));
        }
        if let Some(desc) = select_attr(&document, r#"meta[name="description"]"#, "content") {
            data.insert("description".to_string(), Value::String(desc));
        }

        let og_selector = Selector::parse(r#"meta[property^="og:"]"#).unwrap();
        for el in document.select(&og_selector) {
            if let Some(prop) = el.value().attr("property") {
                let key = format!("og_{}", prop.trim_start_matches("og:"));
                let content = el.value().attr("content").unwrap_or("").trim().to_string();
                data.insert(key, Value::String(content));
            }
        }

        let twitter_selector = Selector::parse(r#"meta[name^="twitter:"]"#).unwrap();
        for el in document.select(&twitter_selector) {
            if let Some(name) = el.value().attr("name") {
                let key = format!("twitter_{}", name.trim_start_matches("twitter:"));
                let content = el.value().attr("content").unwrap_or("").trim().to_string();
                data.insert(key, Value::String(content));
            }
        }

        let links = collect_links(&document, url);
        data.insert(
            "links".to_string(),
            Value::Array(links.into_iter().map(Value::String).collect()),
        );

        if data.len() <= 1 {
            // Only "links" (possibly empty) present.
            return ScrapingResult::failed(DataSource::StructuredData, "No meta data found");
        }

        let confidence = meta_confidence(&data);
        ScrapingResult {
            success: true,
            data,
            method: DataSource::StructuredData,
            confidence,
            processing_time: Duration::ZERO,
            error_message: None,
        }
    }

    async fn scrape_headless(
        &self,
        webdriver_url: &str,
        url: &str,
    ) -> Result<ScrapingResult, String> {
        let client = fantoccini::ClientBuilder::native()
            .connect(webdriver_url)
            .await
            .map_err(|e| e.to_string())?;

        let outcome = self.scrape_headless_inner(&client, url).await;
        let _ = client.close().await;
        outcome
    }

    async fn scrape_headless_inner(
        &self,
        client: &fantoccini::Client,
        url: &str,
    ) -> Result<ScrapingResult, String> {
        client.goto(url).await.map_err(|e| e.to_string())?;
        tokio::time::sleep(self.headless_timeout).await;

        let script = r#"
            const result = {};
            result.title = document.title || null;
            const metaDesc = document.querySelector("meta[name='description']");
            result.meta_description = metaDesc ? metaDesc.content : null;
            const ogDesc = document.querySelector("meta[property='og:description']");
            result.og_description = ogDesc ? ogDesc.content : null;
            const text = (document.body ? document.body.innerText : "").slice(0, 8000);
            result.text_content = text;
            result.links = Array.from(document.querySelectorAll("a[href]"))
                .map(a => a.href)
                .filter(h => h && h.startsWith('http'));
            const emailMatch = text.toLowerCase().match(/([a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,})/);
            const phoneMatch = text.match(/(\+?\d{1,2}[-.\s]?\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4})/);
            result.email = emailMatch ? emailMatch[1] : null;
            result.phone = phoneMatch ? phoneMatch[1] : null;
            const domain = window.location.hostname.replace('www.', '');
            result.potential_company_name = domain.split('.')[0];
            return result;
        "#;

        let value = client
            .execute(script, vec![])
            .await
            .map_err(|e| e.to_string())?;

        let data = json_object_to_map(value);
        if data.is_empty() {
            return Ok(ScrapingResult {
                success: false,
                data,
                method: DataSource::Playwright,
                confidence: 0.3,
                processing_time: Duration::ZERO,
                error_message: Some("No data extracted by headless browser".to_string()),
            });
        }

        let confidence = playwright_style_confidence(&data);
        Ok(ScrapingResult {
            success: true,
            data,
            method: DataSource::Playwright,
            confidence,
            processing_time: Duration::ZERO,
            error_message: None,
        })
    }

    async fn scrape_requests_fallback(&self, url: &str) -> ScrapingResult {
        let html = match self.fetch_html(url).await {
            Ok(h) => h,
            Err(e) => return ScrapingResult::failed(DataSource::Requests, e),
        };

        let document = Html::parse_document(&html);
        let mut data = BTreeMap::new();

        if let Some(title) = select_text(&document, "title") {
            data.insert("title".to_string(), Value::String(title));
        }
        if let Some(desc) = select_attr(&document, r#"meta[name="description"]"#, "content") {
            data.insert("meta_description".to_string(), Value::String(desc));
        }
        if let Some(og) = select_attr(&document, r#"meta[property="og:description"]"#, "content") {
            data.insert("og_description".to_string(), Value::String(og));
        }

        let body_text = select_text(&document, "body").unwrap_or_default();
        let truncated: String = body_text.chars().take(8000).collect();
        data.insert("text_content".to_string(), Value::String(truncated.clone()));

        let links = collect_links(&document, url);
        data.insert(
            "links".to_string(),
            Value::Array(links.into_iter().map(Value::String).collect()),
        );

        if let Some(email) = find_email(&truncated) {
            data.insert("email".to_string(), Value::String(email));
        }
        if let Some(phone) = find_phone(&truncated) {
            data.insert("phone".to_string(), Value::String(phone));
        }
        if let Ok(parsed) = url::Url::parse(url) {
            if let Some(host) = parsed.host_str() {
                let domain = host.trim_start_matches("www.");
                let company = domain.split('.').next().unwrap_or(domain).to_string();
                data.insert("potential_company_name".to_string(), Value::String(company));
            }
        }

        if data.is_empty() {
            return ScrapingResult {
                success: false,
                data,
                method: DataSource::Requests,
                confidence: 0.2,
                processing_time: Duration::ZERO,
                error_message: Some("No data extracted by requests fallback".to_string()),
            };
        }

        let confidence = playwright_style_confidence(&data) * 0.8;
        ScrapingResult {
            success: true,
            data,
            method: DataSource::Requests,
            confidence,
            processing_time: Duration::ZERO,
            error_message: None,
        }
    }
}

fn with_elapsed(mut result: ScrapingResult, start: Instant) -> ScrapingResult {
    result.processing_time = start.elapsed();
    result
}

fn select_text(document: &Html, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    document
        .select(&sel)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
}

fn select_attr(document: &Html, selector: &str, attr: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    document
        .select(&sel)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(|s| s.trim().to_string())
}

fn collect_links(document: &Html, base_url: &str) -> Vec<String> {
    let selector = Selector::parse("a[href]").unwrap();
    let base = url::Url::parse(base_url).ok();
    let mut links = Vec::new();
    for el in document.select(&selector) {
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        if href.starts_with("http://") || href.starts_with("https://") {
            links.push(href.to_string());
        } else if href.starts_with('/') {
            if let Some(base) = &base {
                if let Ok(joined) = base.join(href) {
                    links.push(joined.to_string());
                }
            }
        }
    }
    links
}

fn find_email(text: &str) -> Option<String> {
    static PATTERN: once_cell::sync::Lazy<regex::Regex> = once_cell::sync::Lazy::new(|| {
        regex::Regex::new(r"([a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,})").unwrap()
    });
    PATTERN.find(text).map(|m| m.as_str().to_string())
}

fn find_phone(text: &str) -> Option<String> {
    static PATTERN: once_cell::sync::Lazy<regex::Regex> = once_cell::sync::Lazy::new(|| {
        regex::Regex::new(r"(\+?\d{1,2}[-.\s]?\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4})").unwrap()
    });
    PATTERN.find(text).map(|m| m.as_str().to_string())
}

/// Flattens nested JSON-LD into dotted/indexed keys, matching the
/// source's `_flatten_json`.
fn flatten_json(value: &Value, parent_key: &str, out: &mut BTreeMap<String, Value>) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                let new_key = if parent_key.is_empty() {
                    k.clone()
                } else {
                    format!("{parent_key}_{k}")
                };
                match v {
                    Value::Object(_) | Value::Array(_) => flatten_json(v, &new_key, out),
                    _ => {
                        out.insert(new_key, v.clone());
                    }
                }
            }
        }
        Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                let new_key = if parent_key.is_empty() {
                    i.to_string()
                } else {
                    format!("{parent_key}_{i}")
                };
                match v {
                    Value::Object(_) | Value::Array(_) => flatten_json(v, &new_key, out),
                    _ => {
                        out.insert(new_key, v.clone());
                    }
                }
            }
        }
        _ => {}
    }
}

fn json_object_to_map(value: Value) -> BTreeMap<String, Value> {
    match value {
        Value::Object(map) => map.into_iter().collect(),
        _ => BTreeMap::new(),
    }
}

fn json_ld_confidence(data: &BTreeMap<String, Value>) -> f64 {
    let mut score = 0.0;
    if data.contains_key("name") || data.contains_key("legalName") {
        score += 0.3;
    }
    if data.contains_key("description") {
        score += 0.2;
    }
    if data.contains_key("url") {
        score += 0.1;
    }
    if data.contains_key("email") || data.contains_key("telephone") {
        score += 0.1;
    }
    if data.contains_key("address") {
        score += 0.2;
    }
    if data.contains_key("foundingDate") {
        score += 0.1;
    }

    let serialized = serde_json::to_string(data).unwrap_or_default().to_lowercase();
    const BUSINESS_PROPERTIES: &[&str] = &[
        "employeecount",
        "revenue",
        "founded",
        "industry",
        "contactpoint",
        "location",
        "logo",
    ];
    for prop in BUSINESS_PROPERTIES {
        if serialized.contains(prop) {
            score += 0.1;
        }
    }

    score.min(1.0)
}

fn meta_confidence(data: &BTreeMap<String, Value>) -> f64 {
    let mut score = 0.0;
    if non_empty_str(data.get("title")) {
        score += 0.3;
    }
    if non_empty_str(data.get("description")) {
        score += 0.3;
    }
    if non_empty_str(data.get("og_title")) || non_empty_str(data.get("og_description")) {
        score += 0.2;
    }
    if data
        .get("links")
        .and_then(|v| v.as_array())
        .map(|a| !a.is_empty())
        .unwrap_or(false)
    {
        score += 0.1;
    }
    if non_empty_str(data.get("og_image")) {
        score += 0.1;
    }
    score.min(1.0)
}

fn playwright_style_confidence(data: &BTreeMap<String, Value>) -> f64 {
    let mut score = 0.3;
    if non_empty_str(data.get("title")) {
        score += 0.2;
    }
    if non_empty_str(data.get("meta_description")) || non_empty_str(data.get("og_description")) {
        score += 0.2;
    }
    if non_empty_str(data.get("email")) {
        score += 0.2;
    }
    if non_empty_str(data.get("phone")) {
        score += 0.1;
    }
    if data
        .get("links")
        .and_then(|v| v.as_array())
        .map(|a| a.len() > 5)
        .unwrap_or(false)
    {
        score += 0.1;
    }
    if non_empty_str(data.get("potential_company_name")) {
        score += 0.1;
    }
    score.min(1.0)
}

fn non_empty_str(value: Option<&Value>) -> bool {
    matches!(value, Some(Value::String(s)) if !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flattens_nested_json_ld() {
        let value: Value = serde_json::json!({
            "name": "Acme",
            "address": { "streetAddress": "1 Main St", "addressLocality": "Springfield" }
        });
        let mut out = BTreeMap::new();
        flatten_json(&value, "", &mut out);
        assert_eq!(out.get("name").unwrap(), "Acme");
        assert_eq!(out.get("address_streetAddress").unwrap(), "1 Main St");
    }

    #[test]
    fn json_ld_confidence_caps_at_one() {
        let mut data = BTreeMap::new();
        for key in [
            "name",
            "description",
            "url",
            "email",
            "address",
            "foundingDate",
            "employeeCount",
            "revenue",
            "founded",
            "industry",
        ] {
            data.insert(key.to_string(), Value::String("x".into()));
        }
        assert_eq!(json_ld_confidence(&data), 1.0);
    }

    #[test]
    fn meta_confidence_scores_partial_data() {
        let mut data = BTreeMap::new();
        data.insert("title".to_string(), Value::String("Acme".into()));
        data.insert("links".to_string(), Value::Array(vec![]));
        assert!((meta_confidence(&data) - 0.3).abs() < 1e-9);
    }

    #[test]
    fn finds_email_and_phone_in_text() {
        let text = "contact us at hello@acme.example or call +1-555-123-4567";
        assert_eq!(find_email(text).unwrap(), "hello@acme.example");
        assert!(find_phone(text).is_some());
    }
}
