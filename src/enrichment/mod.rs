//! Waterfall enrichment engine (spec.md §4.2), grounded on
//! `original_source/backend/core/infrastructure/enrichment/enricher.py`.
//!
//! Three strategies tried in order:
//! 1. Heuristic keyword/regex inference — gate > 0.7
//! 2. External API (pluggable, no built-in provider) — gate > 0.6
//! 3. LLM — accepted unconditionally once it returns any data
//!
//! Open Question resolved (spec.md §9): the source's external-API step is
//! a stub that always returns `None`. Here it's an `ExternalEnrichmentProvider`
//! trait so a real provider (Clearbit, Apollo, ZoomInfo...) can be wired in
//! later; `NullExternalProvider` preserves the source's current behavior.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::domain::{DataSource, Lead};
use crate::llm::LlmClient;

#[derive(Debug, Clone)]
pub struct EnrichmentResult {
    pub success: bool,
    pub data: HashMap<String, String>,
    pub method: DataSource,
    pub confidence: f64,
    pub processing_time: Duration,
}

#[async_trait::async_trait]
pub trait ExternalEnrichmentProvider: Send + Sync {
    async fn enrich(&self, lead: &Lead) -> anyhow::Result<Option<EnrichmentResult>>;
}

/// Preserves the source's current behavior: no external provider wired in.
pub struct NullExternalProvider;

#[async_trait::async_trait]
impl ExternalEnrichmentProvider for NullExternalProvider {
    async fn enrich(&self, _lead: &Lead) -> anyhow::Result<Option<EnrichmentResult>> {
        Ok(None)
    }
}

pub struct WaterfallEnricher {
    external_provider: Box<dyn ExternalEnrichmentProvider>,
    llm: LlmClient,
}

impl WaterfallEnricher {
    pub fn new(external_provider: Box<dyn ExternalEnrichmentProvider>, llm: LlmClient) -> Self {
        Self {
            external_provider,
            llm,
        }
    }

    pub async fn enrich_lead_data(
        &self,
        lead: &Lead,
        scraped_data: &HashMap<String, String>,
    ) -> Option<EnrichmentResult> {
        let start = Instant::now();

        if let Some(result) = heuristic_enrichment(lead, scraped_data) {
            if result.confidence > 0.7 {
                return Some(with_elapsed(result, start));
            }
        }

        match self.external_provider.enrich(lead).await {
            Ok(Some(result)) if result.confidence > 0.6 => {
                return Some(with_elapsed(result, start));
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("external enrichment provider failed: {e}"),
        }

        if let Some(result) = self.llm_enrichment(lead, scraped_data).await {
            return Some(with_elapsed(result, start));
        }

        None
    }

    async fn llm_enrichment(
        &self,
        lead: &Lead,
        scraped_data: &HashMap<String, String>,
    ) -> Option<EnrichmentResult> {
        if !self.llm.is_configured() {
            tracing::warn!("LLM not configured, skipping LLM enrichment");
            return None;
        }

        let text = text_for_analysis(lead, scraped_data);
        let truncated: String = text.chars().take(2000).collect();
        let user_prompt = format!(
            "Company Name: {}\nWebsite: {}\nText Content: {}\n\n\
             Extract the following information in JSON format:\n\
             {{\"industry\": \"string or null\", \"employees\": \"1-10 | 11-50 | 51-200 | 201-500 | 500+ | null\", \
             \"revenue_band\": \"$0-1M | $1M-10M | $10M-50M | $50M-100M | $100M+ | null\", \
             \"founded_year\": \"integer or null\", \"contact_name\": \"string or null\", \
             \"contact_title\": \"string or null\"}}\n\n\
             Be conservative: return null for anything you cannot confidently extract.",
            lead.company_name.as_deref().unwrap_or("Unknown"),
            lead.website,
            truncated,
        );

        let content = match self
            .llm
            .complete(
                "You are a business intelligence assistant. Extract structured company \
                 information from the provided text. Respond ONLY with valid JSON.",
                &user_prompt,
            )
            .await
        {
            Ok(Some(content)) => content,
            Ok(None) => return None,
            Err(e) => {
                tracing::error!("LLM enrichment failed: {e}");
                return None;
            }
        };

        let parsed = extract_json_object(&content).and_then(|json_text| {
            serde_json::from_str::<EnrichmentLlmResponse>(&json_text).ok()
        })?;

        let mut data = HashMap::new();
        if let Some(v) = parsed.industry {
            data.insert("industry".to_string(), v);
        }
        if let Some(v) = parsed.employees {
            data.insert("employees".to_string(), v);
        }
        if let Some(v) = parsed.revenue_band {
            data.insert("revenue_band".to_string(), v);
        }
        if let Some(v) = parsed.founded_year {
            data.insert("founded_year".to_string(), v.to_string());
        }
        if let Some(v) = parsed.contact_name {
            data.insert("contact_name".to_string(), v);
        }
        if let Some(v) = parsed.contact_title {
            data.insert("contact_title".to_string(), v);
        }

        if data.is_empty() {
            return None;
        }

        let confidence = (0.5 + data.len() as f64 * 0.1).min(0.8);
        Some(EnrichmentResult {
            success: true,
            data,
            method: DataSource::Llm,
            confidence,
            processing_time: Duration::ZERO,
        })
    }
}

/// Strict schema for the LLM's JSON reply (REDESIGN FLAG vs. the source's
/// untyped `dict` parsed from a regex-extracted substring): a reply that
/// doesn't match this shape fails to parse and is treated as no data,
/// instead of silently admitting arbitrary keys into `enriched_data`.
#[derive(Debug, Deserialize)]
struct EnrichmentLlmResponse {
    industry: Option<String>,
    employees: Option<String>,
    revenue_band: Option<String>,
    founded_year: Option<i32>,
    contact_name: Option<String>,
    contact_title: Option<String>,
}

fn extract_json_object(content: &str) -> Option<String> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if end < start {
        return None;
    }
    Some(content[start..=end].to_string())
}

fn with_elapsed(mut result: EnrichmentResult, start: Instant) -> EnrichmentResult {
    result.processing_time = start.elapsed();
    result
}

fn text_for_analysis(lead: &Lead, scraped_data: &HashMap<String, String>) -> String {
    let mut texts = Vec::new();
    if let Some(name) = &lead.company_name {
        texts.push(format!("Company: {name}"));
    }
    if let Some(about) = &lead.about_text {
        texts.push(about.clone());
    }
    if let Some(text) = scraped_data.get("text_content") {
        texts.push(text.clone());
    } else if let Some(desc) = scraped_data.get("description") {
        texts.push(desc.clone());
    } else if let Some(og) = scraped_data.get("og_description") {
        texts.push(og.clone());
    } else if let Some(title) = scraped_data.get("title") {
        texts.push(title.clone());
    }
    if let Some(jsonld) = scraped_data.get("jsonld") {
        texts.push(jsonld.clone());
    }
    texts.join(" ")
}

const INDUSTRY_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "Software",
        &[
            "software",
            "saas",
            "platform",
            "cloud",
            "api",
            "app",
            "application",
            "tech",
            "technology",
        ],
    ),
    (
        "Consulting",
        &[
            "consulting",
            "advisory",
            "services",
            "strategy",
            "business",
            "management",
        ],
    ),
    (
        "E-commerce",
        &["ecommerce", "retail", "shop", "store", "marketplace", "buy", "sell"],
    ),
    (
        "Finance",
        &[
            "finance",
            "banking",
            "investment",
            "fintech",
            "payment",
            "financial",
            "money",
        ],
    ),
    (
        "Healthcare",
        &["health", "medical", "clinic", "hospital", "care", "pharma", "healthcare"],
    ),
    (
        "Marketing",
        &["marketing", "advertising", "media", "social", "campaign", "brand"],
    ),
    (
        "Education",
        &["education", "learning", "school", "university", "course", "training", "edu"],
    ),
    (
        "Real Estate",
        &["real estate", "property", "realestate", "estate", "housing", "rent", "buy"],
    ),
    (
        "Travel",
        &["travel", "tourism", "hotel", "booking", "vacation", "flight", "airline"],
    ),
    (
        "Food & Beverage",
        &["restaurant", "food", "beverage", "cafe", "catering", "delivery"],
    ),
];

const EMPLOYEE_KEYWORDS: &[(&str, &[&str])] = &[
    ("1-10", &["startup", "early stage", "small team", "small business"]),
    ("11-50", &["growing", "medium sized", "expanding", "scale up"]),
    ("51-200", &["established", "mid sized", "corporate", "professional"]),
    ("201-500", &["large", "enterprise", "major", "substantial"]),
    ("500+", &["huge", "massive", "very large", "major corporation"]),
];

fn infer_industry(text: &str) -> Option<&'static str> {
    INDUSTRY_KEYWORDS
        .iter()
        .map(|(industry, keywords)| {
            let score = keywords.iter().filter(|kw| text.contains(**kw)).count();
            (*industry, score)
        })
        .filter(|(_, score)| *score > 0)
        .max_by_key(|(_, score)| *score)
        .map(|(industry, _)| industry)
}

static EMPLOYEE_COUNT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(\d+)\s+employees?").unwrap(),
        Regex::new(r"team\s+of\s+(\d+)").unwrap(),
        Regex::new(r"(\d+)\s+person\s+team").unwrap(),
        Regex::new(r"(\d+)\s+staff").unwrap(),
    ]
});

fn estimate_employees(text: &str) -> Option<&'static str> {
    for (size_range, keywords) in EMPLOYEE_KEYWORDS {
        if keywords.iter().any(|kw| text.contains(kw)) {
            return Some(size_range);
        }
    }

    for pattern in EMPLOYEE_COUNT_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(text) {
            if let Ok(count) = caps[1].parse::<u32>() {
                return Some(match count {
                    0..=10 => "1-10",
                    11..=50 => "11-50",
                    51..=200 => "51-200",
                    201..=500 => "201-500",
                    _ => "500+",
                });
            }
        }
    }

    None
}

fn estimate_revenue_from_employees(employees: &str) -> Option<&'static str> {
    match employees {
        "1-10" => Some("$0-1M"),
        "11-50" => Some("$1M-10M"),
        "51-200" => Some("$10M-50M"),
        "201-500" => Some("$50M-100M"),
        "500+" => Some("$100M+"),
        _ => None,
    }
}

static CONTACT_PERSON_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?:CEO|Founder|President|CTO|CFO|COO|Director|Manager|Lead)\s+([A-Z][a-z]+\s[A-Z][a-z]+)").unwrap(),
        Regex::new(r"(?:Founder|Owner|Director|Manager|Lead)\s+([A-Z][a-z]+\s[A-Z][a-z]+)").unwrap(),
        Regex::new(r"(?:CEO|CTO|CFO|COO)\s+([A-Z][a-z]+\s[A-Z][a-z]+)").unwrap(),
        Regex::new(r"([A-Z][a-z]+\s[A-Z][a-z]+)\s+(?:CEO|Founder|President|CTO|CFO|COO|Director|Manager|Lead)").unwrap(),
    ]
});

fn extract_contact_person(text: &str) -> Option<String> {
    CONTACT_PERSON_PATTERNS
        .iter()
        .find_map(|pattern| pattern.captures(text).map(|c| c[1].to_string()))
}

static CONTACT_TITLE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)(CEO|Founder|President|CTO|CFO|COO|Director|Manager|Lead|VP|Owner)")
            .unwrap(),
        Regex::new(r"(?i)(Chief\s+\w+\s+Officer)").unwrap(),
    ]
});

fn extract_contact_title(text: &str) -> Option<String> {
    CONTACT_TITLE_PATTERNS
        .iter()
        .find_map(|pattern| pattern.captures(text).map(|c| title_case(&c[1])))
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

static FOUNDED_YEAR_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)(?:founded|established|started|launched|incorporated)\s+in?\s+(19\d{2}|20\d{2}|'\d{2})").unwrap(),
        Regex::new(r"(?i)(?:founded|established|started|launched|incorporated)\s+(19\d{2}|20\d{2}|'\d{2})").unwrap(),
        Regex::new(r"(?i)(19\d{2}|20\d{2})\s+(?:founded|established|started|launched|incorporated)").unwrap(),
        Regex::new(r"(?i)(?:since|from)\s+(19\d{2}|20\d{2})").unwrap(),
    ]
});

fn extract_founded_year(text: &str) -> Option<i32> {
    for pattern in FOUNDED_YEAR_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(text) {
            let raw = &caps[1];
            let normalized = if let Some(suffix) = raw.strip_prefix('\'') {
                let n: u32 = suffix.parse().ok()?;
                if n < 50 {
                    format!("20{suffix}")
                } else {
                    format!("19{suffix}")
                }
            } else {
                raw.to_string()
            };

            if let Ok(year) = normalized.parse::<i32>() {
                if (1900..=2030).contains(&year) {
                    return Some(year);
                }
            }
        }
    }
    None
}

fn heuristic_enrichment(
    lead: &Lead,
    scraped_data: &HashMap<String, String>,
) -> Option<EnrichmentResult> {
    let text = text_for_analysis(lead, scraped_data);
    let text_lower = text.to_lowercase();

    let mut data = HashMap::new();
    let mut confidence = 0.0;

    if let Some(industry) = infer_industry(&text_lower) {
        data.insert("industry".to_string(), industry.to_string());
        confidence += 0.3;
    }

    if let Some(employees) = estimate_employees(&text_lower) {
        data.insert("employees".to_string(), employees.to_string());
        confidence += 0.2;

        if let Some(revenue_band) = estimate_revenue_from_employees(employees) {
            data.insert("revenue_band".to_string(), revenue_band.to_string());
            confidence += 0.1;
        }
    }

    if let Some(contact_name) = extract_contact_person(&text) {
        data.insert("contact_name".to_string(), contact_name);
        confidence += 0.15;
    }

    if let Some(contact_title) = extract_contact_title(&text) {
        data.insert("contact_title".to_string(), contact_title);
        confidence += 0.1;
    }

    if let Some(founded_year) = extract_founded_year(&text) {
        data.insert("founded_year".to_string(), founded_year.to_string());
        confidence += 0.15;
    }

    if data.is_empty() {
        return None;
    }

    Some(EnrichmentResult {
        success: true,
        data,
        method: DataSource::Heuristic,
        confidence: confidence.min(0.9),
        processing_time: Duration::ZERO,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn lead() -> Lead {
        Lead {
            id: 1,
            organization_id: 1,
            owner_id: 1,
            company_name: Some("Acme Software".into()),
            website: "https://acme.example".into(),
            industry: None,
            about_text: None,
            contact_name: None,
            contact_title: None,
            email: None,
            phone: None,
            address: None,
            linkedin_url: None,
            twitter_url: None,
            facebook_url: None,
            employees: None,
            revenue_band: None,
            founded_year: None,
            score: 0.0,
            qualification_label: "Low Priority".into(),
            scrape_confidence: 0.0,
            email_confidence: 0.0,
            enrichment_confidence: 0.0,
            enrichment_source: "none".into(),
            email_source: "none".into(),
            scrape_source: "none".into(),
            outreach_message: None,
            outreach_sent: false,
            outreach_sent_at: None,
            message_style: "professional".into(),
            is_active: true,
            is_verified: false,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn infers_software_industry_from_keywords() {
        let text = "we are a leading saas platform for developers";
        assert_eq!(infer_industry(text), Some("Software"));
    }

    #[test]
    fn estimates_employees_from_explicit_count() {
        assert_eq!(estimate_employees("our team of 35 people"), Some("11-50"));
    }

    #[test]
    fn extracts_founded_year_variants() {
        assert_eq!(extract_founded_year("founded in 1998"), Some(1998));
        assert_eq!(extract_founded_year("since 2010"), Some(2010));
    }

    #[test]
    fn two_digit_apostrophe_year_at_the_fifty_boundary_expands_to_1950() {
        assert_eq!(extract_founded_year("founded in '50"), Some(1950));
    }

    #[test]
    fn heuristic_enrichment_combines_signals() {
        let mut scraped = HashMap::new();
        scraped.insert(
            "text_content".to_string(),
            "Acme is a saas platform founded in 2015 with a team of 30 people. CEO Jane Smith."
                .to_string(),
        );
        let result = heuristic_enrichment(&lead(), &scraped).expect("should enrich");
        assert_eq!(result.data.get("industry").unwrap(), "Software");
        assert_eq!(result.data.get("employees").unwrap(), "11-50");
        assert_eq!(result.data.get("founded_year").unwrap(), "2015");
        assert!(result.confidence > 0.0);
    }

    #[test]
    fn extract_json_object_pulls_braces_out_of_prose() {
        let content = "Here you go: {\"industry\": \"Software\"} thanks!";
        assert_eq!(
            extract_json_object(content).unwrap(),
            "{\"industry\": \"Software\"}"
        );
    }

    #[tokio::test]
    async fn waterfall_falls_through_to_none_when_nothing_matches() {
        let enricher = WaterfallEnricher::new(
            Box::new(NullExternalProvider),
            LlmClient::new(None, "llama-3.3-70b-versatile".to_string()),
        );
        let result = enricher.enrich_lead_data(&lead(), &HashMap::new()).await;
        assert!(result.is_none());
    }
}
