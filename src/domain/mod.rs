//! Core domain types shared across the pipeline and the HTTP API.
//!
//! These hold ids, not object graphs (REDESIGN FLAG: the Python source's
//! cyclic `Lead<->Organization<->User` ORM back-references become plain
//! foreign-key columns here; related rows are fetched through `PgStore`
//! methods, never traversed).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `employees` band. Null on a `Lead` is represented as `Option<EmployeeBand>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmployeeBand {
    #[serde(rename = "1-10")]
    Band1To10,
    #[serde(rename = "11-50")]
    Band11To50,
    #[serde(rename = "51-200")]
    Band51To200,
    #[serde(rename = "201-500")]
    Band201To500,
    #[serde(rename = "500+")]
    Band500Plus,
}

impl EmployeeBand {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmployeeBand::Band1To10 => "1-10",
            EmployeeBand::Band11To50 => "11-50",
            EmployeeBand::Band51To200 => "51-200",
            EmployeeBand::Band201To500 => "201-500",
            EmployeeBand::Band500Plus => "500+",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "1-10" => Some(Self::Band1To10),
            "11-50" => Some(Self::Band11To50),
            "51-200" => Some(Self::Band51To200),
            "201-500" => Some(Self::Band201To500),
            "500+" => Some(Self::Band500Plus),
            _ => None,
        }
    }

    /// Deterministic employees -> revenue_band mapping (spec.md 4.2).
    pub fn revenue_band(&self) -> RevenueBand {
        match self {
            EmployeeBand::Band1To10 => RevenueBand::Band0To1M,
            EmployeeBand::Band11To50 => RevenueBand::Band1To10M,
            EmployeeBand::Band51To200 => RevenueBand::Band10To50M,
            EmployeeBand::Band201To500 => RevenueBand::Band50To100M,
            EmployeeBand::Band500Plus => RevenueBand::Band100MPlus,
        }
    }

    /// Maps a raw headcount number to a band (spec.md 4.2 heuristic fallback).
    pub fn from_headcount(n: u32) -> Self {
        if n <= 10 {
            Self::Band1To10
        } else if n <= 50 {
            Self::Band11To50
        } else if n <= 200 {
            Self::Band51To200
        } else if n <= 500 {
            Self::Band201To500
        } else {
            Self::Band500Plus
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RevenueBand {
    #[serde(rename = "$0-1M")]
    Band0To1M,
    #[serde(rename = "$1M-10M")]
    Band1To10M,
    #[serde(rename = "$10M-50M")]
    Band10To50M,
    #[serde(rename = "$50M-100M")]
    Band50To100M,
    #[serde(rename = "$100M+")]
    Band100MPlus,
}

impl RevenueBand {
    pub fn as_str(&self) -> &'static str {
        match self {
            RevenueBand::Band0To1M => "$0-1M",
            RevenueBand::Band1To10M => "$1M-10M",
            RevenueBand::Band10To50M => "$10M-50M",
            RevenueBand::Band50To100M => "$50M-100M",
            RevenueBand::Band100MPlus => "$100M+",
        }
    }
}

/// Where a piece of scrape/email/enrichment data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    None,
    Heuristic,
    Llm,
    ExternalApi,
    JsonLd,
    StructuredData,
    Playwright,
    Requests,
}

impl DataSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::None => "none",
            DataSource::Heuristic => "heuristic",
            DataSource::Llm => "llm",
            DataSource::ExternalApi => "external_api",
            DataSource::JsonLd => "json_ld",
            DataSource::StructuredData => "structured_data",
            DataSource::Playwright => "playwright",
            DataSource::Requests => "requests",
        }
    }
}

/// Final qualification label stored on a Lead.
///
/// `LowPriority` is exclusively the pre-scoring default assigned at lead
/// creation (see `PgStore::create_lead`); the Scorer itself never produces
/// it — only `ScorerLabel` below is reachable from `Scorer::classify`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QualificationLabel {
    #[serde(rename = "Hot Lead")]
    HotLead,
    #[serde(rename = "Warm Lead")]
    WarmLead,
    #[serde(rename = "Cold Lead")]
    ColdLead,
    Disqualified,
    #[serde(rename = "Low Priority")]
    LowPriority,
}

impl QualificationLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualificationLabel::HotLead => "Hot Lead",
            QualificationLabel::WarmLead => "Warm Lead",
            QualificationLabel::ColdLead => "Cold Lead",
            QualificationLabel::Disqualified => "Disqualified",
            QualificationLabel::LowPriority => "Low Priority",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Hot Lead" => Some(Self::HotLead),
            "Warm Lead" => Some(Self::WarmLead),
            "Cold Lead" => Some(Self::ColdLead),
            "Disqualified" => Some(Self::Disqualified),
            "Low Priority" => Some(Self::LowPriority),
            _ => None,
        }
    }
}

/// The subset of labels the Scorer can actually produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScorerLabel {
    HotLead,
    WarmLead,
    ColdLead,
    Disqualified,
}

impl From<ScorerLabel> for QualificationLabel {
    fn from(l: ScorerLabel) -> Self {
        match l {
            ScorerLabel::HotLead => QualificationLabel::HotLead,
            ScorerLabel::WarmLead => QualificationLabel::WarmLead,
            ScorerLabel::ColdLead => QualificationLabel::ColdLead,
            ScorerLabel::Disqualified => QualificationLabel::Disqualified,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Lead {
    pub id: i64,
    pub organization_id: i64,
    pub owner_id: i64,

    pub company_name: Option<String>,
    pub website: String,
    pub industry: Option<String>,
    pub about_text: Option<String>,

    pub contact_name: Option<String>,
    pub contact_title: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,

    pub linkedin_url: Option<String>,
    pub twitter_url: Option<String>,
    pub facebook_url: Option<String>,

    pub employees: Option<String>,
    pub revenue_band: Option<String>,
    pub founded_year: Option<i32>,

    pub score: f64,
    pub qualification_label: String,

    pub scrape_confidence: f64,
    pub email_confidence: f64,
    pub enrichment_confidence: f64,

    pub enrichment_source: String,
    pub email_source: String,
    pub scrape_source: String,

    pub outreach_message: Option<String>,
    pub outreach_sent: bool,
    pub outreach_sent_at: Option<DateTime<Utc>>,
    pub message_style: String,

    pub is_active: bool,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Partial update, mirroring the source's `.dict(exclude_unset=True)`
/// idiom via `Option<Option<T>>`-free plain `Option<T>` fields: a `None`
/// means "leave unchanged", so a field can never be explicitly nulled out
/// through this path (matching the source's behavior — no endpoint ever
/// clears e.g. `industry` back to null).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeadUpdate {
    pub company_name: Option<String>,
    pub about_text: Option<String>,
    pub industry: Option<String>,
    pub employees: Option<String>,
    pub revenue_band: Option<String>,
    pub founded_year: Option<i32>,
    pub contact_name: Option<String>,
    pub contact_title: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub linkedin_url: Option<String>,
    pub twitter_url: Option<String>,
    pub facebook_url: Option<String>,
    pub scrape_confidence: Option<f64>,
    pub email_confidence: Option<f64>,
    pub enrichment_confidence: Option<f64>,
    pub enrichment_source: Option<String>,
    pub email_source: Option<String>,
    pub scrape_source: Option<String>,
    pub score: Option<f64>,
    pub qualification_label: Option<String>,
    pub outreach_message: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Organization {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub plan_tier: String,
    pub max_users: i32,
    pub max_leads: i32,
    pub usage_count: i32,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Canceled,
    PastDue,
    Unpaid,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Unpaid => "unpaid",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Subscription {
    pub id: i64,
    pub organization_id: i64,
    pub plan_name: String,
    pub status: String,
    pub cancel_at_period_end: bool,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Plan {
    pub name: String,
    pub max_leads_per_day: i32,
    pub can_export: bool,
    pub can_use_ai: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanUsage {
    pub plan_name: String,
    pub max_leads_per_day: i32,
    pub can_export: bool,
    pub can_use_ai: bool,
    pub current_usage: i64,
    pub remaining_daily_leads: i64,
    pub can_process_more_today: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UsageRecord {
    pub id: i64,
    pub organization_id: i64,
    pub action: String,
    pub quantity: i32,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ScrapingLog {
    pub id: i64,
    pub lead_id: i64,
    pub scraping_method: String,
    pub success: bool,
    pub confidence_score: f64,
    pub processing_time_ms: Option<i32>,
    pub scraped_data: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EnrichmentLog {
    pub id: i64,
    pub lead_id: i64,
    pub enrichment_type: String,
    pub enrichment_data: Option<serde_json::Value>,
    pub confidence_score: f64,
    pub processing_time_ms: Option<i32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ApiKey {
    pub id: i64,
    pub key_hash: String,
    pub key_prefix: String,
    pub name: String,
    pub organization_id: i64,
    pub user_id: i64,
    pub is_active: bool,
    pub is_revoked: bool,
    pub rate_limit: i32,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(skip_serializing)]
    pub hashed_password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_active: bool,
    pub is_verified: bool,
    pub organization_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Invoice {
    pub id: i64,
    pub organization_id: i64,
    pub stripe_invoice_id: String,
    pub amount: f64,
    pub currency: String,
    pub status: String,
    pub invoice_pdf: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
}
