//! Process-wide configuration, loaded once at startup.
//!
//! REDESIGN FLAG (spec.md §9): the source re-reads `FREE_MAX_LEADS_PER_DAY`
//! and friends from the environment on every quota check
//! (`subscription_service.py`). `PlanCatalog` below is built exactly once
//! here and handed to the rest of the process through `AppState`.

use std::collections::HashMap;

use crate::domain::Plan;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_host: String,
    pub api_port: u16,
    pub database_url: String,
    pub environment: String,

    pub secret_key: String,
    pub algorithm: String,
    pub access_token_expire_minutes: i64,
    pub refresh_token_expire_days: i64,

    pub allowed_origins: Vec<String>,

    pub groq_api_key: Option<String>,
    pub llm_model: String,
    pub sender_org: String,
    pub default_plan: String,

    pub job_poll_interval_ms: u64,
    pub job_worker_count: usize,

    pub plans: PlanCatalog,
}

/// Immutable map of plan name -> `Plan`, built once from the environment
/// at startup and never re-read per request.
#[derive(Debug, Clone)]
pub struct PlanCatalog {
    plans: HashMap<String, Plan>,
}

impl PlanCatalog {
    fn from_env() -> Self {
        let mut plans = HashMap::new();
        plans.insert(
            "free".to_string(),
            Plan {
                name: "free".to_string(),
                max_leads_per_day: env_int("FREE_MAX_LEADS_PER_DAY", 10),
                can_export: env_bool("CAN_EXPORT_FREE", false),
                can_use_ai: env_bool("CAN_USE_AI_FREE", false),
            },
        );
        plans.insert(
            "pro".to_string(),
            Plan {
                name: "pro".to_string(),
                max_leads_per_day: env_int("PRO_MAX_LEADS_PER_DAY", 500),
                can_export: env_bool("CAN_EXPORT_PRO", false),
                can_use_ai: env_bool("CAN_USE_AI_PRO", false),
            },
        );
        plans.insert(
            "enterprise".to_string(),
            Plan {
                name: "enterprise".to_string(),
                max_leads_per_day: env_int("ENTERPRISE_MAX_LEADS_PER_DAY", 10000),
                can_export: env_bool("CAN_EXPORT_ENTERPRISE", false),
                can_use_ai: env_bool("CAN_USE_AI_ENTERPRISE", false),
            },
        );
        Self { plans }
    }

    /// Looks up a plan by name, falling back to `free` when the
    /// organization has no subscription row at all (source default).
    pub fn get(&self, plan_name: &str) -> &Plan {
        self.plans
            .get(plan_name)
            .unwrap_or_else(|| self.plans.get("free").expect("free plan always seeded"))
    }

    pub fn contains(&self, plan_name: &str) -> bool {
        self.plans.contains_key(plan_name)
    }

    pub fn all(&self) -> Vec<&Plan> {
        self.plans.values().collect()
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self::from_env()
    }
}

fn env_int(key: &str, default: i32) -> i32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| v.to_lowercase() == "true")
        .unwrap_or(default)
}

impl Config {
    pub fn load() -> anyhow::Result<Config> {
        dotenvy::dotenv().ok();

        let environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let secret_key =
            std::env::var("SECRET_KEY").unwrap_or_else(|_| "CHANGE_ME_INSECURE_SECRET".into());

        if secret_key == "CHANGE_ME_INSECURE_SECRET" {
            if environment == "production" {
                anyhow::bail!(
                    "SECRET_KEY is still the insecure placeholder. \
                     Set a strong secret before running in production."
                );
            }
            eprintln!(
                "⚠️  SECRET_KEY is not set — using insecure placeholder. Set one for production."
            );
        }

        Ok(Config {
            api_host: std::env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "8000".into())
                .parse()
                .unwrap_or(8000),
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost/leadforge".into()),
            environment,
            secret_key,
            algorithm: std::env::var("ALGORITHM").unwrap_or_else(|_| "HS256".into()),
            access_token_expire_minutes: std::env::var("ACCESS_TOKEN_EXPIRE_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            refresh_token_expire_days: std::env::var("REFRESH_TOKEN_EXPIRE_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(7),
            allowed_origins: std::env::var("ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "http://localhost:3000".into())
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
            groq_api_key: std::env::var("GROQ_API_KEY")
                .ok()
                .filter(|v| !v.is_empty() && v != "local_test_mode"),
            llm_model: std::env::var("LLM_MODEL")
                .unwrap_or_else(|_| "llama-3.1-8b-instant".into()),
            sender_org: std::env::var("SENDER_ORG").unwrap_or_else(|_| "Our Team".into()),
            default_plan: std::env::var("DEFAULT_PLAN").unwrap_or_else(|_| "free".into()),
            job_poll_interval_ms: std::env::var("JOB_POLL_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(500),
            job_worker_count: std::env::var("JOB_WORKER_COUNT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(4),
            plans: PlanCatalog::from_env(),
        })
    }
}
