//! Orchestrator (spec.md §4.6), grounded on
//! `original_source/backend/core/domain/services/orchestrator.py` (the
//! six-step sequence, field-merge rules, retry policy, verbatim) with
//! three REDESIGN FLAGS applied against it:
//!
//! - native `tokio` tasks end-to-end, no event-loop-spun-in-a-threadpool
//!   (spec.md §9, "mixed sync/async dispatch");
//! - a `TieredScraper` constructed once per worker rather than a process
//!   singleton (spec.md §9, "global scraper singleton");
//! - a Postgres `jobs` table polled with `SELECT ... FOR UPDATE SKIP
//!   LOCKED` (`PgStore::claim_jobs`) in place of the source's Celery/
//!   Redis broker — Postgres is already the system of record, so no
//!   extra broker dependency is justified.
//!
//! Grounded on the teacher's worker-loop shape in
//! `original_source`'s Celery task, translated to a `tokio::spawn` poll
//! loop per spec.md §5's worker domain (fixed pool, prefetch 1, network
//! I/O as the dominant wait).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::domain::{DataSource, LeadUpdate};
use crate::enrichment::WaterfallEnricher;
use crate::messaging::{MessageStyle, Messenger};
use crate::quota::QuotaGate;
use crate::scoring::Scorer;
use crate::scraping::TieredScraper;
use crate::store::postgres::PgStore;

const MAX_RETRIES: i32 = 3;
const JOB_TIMEOUT: Duration = Duration::from_secs(120);

/// Outcome of running the pipeline once on a lead (spec.md §4.6's job
/// output contract).
#[derive(Debug, Clone, serde::Serialize)]
pub struct JobOutcome {
    pub status: &'static str,
    pub lead_id: i64,
    pub scraping_success: bool,
    pub enrichment_success: bool,
}

/// Pipeline-internal failures (spec.md §7). These never cross the HTTP
/// boundary; they only drive the job retry/fail decision.
#[derive(Debug, thiserror::Error)]
enum PipelineError {
    #[error("permanent: {0}")]
    Permanent(String),
    #[error("transient: {0}")]
    Transient(String),
}

pub struct Orchestrator {
    db: PgStore,
    quota: QuotaGate,
    scraper: Arc<TieredScraper>,
    enricher: Arc<WaterfallEnricher>,
    scorer: Scorer,
    messenger: Arc<Messenger>,
}

impl Orchestrator {
    pub fn new(
        db: PgStore,
        quota: QuotaGate,
        scraper: Arc<TieredScraper>,
        enricher: Arc<WaterfallEnricher>,
        messenger: Arc<Messenger>,
    ) -> Self {
        Self {
            db,
            quota,
            scraper,
            enricher,
            scorer: Scorer::with_default_criteria(),
            messenger,
        }
    }

    /// Spawns `worker_count` polling tasks, each claiming and running one
    /// job at a time (prefetch = 1, spec.md §5).
    pub fn spawn_workers(self: Arc<Self>, worker_count: usize, poll_interval: Duration) {
        for worker_id in 0..worker_count.max(1) {
            let orchestrator = self.clone();
            tokio::spawn(async move {
                tracing::info!(worker_id, "lead pipeline worker started");
                loop {
                    match orchestrator.db.claim_jobs(1).await {
                        Ok(jobs) if !jobs.is_empty() => {
                            for job in jobs {
                                orchestrator.run_job(job.id, job.lead_id, job.attempts).await;
                            }
                        }
                        Ok(_) => tokio::time::sleep(poll_interval).await,
                        Err(e) => {
                            tracing::error!(worker_id, "failed to claim jobs: {e}");
                            tokio::time::sleep(poll_interval).await;
                        }
                    }
                }
            });
        }
    }

    /// Runs one claimed job end to end, persisting its outcome. Never
    /// propagates an error to the caller — all failure handling (retry
    /// scheduling, permanent failure) happens here via `PgStore`.
    async fn run_job(&self, job_id: i64, lead_id: i64, attempts: i32) {
        let attempts = attempts + 1;
        let outcome = tokio::time::timeout(JOB_TIMEOUT, self.process_lead(lead_id)).await;

        match outcome {
            Ok(Ok(result)) => {
                if let Err(e) = self.db.mark_job_succeeded(job_id).await {
                    tracing::error!(job_id, lead_id, "failed to mark job succeeded: {e}");
                }
                tracing::info!(
                    job_id,
                    lead_id,
                    scraping_success = result.scraping_success,
                    enrichment_success = result.enrichment_success,
                    "lead pipeline job completed"
                );
            }
            Ok(Err(PipelineError::Permanent(msg))) => {
                tracing::warn!(job_id, lead_id, "lead pipeline job failed permanently: {msg}");
                if let Err(e) = self
                    .db
                    .mark_job_failed(job_id, attempts, 0, &msg)
                    .await
                {
                    tracing::error!(job_id, lead_id, "failed to record permanent failure: {e}");
                }
            }
            Ok(Err(PipelineError::Transient(msg))) => {
                tracing::warn!(job_id, lead_id, attempts, "lead pipeline job failed, will retry: {msg}");
                if let Err(e) = self
                    .db
                    .mark_job_failed(job_id, attempts, MAX_RETRIES, &msg)
                    .await
                {
                    tracing::error!(job_id, lead_id, "failed to record transient failure: {e}");
                }
            }
            Err(_) => {
                let msg = format!("job exceeded {}s wall-clock bound", JOB_TIMEOUT.as_secs());
                tracing::warn!(job_id, lead_id, "{msg}");
                if let Err(e) = self.db.mark_job_failed(job_id, attempts, MAX_RETRIES, &msg).await {
                    tracing::error!(job_id, lead_id, "failed to record timeout failure: {e}");
                }
            }
        }
    }

    /// The six-step sequence from spec.md §4.6, callable directly (the
    /// `/leads/{id}/process` handler and tests use this without going
    /// through the job queue).
    pub async fn process_lead(&self, lead_id: i64) -> Result<JobOutcome, ()> {
        match self.process_lead_inner(lead_id).await {
            Ok(outcome) => Ok(outcome),
            Err(_) => Err(()),
        }
    }

    async fn process_lead_inner(&self, lead_id: i64) -> Result<JobOutcome, PipelineError> {
        // Step 1: load.
        let lead = self
            .db
            .get_lead(lead_id)
            .await
            .map_err(|e| PipelineError::Transient(e.to_string()))?
            .ok_or_else(|| PipelineError::Permanent(format!("lead {lead_id} not found")))?;

        let org = self
            .db
            .get_organization(lead.organization_id)
            .await
            .map_err(|e| PipelineError::Transient(e.to_string()))?
            .ok_or_else(|| {
                PipelineError::Permanent(format!("organization {} not found", lead.organization_id))
            })?;

        let subscription = self
            .db
            .get_subscription(org.id)
            .await
            .map_err(|e| PipelineError::Transient(e.to_string()))?;
        let plan_name = subscription
            .map(|s| s.plan_name)
            .unwrap_or_else(|| "free".to_string());
        let ai_enabled = self.quota.can_use_ai_features(&plan_name);

        // Step 2: scrape.
        let scrape_result = self.scraper.scrape(&lead.website).await;
        self.db
            .create_scraping_log(
                lead_id,
                scrape_result.method.as_str(),
                scrape_result.success,
                scrape_result.confidence,
                i32::try_from(scrape_result.processing_time.as_millis()).ok(),
                Some(scraped_data_to_json(&scrape_result.data)),
                scrape_result.error_message.as_deref(),
            )
            .await
            .map_err(|e| PipelineError::Transient(e.to_string()))?;

        let scraped_strings = scraped_data_to_strings(&scrape_result.data);

        let mut update = LeadUpdate::default();
        if scrape_result.success {
            if let Some(title) = scraped_strings.get("title") {
                update.company_name = Some(title.clone());
            }
            update.about_text = scraped_strings
                .get("description")
                .or_else(|| scraped_strings.get("og_description"))
                .or_else(|| scraped_strings.get("meta_description"))
                .or_else(|| scraped_strings.get("text_content"))
                .cloned();
            update.email = scraped_strings.get("email").cloned();
            update.phone = scraped_strings.get("phone").cloned();
            update.linkedin_url = find_linkedin_link(&scrape_result.data);
            if update.email.is_some() {
                update.email_confidence = Some(scrape_result.confidence);
                update.email_source = Some(scrape_result.method.as_str().to_string());
            }
            update.scrape_confidence = Some(scrape_result.confidence);
            update.scrape_source = Some(scrape_result.method.as_str().to_string());
        } else {
            update.scrape_source = Some(DataSource::None.as_str().to_string());
        }

        let lead = self
            .db
            .update_lead(lead_id, &update)
            .await
            .map_err(|e| PipelineError::Transient(e.to_string()))?
            .ok_or_else(|| PipelineError::Permanent(format!("lead {lead_id} disappeared mid-job")))?;

        // Step 3: enrich, gated on plan AI access.
        let mut enrichment_success = false;
        if ai_enabled {
            if let Some(enrichment) = self
                .enricher
                .enrich_lead_data(&lead, &scraped_strings)
                .await
            {
                enrichment_success = enrichment.success;
                self.db
                    .create_enrichment_log(
                        lead_id,
                        enrichment.method.as_str(),
                        Some(serde_json::to_value(&enrichment.data).unwrap_or(Value::Null)),
                        enrichment.confidence,
                        i32::try_from(enrichment.processing_time.as_millis()).ok(),
                    )
                    .await
                    .map_err(|e| PipelineError::Transient(e.to_string()))?;

                let mut enrich_update = LeadUpdate::default();
                enrich_update.industry = enrichment.data.get("industry").cloned();
                enrich_update.employees = enrichment.data.get("employees").cloned();
                enrich_update.revenue_band = enrichment.data.get("revenue_band").cloned();
                enrich_update.founded_year = enrichment
                    .data
                    .get("founded_year")
                    .and_then(|s| s.parse::<i32>().ok());
                enrich_update.contact_name = enrichment.data.get("contact_name").cloned();
                enrich_update.contact_title = enrichment.data.get("contact_title").cloned();
                enrich_update.enrichment_confidence = Some(enrichment.confidence);
                enrich_update.enrichment_source = Some(enrichment.method.as_str().to_string());

                self.db
                    .update_lead(lead_id, &enrich_update)
                    .await
                    .map_err(|e| PipelineError::Transient(e.to_string()))?;
            }
        }

        let lead = self
            .db
            .get_lead(lead_id)
            .await
            .map_err(|e| PipelineError::Transient(e.to_string()))?
            .ok_or_else(|| PipelineError::Permanent(format!("lead {lead_id} disappeared mid-job")))?;

        // Step 4: score.
        let score_result = self.scorer.score_lead(&lead);
        let mut score_update = LeadUpdate::default();
        score_update.score = Some(score_result.total_score);
        score_update.qualification_label =
            Some(crate::domain::QualificationLabel::from(score_result.qualification_label).as_str().to_string());
        self.db
            .update_lead(lead_id, &score_update)
            .await
            .map_err(|e| PipelineError::Transient(e.to_string()))?;

        // Step 5: message, gated on plan AI access. Write a sentinel
        // otherwise so callers can distinguish "not yet run" from "AI
        // gated off" without reading the plan themselves.
        let lead = self
            .db
            .get_lead(lead_id)
            .await
            .map_err(|e| PipelineError::Transient(e.to_string()))?
            .ok_or_else(|| PipelineError::Permanent(format!("lead {lead_id} disappeared mid-job")))?;

        let outreach_message = if ai_enabled {
            let style = MessageStyle::parse(&lead.message_style);
            self.messenger
                .generate_message_with_style(&lead, style)
                .await
        } else {
            "AI-generated outreach is not available on your current plan.".to_string()
        };
        let mut message_update = LeadUpdate::default();
        message_update.outreach_message = Some(outreach_message);
        self.db
            .update_lead(lead_id, &message_update)
            .await
            .map_err(|e| PipelineError::Transient(e.to_string()))?;

        // Step 6: commit is implicit — every step above is its own
        // short-lived write, already durable.
        Ok(JobOutcome {
            status: "completed",
            lead_id,
            scraping_success: scrape_result.success,
            enrichment_success,
        })
    }
}

fn scraped_data_to_json(data: &std::collections::BTreeMap<String, Value>) -> Value {
    Value::Object(data.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
}

fn scraped_data_to_strings(data: &std::collections::BTreeMap<String, Value>) -> HashMap<String, String> {
    data.iter()
        .filter_map(|(k, v)| match v {
            Value::String(s) => Some((k.clone(), s.clone())),
            _ => None,
        })
        .collect()
}

fn find_linkedin_link(data: &std::collections::BTreeMap<String, Value>) -> Option<String> {
    let links = data.get("links")?.as_array()?;
    links
        .iter()
        .filter_map(|v| v.as_str())
        .find(|link| link.contains("linkedin.com"))
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_linkedin_link_among_outbound_links() {
        let mut data = std::collections::BTreeMap::new();
        data.insert(
            "links".to_string(),
            Value::Array(vec![
                Value::String("https://example.com/about".to_string()),
                Value::String("https://linkedin.com/company/acme".to_string()),
            ]),
        );
        assert_eq!(
            find_linkedin_link(&data).unwrap(),
            "https://linkedin.com/company/acme"
        );
    }

    #[test]
    fn no_linkedin_link_returns_none() {
        let data = std::collections::BTreeMap::new();
        assert!(find_linkedin_link(&data).is_none());
    }
}
