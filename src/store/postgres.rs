//! Postgres repository (spec.md §6), grounded on the teacher's
//! `PgStore` (query_scalar/query_as/query().execute() idioms) and on
//! `original_source/backend/core/infrastructure/database/crud.py` for
//! the exact operation set.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::{
    ApiKey, EnrichmentLog, Invoice, Lead, LeadUpdate, Organization, ScrapingLog, Subscription,
    UsageRecord, User,
};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    // -- Users --

    pub async fn create_user(
        &self,
        email: &str,
        hashed_password: &str,
        first_name: Option<&str>,
        last_name: Option<&str>,
    ) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(
            r#"INSERT INTO users (email, hashed_password, first_name, last_name)
               VALUES ($1, $2, $3, $4)
               RETURNING id, email, hashed_password, first_name, last_name, is_active,
                         is_verified, organization_id, created_at"#,
        )
        .bind(email)
        .bind(hashed_password)
        .bind(first_name)
        .bind(last_name)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    pub async fn get_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"SELECT id, email, hashed_password, first_name, last_name, is_active,
                      is_verified, organization_id, created_at
               FROM users WHERE email = $1"#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    pub async fn get_user(&self, id: i64) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"SELECT id, email, hashed_password, first_name, last_name, is_active,
                      is_verified, organization_id, created_at
               FROM users WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    pub async fn set_user_organization(&self, user_id: i64, organization_id: i64) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET organization_id = $1 WHERE id = $2")
            .bind(organization_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn update_user_profile(
        &self,
        id: i64,
        first_name: Option<&str>,
        last_name: Option<&str>,
    ) -> anyhow::Result<Option<User>> {
        sqlx::query(
            r#"UPDATE users SET first_name = COALESCE($2, first_name),
                                 last_name = COALESCE($3, last_name)
               WHERE id = $1"#,
        )
        .bind(id)
        .bind(first_name)
        .bind(last_name)
        .execute(&self.pool)
        .await?;
        self.get_user(id).await
    }

    // -- Organizations --

    pub async fn create_organization(
        &self,
        name: &str,
        plan_tier: &str,
        max_users: i32,
        max_leads: i32,
    ) -> anyhow::Result<Organization> {
        let org = sqlx::query_as::<_, Organization>(
            r#"INSERT INTO organizations (name, plan_tier, max_users, max_leads)
               VALUES ($1, $2, $3, $4)
               RETURNING id, name, description, plan_tier, max_users, max_leads, usage_count,
                         stripe_customer_id, stripe_subscription_id, is_active, created_at"#,
        )
        .bind(name)
        .bind(plan_tier)
        .bind(max_users)
        .bind(max_leads)
        .fetch_one(&self.pool)
        .await?;
        Ok(org)
    }

    pub async fn get_organization(&self, id: i64) -> anyhow::Result<Option<Organization>> {
        let org = sqlx::query_as::<_, Organization>(
            r#"SELECT id, name, description, plan_tier, max_users, max_leads, usage_count,
                      stripe_customer_id, stripe_subscription_id, is_active, created_at
               FROM organizations WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(org)
    }

    pub async fn update_organization(
        &self,
        id: i64,
        name: Option<&str>,
        description: Option<&str>,
    ) -> anyhow::Result<Option<Organization>> {
        sqlx::query(
            r#"UPDATE organizations SET name = COALESCE($2, name),
                                        description = COALESCE($3, description)
               WHERE id = $1"#,
        )
        .bind(id)
        .bind(name)
        .bind(description)
        .execute(&self.pool)
        .await?;
        self.get_organization(id).await
    }

    // -- Subscriptions / Plans --

    pub async fn get_subscription(&self, organization_id: i64) -> anyhow::Result<Option<Subscription>> {
        let sub = sqlx::query_as::<_, Subscription>(
            r#"SELECT id, organization_id, plan_name, status, cancel_at_period_end,
                      current_period_start, current_period_end
               FROM subscriptions WHERE organization_id = $1"#,
        )
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(sub)
    }

    // -- Leads --

    /// Server-assigns `organization_id`/`owner_id` from the authenticated
    /// caller rather than trusting request-body fields (Open Question
    /// resolution, spec.md §9: the source's bulk-creation endpoint trusts
    /// client-supplied ids while its single-lead endpoint derives them
    /// from the current user; this crate derives them from the caller on
    /// both paths).
    pub async fn create_lead(
        &self,
        organization_id: i64,
        owner_id: i64,
        website: &str,
        message_style: &str,
    ) -> anyhow::Result<Lead> {
        let lead = sqlx::query_as::<_, Lead>(
            r#"INSERT INTO leads (organization_id, owner_id, website, qualification_label,
                                  enrichment_source, email_source, scrape_source, message_style)
               VALUES ($1, $2, $3, 'Low Priority', 'none', 'none', 'none', $4)
               RETURNING id, organization_id, owner_id, company_name, website, industry,
                         about_text, contact_name, contact_title, email, phone, address,
                         linkedin_url, twitter_url, facebook_url, employees, revenue_band,
                         founded_year, score, qualification_label, scrape_confidence,
                         email_confidence, enrichment_confidence, enrichment_source,
                         email_source, scrape_source, outreach_message, outreach_sent,
                         outreach_sent_at, message_style, is_active, is_verified, created_at, updated_at"#,
        )
        .bind(organization_id)
        .bind(owner_id)
        .bind(website)
        .bind(message_style)
        .fetch_one(&self.pool)
        .await?;
        Ok(lead)
    }

    pub async fn get_lead(&self, id: i64) -> anyhow::Result<Option<Lead>> {
        let lead = sqlx::query_as::<_, Lead>(
            r#"SELECT id, organization_id, owner_id, company_name, website, industry,
                      about_text, contact_name, contact_title, email, phone, address,
                      linkedin_url, twitter_url, facebook_url, employees, revenue_band,
                      founded_year, score, qualification_label, scrape_confidence,
                      email_confidence, enrichment_confidence, enrichment_source,
                      email_source, scrape_source, outreach_message, outreach_sent,
                      outreach_sent_at, message_style, is_active, is_verified, created_at, updated_at
               FROM leads WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(lead)
    }

    pub async fn list_leads(&self, organization_id: i64, limit: i64, offset: i64) -> anyhow::Result<Vec<Lead>> {
        let leads = sqlx::query_as::<_, Lead>(
            r#"SELECT id, organization_id, owner_id, company_name, website, industry,
                      about_text, contact_name, contact_title, email, phone, address,
                      linkedin_url, twitter_url, facebook_url, employees, revenue_band,
                      founded_year, score, qualification_label, scrape_confidence,
                      email_confidence, enrichment_confidence, enrichment_source,
                      email_source, scrape_source, outreach_message, outreach_sent,
                      outreach_sent_at, message_style, is_active, is_verified, created_at, updated_at
               FROM leads WHERE organization_id = $1
               ORDER BY created_at DESC
               LIMIT $2 OFFSET $3"#,
        )
        .bind(organization_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(leads)
    }

    /// Partial update mirroring the source's `.dict(exclude_unset=True)`
    /// merge: only fields present (`Some`) on `update` are written.
    pub async fn update_lead(&self, id: i64, update: &LeadUpdate) -> anyhow::Result<Option<Lead>> {
        sqlx::query(
            r#"UPDATE leads SET
                company_name = COALESCE($2, company_name),
                about_text = COALESCE($3, about_text),
                industry = COALESCE($4, industry),
                employees = COALESCE($5, employees),
                revenue_band = COALESCE($6, revenue_band),
                founded_year = COALESCE($7, founded_year),
                contact_name = COALESCE($8, contact_name),
                contact_title = COALESCE($9, contact_title),
                email = COALESCE($10, email),
                phone = COALESCE($11, phone),
                address = COALESCE($12, address),
                linkedin_url = COALESCE($13, linkedin_url),
                twitter_url = COALESCE($14, twitter_url),
                facebook_url = COALESCE($15, facebook_url),
                scrape_confidence = COALESCE($16, scrape_confidence),
                email_confidence = COALESCE($17, email_confidence),
                enrichment_confidence = COALESCE($18, enrichment_confidence),
                enrichment_source = COALESCE($19, enrichment_source),
                email_source = COALESCE($20, email_source),
                scrape_source = COALESCE($21, scrape_source),
                score = COALESCE($22, score),
                qualification_label = COALESCE($23, qualification_label),
                outreach_message = COALESCE($24, outreach_message),
                is_active = COALESCE($25, is_active),
                updated_at = NOW()
               WHERE id = $1"#,
        )
        .bind(id)
        .bind(&update.company_name)
        .bind(&update.about_text)
        .bind(&update.industry)
        .bind(&update.employees)
        .bind(&update.revenue_band)
        .bind(update.founded_year)
        .bind(&update.contact_name)
        .bind(&update.contact_title)
        .bind(&update.email)
        .bind(&update.phone)
        .bind(&update.address)
        .bind(&update.linkedin_url)
        .bind(&update.twitter_url)
        .bind(&update.facebook_url)
        .bind(update.scrape_confidence)
        .bind(update.email_confidence)
        .bind(update.enrichment_confidence)
        .bind(&update.enrichment_source)
        .bind(&update.email_source)
        .bind(&update.scrape_source)
        .bind(update.score)
        .bind(&update.qualification_label)
        .bind(&update.outreach_message)
        .bind(update.is_active)
        .execute(&self.pool)
        .await?;

        self.get_lead(id).await
    }

    pub async fn count_leads_today(&self, organization_id: i64) -> anyhow::Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(*) FROM leads
               WHERE organization_id = $1 AND created_at >= date_trunc('day', now() AT TIME ZONE 'UTC')"#,
        )
        .bind(organization_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    // -- Logs --

    pub async fn create_scraping_log(
        &self,
        lead_id: i64,
        scraping_method: &str,
        success: bool,
        confidence_score: f64,
        processing_time_ms: Option<i32>,
        scraped_data: Option<serde_json::Value>,
        error_message: Option<&str>,
    ) -> anyhow::Result<ScrapingLog> {
        let log = sqlx::query_as::<_, ScrapingLog>(
            r#"INSERT INTO scraping_logs
                (lead_id, scraping_method, success, confidence_score, processing_time_ms, scraped_data, error_message)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               RETURNING id, lead_id, scraping_method, success, confidence_score,
                         processing_time_ms, scraped_data, error_message, created_at"#,
        )
        .bind(lead_id)
        .bind(scraping_method)
        .bind(success)
        .bind(confidence_score)
        .bind(processing_time_ms)
        .bind(scraped_data)
        .bind(error_message)
        .fetch_one(&self.pool)
        .await?;
        Ok(log)
    }

    pub async fn create_enrichment_log(
        &self,
        lead_id: i64,
        enrichment_type: &str,
        enrichment_data: Option<serde_json::Value>,
        confidence_score: f64,
        processing_time_ms: Option<i32>,
    ) -> anyhow::Result<EnrichmentLog> {
        let log = sqlx::query_as::<_, EnrichmentLog>(
            r#"INSERT INTO enrichment_logs (lead_id, enrichment_type, enrichment_data, confidence_score, processing_time_ms)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING id, lead_id, enrichment_type, enrichment_data, confidence_score, processing_time_ms, created_at"#,
        )
        .bind(lead_id)
        .bind(enrichment_type)
        .bind(enrichment_data)
        .bind(confidence_score)
        .bind(processing_time_ms)
        .fetch_one(&self.pool)
        .await?;
        Ok(log)
    }

    /// Deletes scraping/enrichment logs older than `retain_days` days.
    /// Used by `jobs::cleanup` (log retention, spec.md ambient stack).
    pub async fn delete_logs_older_than(&self, retain_days: i64) -> anyhow::Result<u64> {
        let cutoff = Utc::now() - chrono::Duration::days(retain_days);
        let scraping = sqlx::query("DELETE FROM scraping_logs WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        let enrichment = sqlx::query("DELETE FROM enrichment_logs WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(scraping.rows_affected() + enrichment.rows_affected())
    }

    // -- Usage records --

    pub async fn record_usage(
        &self,
        organization_id: i64,
        action: &str,
        quantity: i32,
    ) -> anyhow::Result<UsageRecord> {
        let record = sqlx::query_as::<_, UsageRecord>(
            r#"INSERT INTO usage_records (organization_id, action, quantity)
               VALUES ($1, $2, $3)
               RETURNING id, organization_id, action, quantity, timestamp"#,
        )
        .bind(organization_id)
        .bind(action)
        .bind(quantity)
        .fetch_one(&self.pool)
        .await?;
        Ok(record)
    }

    // -- API keys --

    pub async fn create_api_key(
        &self,
        organization_id: i64,
        user_id: i64,
        name: &str,
        key_prefix: &str,
        key_hash: &str,
        rate_limit: i32,
        expires_at: Option<DateTime<Utc>>,
    ) -> anyhow::Result<ApiKey> {
        let key = sqlx::query_as::<_, ApiKey>(
            r#"INSERT INTO api_keys (organization_id, user_id, name, key_prefix, key_hash, rate_limit, expires_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               RETURNING id, key_hash, key_prefix, name, organization_id, user_id, is_active,
                         is_revoked, rate_limit, expires_at, created_at"#,
        )
        .bind(organization_id)
        .bind(user_id)
        .bind(name)
        .bind(key_prefix)
        .bind(key_hash)
        .bind(rate_limit)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(key)
    }

    pub async fn get_api_key_by_prefix(&self, key_prefix: &str) -> anyhow::Result<Option<ApiKey>> {
        let key = sqlx::query_as::<_, ApiKey>(
            r#"SELECT id, key_hash, key_prefix, name, organization_id, user_id, is_active,
                      is_revoked, rate_limit, expires_at, created_at
               FROM api_keys WHERE key_prefix = $1"#,
        )
        .bind(key_prefix)
        .fetch_optional(&self.pool)
        .await?;
        Ok(key)
    }

    pub async fn revoke_api_key(&self, id: i64) -> anyhow::Result<bool> {
        let result = sqlx::query("UPDATE api_keys SET is_revoked = true WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // -- Invoices --

    pub async fn list_invoices(&self, organization_id: i64) -> anyhow::Result<Vec<Invoice>> {
        let invoices = sqlx::query_as::<_, Invoice>(
            r#"SELECT id, organization_id, stripe_invoice_id, amount, currency, status, invoice_pdf, due_date
               FROM invoices WHERE organization_id = $1 ORDER BY due_date DESC NULLS LAST"#,
        )
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(invoices)
    }

    // -- Job queue --

    /// Enqueues a lead-processing job (replaces the source's Celery
    /// broker enqueue).
    pub async fn enqueue_job(&self, lead_id: i64) -> anyhow::Result<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"INSERT INTO jobs (lead_id, status, attempts) VALUES ($1, 'pending', 0) RETURNING id"#,
        )
        .bind(lead_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Claims up to `batch_size` pending/retryable jobs for this worker,
    /// using `FOR UPDATE SKIP LOCKED` so multiple workers can poll the
    /// same table concurrently without blocking on each other (replaces
    /// the source's Celery/Redis broker with direct Postgres polling).
    pub async fn claim_jobs(&self, batch_size: i64) -> anyhow::Result<Vec<JobRow>> {
        let mut tx = self.pool.begin().await?;

        let jobs = sqlx::query_as::<_, JobRow>(
            r#"SELECT id, lead_id, status, attempts, last_error, run_at, created_at
               FROM jobs
               WHERE status IN ('pending', 'retrying') AND run_at <= NOW()
               ORDER BY run_at ASC
               FOR UPDATE SKIP LOCKED
               LIMIT $1"#,
        )
        .bind(batch_size)
        .fetch_all(&mut *tx)
        .await?;

        if !jobs.is_empty() {
            let ids: Vec<i64> = jobs.iter().map(|j| j.id).collect();
            sqlx::query("UPDATE jobs SET status = 'processing' WHERE id = ANY($1)")
                .bind(&ids)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(jobs)
    }

    pub async fn mark_job_succeeded(&self, job_id: i64) -> anyhow::Result<()> {
        sqlx::query("UPDATE jobs SET status = 'succeeded' WHERE id = $1")
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Schedules a retry 60 seconds out, or marks the job permanently
    /// failed once `max_retries` attempts have been used (mirrors the
    /// source's `self.retry(exc=exc, countdown=60, max_retries=3)`).
    pub async fn mark_job_failed(
        &self,
        job_id: i64,
        attempts: i32,
        max_retries: i32,
        error: &str,
    ) -> anyhow::Result<()> {
        if attempts >= max_retries {
            sqlx::query(
                "UPDATE jobs SET status = 'failed', attempts = $2, last_error = $3 WHERE id = $1",
            )
            .bind(job_id)
            .bind(attempts)
            .bind(error)
            .execute(&self.pool)
            .await?;
        } else {
            sqlx::query(
                r#"UPDATE jobs SET status = 'retrying', attempts = $2, last_error = $3,
                   run_at = NOW() + INTERVAL '60 seconds' WHERE id = $1"#,
            )
            .bind(job_id)
            .bind(attempts)
            .bind(error)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JobRow {
    pub id: i64,
    pub lead_id: i64,
    pub status: String,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub run_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}
