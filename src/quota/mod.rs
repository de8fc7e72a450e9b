//! Per-tenant quota gate (spec.md §4.5), grounded on
//! `original_source/backend/core/infrastructure/billing/subscription_service.py`.
//!
//! REDESIGN FLAG: the source's `SubscriptionService` re-reads plan limits
//! from environment variables on every call via `_get_plan_config()` and
//! silently falls back to the free tier's limits whenever that lookup
//! fails — a fail-*open* shape that lets a misconfigured deploy leak
//! unlimited usage. `PlanCatalog` (`crate::config`) is loaded once at
//! startup instead, and every method here fails *closed*: a database
//! error while checking usage is treated as "quota exceeded", the
//! opposite of the teacher's `jobs/budget_checker.rs`, which logs and
//! moves on when a query fails. Denying a legitimate request during an
//! outage is recoverable; silently waving through unpaid usage is not.

use chrono::Utc;
use sqlx::PgPool;

use crate::config::PlanCatalog;
use crate::domain::{Plan, PlanUsage};
use crate::errors::AppError;

pub struct QuotaGate {
    pool: PgPool,
    plans: PlanCatalog,
}

impl QuotaGate {
    pub fn new(pool: PgPool, plans: PlanCatalog) -> Self {
        Self { pool, plans }
    }

    fn plan_for(&self, plan_name: &str) -> &Plan {
        self.plans.get(plan_name)
    }

    /// Current usage is the count of Leads belonging to the organization
    /// with `created_at` in the current UTC day.
    pub async fn usage(&self, organization_id: i64, plan_name: &str) -> Result<PlanUsage, AppError> {
        let plan = self.plan_for(plan_name).clone();

        let current_usage: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM leads
            WHERE organization_id = $1
              AND created_at >= date_trunc('day', now() AT TIME ZONE 'UTC')
            "#,
        )
        .bind(organization_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("quota usage lookup failed for org {organization_id}: {e}");
            AppError::QuotaExceeded("unable to verify quota, denying by default".to_string())
        })?;

        let remaining = (plan.max_leads_per_day as i64 - current_usage).max(0);
        Ok(PlanUsage {
            plan_name: plan.name.clone(),
            max_leads_per_day: plan.max_leads_per_day,
            can_export: plan.can_export,
            can_use_ai: plan.can_use_ai,
            current_usage,
            remaining_daily_leads: remaining,
            can_process_more_today: current_usage < plan.max_leads_per_day as i64,
        })
    }

    pub async fn can_create_lead(
        &self,
        organization_id: i64,
        plan_name: &str,
    ) -> Result<bool, AppError> {
        let usage = self.usage(organization_id, plan_name).await?;
        Ok(usage.can_process_more_today)
    }

    /// Pure catalog lookup, no DB round-trip: a feature gate, not a
    /// counted resource, so there's nothing to fail closed against.
    pub fn can_use_ai_features(&self, plan_name: &str) -> bool {
        self.plan_for(plan_name).can_use_ai
    }

    pub fn can_export_data(&self, plan_name: &str) -> bool {
        self.plan_for(plan_name).can_export
    }

    pub async fn assign_plan_to_organization(
        &self,
        organization_id: i64,
        plan_name: &str,
    ) -> Result<(), AppError> {
        if !self.plans.contains(plan_name) {
            return Err(AppError::Validation(format!("unknown plan: {plan_name}")));
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE organizations SET plan_tier = $1 WHERE id = $2")
            .bind(plan_name)
            .bind(organization_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO subscriptions (organization_id, plan_name, status, cancel_at_period_end, current_period_start)
            VALUES ($1, $2, 'active', false, $3)
            ON CONFLICT (organization_id) DO UPDATE
                SET plan_name = EXCLUDED.plan_name,
                    status = 'active',
                    cancel_at_period_end = false,
                    current_period_start = EXCLUDED.current_period_start
            "#,
        )
        .bind(organization_id)
        .bind(plan_name)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// `immediate=true` cancels the subscription right away (`status =
    /// 'canceled'`); otherwise it keeps `status = 'active'` and only sets
    /// `cancel_at_period_end`, deferring the actual cutoff to period end
    /// (spec.md §4.5).
    pub async fn cancel_subscription(
        &self,
        organization_id: i64,
        immediate: bool,
    ) -> Result<(), AppError> {
        let result = if immediate {
            sqlx::query("UPDATE subscriptions SET status = 'canceled' WHERE organization_id = $1")
                .bind(organization_id)
                .execute(&self.pool)
                .await?
        } else {
            sqlx::query(
                "UPDATE subscriptions SET cancel_at_period_end = true WHERE organization_id = $1",
            )
            .bind(organization_id)
            .execute(&self.pool)
            .await?
        };

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(
                "no active subscription for organization".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_lookup_falls_back_to_free_for_unknown_name() {
        let plans = PlanCatalog::for_tests();
        let gate_plan = plans.get("nonexistent");
        assert_eq!(gate_plan.name, "free");
    }
}
