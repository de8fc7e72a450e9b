//! Lead scoring (spec.md §4.3).
//!
//! REDESIGN FLAG: the source's `_evaluate_criterion` dispatches on
//! `criterion.name: String` through an if/elif chain that silently
//! returns 0.0 and logs a warning for any unrecognized name — grounded
//! at `original_source/backend/core/domain/services/scoring.py`. Here
//! `CriterionKind` is a closed enum; `Criterion::evaluate` matches
//! exhaustively, so a new variant is a compile error at every call site
//! until handled, not a silent no-op discovered at runtime.

use crate::domain::{Lead, ScorerLabel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CriterionKind {
    IndustryMatch,
    CompanySize,
    EmailQuality,
    ScrapeQuality,
    EnrichmentQuality,
    LinkedinPresence,
}

impl CriterionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CriterionKind::IndustryMatch => "industry_match",
            CriterionKind::CompanySize => "company_size",
            CriterionKind::EmailQuality => "email_quality",
            CriterionKind::ScrapeQuality => "scrape_quality",
            CriterionKind::EnrichmentQuality => "enrichment_quality",
            CriterionKind::LinkedinPresence => "linkedin_presence",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "industry_match" => Some(Self::IndustryMatch),
            "company_size" => Some(Self::CompanySize),
            "email_quality" => Some(Self::EmailQuality),
            "scrape_quality" => Some(Self::ScrapeQuality),
            "enrichment_quality" => Some(Self::EnrichmentQuality),
            "linkedin_presence" => Some(Self::LinkedinPresence),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Criterion {
    pub kind: CriterionKind,
    pub weight: f64,
    pub threshold: f64,
    pub max_score: f64,
}

const PREFERRED_INDUSTRIES: &[&str] = &[
    "Software",
    "SaaS",
    "Technology",
    "Fintech",
    "Healthcare",
    "E-commerce",
    "AI",
    "Data",
];

const PREFERRED_SIZES: &[&str] = &["11-50", "51-200", "201-500"];

impl Criterion {
    fn evaluate(&self, lead: &Lead) -> f64 {
        match self.kind {
            CriterionKind::IndustryMatch => {
                match &lead.industry {
                    Some(i) if PREFERRED_INDUSTRIES.contains(&i.as_str()) => self.max_score,
                    _ => 0.0,
                }
            }
            CriterionKind::CompanySize => match &lead.employees {
                Some(e) if PREFERRED_SIZES.contains(&e.as_str()) => self.max_score,
                _ => 0.0,
            },
            CriterionKind::EmailQuality => {
                scaled(lead.email_confidence, self.threshold, self.max_score)
            }
            CriterionKind::ScrapeQuality => {
                scaled(lead.scrape_confidence, self.threshold, self.max_score)
            }
            CriterionKind::EnrichmentQuality => {
                scaled(lead.enrichment_confidence, self.threshold, self.max_score)
            }
            CriterionKind::LinkedinPresence => {
                if lead.linkedin_url.is_some() {
                    self.max_score
                } else {
                    0.0
                }
            }
        }
    }
}

fn scaled(confidence: f64, threshold: f64, max_score: f64) -> f64 {
    if confidence >= threshold {
        max_score * confidence
    } else {
        0.0
    }
}

pub fn default_criteria() -> Vec<Criterion> {
    vec![
        Criterion {
            kind: CriterionKind::IndustryMatch,
            weight: 0.25,
            threshold: 0.5,
            max_score: 25.0,
        },
        Criterion {
            kind: CriterionKind::CompanySize,
            weight: 0.20,
            threshold: 0.5,
            max_score: 20.0,
        },
        Criterion {
            kind: CriterionKind::EmailQuality,
            weight: 0.15,
            threshold: 0.6,
            max_score: 15.0,
        },
        Criterion {
            kind: CriterionKind::ScrapeQuality,
            weight: 0.15,
            threshold: 0.6,
            max_score: 15.0,
        },
        Criterion {
            kind: CriterionKind::EnrichmentQuality,
            weight: 0.15,
            threshold: 0.6,
            max_score: 15.0,
        },
        Criterion {
            kind: CriterionKind::LinkedinPresence,
            weight: 0.10,
            threshold: 0.5,
            max_score: 10.0,
        },
    ]
}

#[derive(Debug, Clone)]
pub struct ScoreResult {
    pub total_score: f64,
    pub criteria_scores: Vec<(CriterionKind, f64)>,
    pub qualification_label: ScorerLabel,
}

pub struct Scorer {
    criteria: Vec<Criterion>,
}

impl Default for Scorer {
    fn default() -> Self {
        Self {
            criteria: default_criteria(),
        }
    }
}

impl Scorer {
    pub fn new(criteria: Vec<Criterion>) -> Self {
        Self { criteria }
    }

    pub fn with_default_criteria() -> Self {
        Self::default()
    }

    pub fn score_lead(&self, lead: &Lead) -> ScoreResult {
        let mut criteria_scores = Vec::with_capacity(self.criteria.len());
        let mut total = 0.0;
        for criterion in &self.criteria {
            let score = criterion.evaluate(lead);
            criteria_scores.push((criterion.kind, score));
            total += score;
        }

        let normalized = total.min(100.0);
        ScoreResult {
            total_score: normalized,
            criteria_scores,
            qualification_label: classify(normalized),
        }
    }

    /// Rebuilds the per-organization criteria set from custom weights,
    /// normalizing so they sum to 1.0 (mirrors
    /// `LeadScoringService.calculate_custom_score`). Criteria absent from
    /// `custom_weights` keep their default weight of zero contribution —
    /// callers pass a full weight map, matching the source's behavior of
    /// only including what it's given.
    pub fn with_custom_weights(custom_weights: &[(CriterionKind, f64)]) -> Option<Self> {
        let defaults = default_criteria();
        let mut criteria: Vec<Criterion> = Vec::new();
        for (kind, weight) in custom_weights {
            if let Some(base) = defaults.iter().find(|c| c.kind == *kind) {
                criteria.push(Criterion {
                    kind: base.kind,
                    weight: *weight,
                    threshold: base.threshold,
                    max_score: base.max_score,
                });
            }
        }

        let total_weight: f64 = criteria.iter().map(|c| c.weight).sum();
        if total_weight <= 0.0 {
            return None;
        }
        for c in &mut criteria {
            c.weight /= total_weight;
        }

        Some(Self { criteria })
    }
}

fn classify(score: f64) -> ScorerLabel {
    if score >= 80.0 {
        ScorerLabel::HotLead
    } else if score >= 60.0 {
        ScorerLabel::WarmLead
    } else if score >= 40.0 {
        ScorerLabel::ColdLead
    } else {
        ScorerLabel::Disqualified
    }
}

/// Validates that a set of criteria weights sums to 1.0 within floating
/// point tolerance (mirrors `update_scoring_config`'s `abs(total - 1.0) >
/// 0.01` guard).
pub fn validate_weights(criteria: &[Criterion]) -> Result<(), String> {
    let total: f64 = criteria.iter().map(|c| c.weight).sum();
    if (total - 1.0).abs() > 0.01 {
        return Err(format!(
            "scoring criteria weights must sum to 1.0, got {:.4}",
            total
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn base_lead() -> Lead {
        Lead {
            id: 1,
            organization_id: 1,
            owner_id: 1,
            company_name: Some("Acme".into()),
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
    fn fully_qualified_lead_scores_hot() {
        let mut lead = base_lead();
        lead.industry = Some("Software".into());
        lead.employees = Some("51-200".into());
        lead.email_confidence = 1.0;
        lead.scrape_confidence = 1.0;
        lead.enrichment_confidence = 1.0;
        lead.linkedin_url = Some("https://linkedin.com/company/acme".into());

        let result = Scorer::default().score_lead(&lead);
        assert_eq!(result.total_score, 100.0);
        assert!(matches!(result.qualification_label, ScorerLabel::HotLead));
    }

    #[test]
    fn empty_lead_is_disqualified() {
        let result = Scorer::default().score_lead(&base_lead());
        assert_eq!(result.total_score, 0.0);
        assert!(matches!(
            result.qualification_label,
            ScorerLabel::Disqualified
        ));
    }

    #[test]
    fn below_threshold_confidence_scores_zero_for_that_criterion() {
        let mut lead = base_lead();
        lead.email_confidence = 0.3;
        let result = Scorer::default().score_lead(&lead);
        let (_, email_score) = result
            .criteria_scores
            .iter()
            .find(|(k, _)| *k == CriterionKind::EmailQuality)
            .unwrap();
        assert_eq!(*email_score, 0.0);
    }

    #[test]
    fn custom_weights_normalize_to_one() {
        let scorer = Scorer::with_custom_weights(&[
            (CriterionKind::IndustryMatch, 2.0),
            (CriterionKind::LinkedinPresence, 2.0),
        ])
        .unwrap();
        let total: f64 = scorer.criteria.iter().map(|c| c.weight).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn weight_validation_rejects_bad_sums() {
        let mut criteria = default_criteria();
        criteria[0].weight = 0.9;
        assert!(validate_weights(&criteria).is_err());
        assert!(validate_weights(&default_criteria()).is_ok());
    }
}
