//! Outreach message generation (spec.md §4.4), grounded on
//! `original_source/backend/core/infrastructure/messaging/messenger.py`.
//!
//! A "data-locked" prompt system: the LLM path is only attempted once the
//! lead carries enough real data points to personalize with, and its
//! reply is post-checked to mention the company name so a generic
//! non-personalized completion doesn't slip through silently.

use crate::domain::Lead;
use crate::llm::LlmClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStyle {
    Professional,
    Friendly,
    Short,
}

impl MessageStyle {
    /// Parses the `message_style` request/column value. Unrecognized
    /// input falls back to `Professional` rather than rejecting the
    /// request — the field is advisory, not load-bearing.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "friendly" => MessageStyle::Friendly,
            "short" => MessageStyle::Short,
            _ => MessageStyle::Professional,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStyle::Professional => "professional",
            MessageStyle::Friendly => "friendly",
            MessageStyle::Short => "short",
        }
    }
}

pub struct Messenger {
    sender_org: String,
    llm: LlmClient,
}

impl Messenger {
    pub fn new(sender_org: String, llm: LlmClient) -> Self {
        Self { sender_org, llm }
    }

    pub async fn generate_message(&self, lead: &Lead) -> String {
        if has_sufficient_data(lead) {
            if let Some(message) = self.generate_llm_message(lead).await {
                return message;
            }
        }
        generate_template_message(lead, &self.sender_org)
    }

    pub async fn generate_message_with_style(&self, lead: &Lead, style: MessageStyle) -> String {
        let base = self.generate_message(lead).await;
        match style {
            MessageStyle::Professional => make_professional(&base, &self.sender_org),
            MessageStyle::Friendly => make_friendly(&base),
            MessageStyle::Short => make_short(&base),
        }
    }

    async fn generate_llm_message(&self, lead: &Lead) -> Option<String> {
        if !self.llm.is_configured() {
            tracing::warn!("LLM not configured, skipping LLM message generation");
            return None;
        }

        let context = Context::build(lead, &self.sender_org);
        let system_prompt = "You are an outreach assistant. Generate a professional outreach \
             message using ONLY the information provided in the context. Do not invent or \
             hallucinate any information not present in the context. Keep the message concise \
             and relevant to the recipient.";
        let human_prompt = context.human_prompt();

        let content = match self.llm.complete(system_prompt, &human_prompt).await {
            Ok(Some(content)) => content,
            Ok(None) => return None,
            Err(e) => {
                tracing::error!("LLM message generation failed: {e}");
                return None;
            }
        };

        Some(validate_response(&content, &context).trim().to_string())
    }
}

struct Context {
    company_name: String,
    industry: String,
    about_text: String,
    contact_name: String,
    employees: String,
    website: String,
    sender_org: String,
    has_company_name: bool,
}

impl Context {
    fn build(lead: &Lead, sender_org: &str) -> Self {
        Self {
            company_name: lead
                .company_name
                .clone()
                .unwrap_or_else(|| "their company".to_string()),
            has_company_name: lead.company_name.is_some(),
            industry: lead
                .industry
                .clone()
                .unwrap_or_else(|| "their industry".to_string()),
            about_text: lead.about_text.clone().unwrap_or_default(),
            contact_name: lead
                .contact_name
                .clone()
                .unwrap_or_else(|| "the team".to_string()),
            employees: lead.employees.clone().unwrap_or_default(),
            website: lead.website.clone(),
            sender_org: sender_org.to_string(),
        }
    }

    fn human_prompt(&self) -> String {
        let mut parts = vec![
            format!("Sender Organization: {}", self.sender_org),
            format!("Recipient Company: {}", self.company_name),
            format!("Industry: {}", self.industry),
            format!("Website: {}", self.website),
        ];

        if !self.about_text.is_empty() {
            let truncated: String = self.about_text.chars().take(200).collect();
            parts.push(format!("About: {truncated}..."));
        }
        if self.contact_name != "the team" {
            parts.push(format!("Contact: {}", self.contact_name));
        }
        if !self.employees.is_empty() {
            parts.push(format!("Size: {} employees", self.employees));
        }

        parts.push(format!(
            "\nWrite a personalized outreach message from {} to {} that acknowledges their \
             work in {}. The message should be professional but not overly formal. Focus on \
             how {} could provide value to their business.",
            self.sender_org, self.company_name, self.industry, self.sender_org
        ));

        parts.join("\n")
    }
}

fn validate_response(response: &str, context: &Context) -> String {
    if context.has_company_name && !response.to_lowercase().contains(&context.company_name.to_lowercase()) {
        return format!("Hi {} team,\n\n{}", context.company_name, response);
    }
    response.to_string()
}

/// At least two of {company_name, industry, about_text (>50 chars),
/// contact_name, employees} must be present before the LLM path runs at
/// all (spec.md §4.4's "sufficient-data gate").
fn has_sufficient_data(lead: &Lead) -> bool {
    let mut data_points = 0;
    if lead.company_name.is_some() {
        data_points += 1;
    }
    if lead.industry.is_some() {
        data_points += 1;
    }
    if lead.about_text.as_ref().map(|t| t.len() > 50).unwrap_or(false) {
        data_points += 1;
    }
    if lead.contact_name.is_some() {
        data_points += 1;
    }
    if lead.employees.is_some() {
        data_points += 1;
    }
    data_points >= 2
}

fn generate_template_message(lead: &Lead, sender_org: &str) -> String {
    match (&lead.company_name, &lead.industry) {
        (Some(_), Some(_)) => industry_template(lead, sender_org),
        (Some(_), None) => generic_template(lead, sender_org),
        (None, _) => website_only_template(lead, sender_org),
    }
}

fn industry_template(lead: &Lead, sender_org: &str) -> String {
    let contact_ref = lead.contact_name.as_deref().unwrap_or("the team");
    let company_ref = lead.company_name.as_deref().unwrap_or("your company");
    let industry = lead.industry.as_deref().unwrap_or("");
    let industry_key: String = industry.to_lowercase().chars().filter(|c| !c.is_whitespace()).collect();

    match industry_key.as_str() {
        "software" => format!(
            "Hi {contact_ref},\n\nI came across {company_ref} in the software space and was \
             impressed by your work. At {sender_org}, we help software companies optimize \
             their operations and growth. I'd love to explore how we might add value to \
             {company_ref}'s journey.\n\nBest regards,\n{sender_org}"
        ),
        "consulting" => format!(
            "Hi {contact_ref},\n\nI noticed {company_ref} in the consulting field and thought \
             there might be synergies with our work at {sender_org}. We specialize in helping \
             consulting firms enhance their client value proposition. Would you be open to a \
             brief conversation?\n\nBest regards,\n{sender_org}"
        ),
        "ecommerce" => format!(
            "Hi {contact_ref},\n\nI discovered {company_ref} in the e-commerce space and was \
             intrigued by your approach. {sender_org} works with e-commerce businesses to \
             streamline their operations and drive growth. I'd be keen to learn more about \
             your current challenges and see if there's alignment with our expertise.\n\n\
             Best regards,\n{sender_org}"
        ),
        _ => format!(
            "Hi {contact_ref},\n\nI came across {company_ref} in the {industry} space and \
             thought there could be value in a brief conversation. We at {sender_org} work \
             with companies like yours to explore growth and efficiency opportunities.\n\n\
             Best regards,\n{sender_org}"
        ),
    }
}

fn generic_template(lead: &Lead, sender_org: &str) -> String {
    let contact_ref = lead.contact_name.as_deref().unwrap_or("the team");
    let company_ref = lead.company_name.as_deref().unwrap_or("your company");
    format!(
        "Hi {contact_ref},\n\nI discovered {company_ref} and was interested in what you're \
         building. At {sender_org}, we work with innovative companies to help them achieve \
         their growth objectives. I'd love to learn more about your current initiatives and \
         see if there's potential for collaboration.\n\nBest regards,\n{sender_org}"
    )
}

fn website_only_template(lead: &Lead, sender_org: &str) -> String {
    let website = &lead.website;
    let company_ref = lead.company_name.as_deref().unwrap_or("your company");
    format!(
        "Hi team,\n\nI visited {website} and was impressed by {company_ref}'s work. At \
         {sender_org}, we help companies like yours navigate growth challenges and \
         operational efficiencies. I'd be interested in exploring potential synergies.\n\n\
         Best regards,\n{sender_org}"
    )
}

fn make_professional(message: &str, sender_org: &str) -> String {
    let mut out = message.replace("Hi ", "Dear ");
    if !out.contains("Best regards,") {
        out.push_str(&format!("\n\nBest regards,\n{sender_org}"));
    }
    out
}

fn make_friendly(message: &str) -> String {
    let mut out = message.replace("Dear ", "Hi ");
    if out.contains("Best regards,") {
        out = out.replace("Best regards,", "Cheers,");
    }
    out
}

fn make_short(message: &str) -> String {
    let lines: Vec<&str> = message.split('\n').collect();
    if lines.len() > 4 {
        lines[..4].join("\n")
    } else {
        message.to_string()
    }
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
            company_name: None,
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
    fn falls_back_to_website_only_template_without_company_name() {
        let msg = generate_template_message(&lead(), "Our Company");
        assert!(msg.contains("acme.example"));
        assert!(msg.contains("Our Company"));
    }

    #[test]
    fn industry_template_picks_software_variant() {
        let mut l = lead();
        l.company_name = Some("Acme".into());
        l.industry = Some("Software".into());
        let msg = generate_template_message(&l, "Our Company");
        assert!(msg.contains("software space"));
    }

    #[test]
    fn sufficient_data_requires_two_points() {
        let mut l = lead();
        assert!(!has_sufficient_data(&l));
        l.company_name = Some("Acme".into());
        assert!(!has_sufficient_data(&l));
        l.industry = Some("Software".into());
        assert!(has_sufficient_data(&l));
    }

    #[test]
    fn short_style_truncates_to_four_lines() {
        let msg = "a\nb\nc\nd\ne\nf";
        assert_eq!(make_short(msg), "a\nb\nc\nd");
    }

    #[test]
    fn professional_style_appends_signature_when_missing() {
        let msg = make_professional("Hi team,\n\nMessage body.", "Our Company");
        assert!(msg.starts_with("Dear team,"));
        assert!(msg.contains("Best regards,\nOur Company"));
    }

    #[tokio::test]
    async fn generate_message_uses_template_when_llm_unconfigured() {
        let mut l = lead();
        l.company_name = Some("Acme".into());
        l.industry = Some("Software".into());
        let messenger = Messenger::new(
            "Our Company".to_string(),
            LlmClient::new(None, "llama-3.3-70b-versatile".to_string()),
        );
        let msg = messenger.generate_message(&l).await;
        assert!(msg.contains("Acme"));
    }
}
