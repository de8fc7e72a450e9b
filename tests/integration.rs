//! Integration tests exercising the pipeline modules end-to-end against
//! mocked HTTP fixtures, mirroring the teacher's `tests/integration.rs`
//! style but without requiring Postgres: the Repository and Quota Gate
//! need a live database and are covered by their own `#[cfg(test)]`
//! modules instead.
//!
//! **Requirements:** none — the scraper tests spin up an in-process
//! `wiremock` server and nothing else talks over the network.

mod scraper_tiers {
    use leadforge::domain::DataSource;
    use leadforge::scraping::TieredScraper;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn scraper() -> TieredScraper {
        TieredScraper::new(Duration::from_secs(10), None)
    }

    /// A page with a rich JSON-LD `Organization` block clears the tier-1
    /// gate (confidence > 0.7) and the meta/fallback tiers never run —
    /// spec.md §4.1's "stop at first tier whose result meets its gate".
    #[tokio::test]
    async fn json_ld_tier_wins_when_sufficiently_confident() {
        let server = MockServer::start().await;
        let body = r#"
            <html><head>
            <script type="application/ld+json">
            {
                "@context": "https://schema.org",
                "@type": "Organization",
                "name": "Acme Corp",
                "legalName": "Acme Corporation",
                "description": "We build things",
                "url": "https://acme.example",
                "email": "hello@acme.example",
                "address": {"streetAddress": "1 Main St", "addressLocality": "Springfield"},
                "foundingDate": "2014-01-01"
            }
            </script>
            <title>Acme Corp — Home</title>
            </head><body>hello</body></html>
        "#;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let result = scraper().scrape(&server.uri()).await;

        assert!(result.success);
        assert_eq!(result.method, DataSource::JsonLd);
        assert!(result.confidence > 0.7, "confidence was {}", result.confidence);
        assert_eq!(result.data.get("name").unwrap(), "Acme Corp");
        assert_eq!(
            result.data.get("address_streetAddress").unwrap(),
            "1 Main St"
        );
    }

    /// No JSON-LD present, but `og:*`/`twitter:*` meta tags are: tier 1
    /// fails over cleanly and tier 2 fires, still before any fallback.
    #[tokio::test]
    async fn falls_through_to_meta_tier_without_json_ld() {
        let server = MockServer::start().await;
        let body = r#"
            <html><head>
                <title>Widgets Inc</title>
                <meta name="description" content="We make widgets for everyone">
                <meta property="og:title" content="Widgets Inc">
                <meta property="og:description" content="Best widgets around">
                <meta property="og:image" content="https://widgets.example/logo.png">
            </head><body>
                <a href="https://partner.example/a">partner</a>
            </body></html>
        "#;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let result = scraper().scrape(&server.uri()).await;

        assert!(result.success);
        assert_eq!(result.method, DataSource::StructuredData);
        assert!(result.confidence > 0.5, "confidence was {}", result.confidence);
        assert_eq!(result.data.get("title").unwrap(), "Widgets Inc");
    }

    /// An empty page with no headless browser configured exercises the
    /// plain-request fallback tier; it may still fail to extract
    /// anything meaningful, but the call must not panic or hang.
    #[tokio::test]
    async fn falls_back_to_plain_request_without_webdriver() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html><body></body></html>"))
            .mount(&server)
            .await;

        let result = scraper().scrape(&server.uri()).await;

        assert_eq!(result.method, DataSource::Requests);
    }

    /// A 404 fails every tier; the pipeline must report failure rather
    /// than panicking, per spec.md §4.1's "any tier may fail... failures
    /// are recorded but do not abort the pipeline".
    #[tokio::test]
    async fn all_tiers_fail_gracefully_on_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let result = scraper().scrape(&server.uri()).await;

        assert!(!result.success);
        assert_eq!(result.method, DataSource::Requests);
        assert!(result.error_message.is_some());
    }
}

mod pipeline_composition {
    use chrono::Utc;
    use leadforge::domain::Lead;
    use leadforge::enrichment::{NullExternalProvider, WaterfallEnricher};
    use leadforge::llm::LlmClient;
    use leadforge::messaging::{MessageStyle, Messenger};
    use leadforge::scoring::Scorer;
    use std::collections::HashMap;

    fn empty_lead() -> Lead {
        Lead {
            id: 1,
            organization_id: 1,
            owner_id: 1,
            company_name: None,
            website: "https://example.com".into(),
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

    /// Scenario 5 from spec.md §8: scraped free text describing a
    /// 120-person SaaS company founded in 2014, no external API or LLM
    /// credential configured, is resolved entirely by the heuristic
    /// strategy with confidence > 0.7.
    #[tokio::test]
    async fn enrichment_waterfall_resolves_heuristically_from_scraped_text() {
        let enricher = WaterfallEnricher::new(
            Box::new(NullExternalProvider),
            LlmClient::new(None, "llama-3.3-70b-versatile".to_string()),
        );
        let lead = empty_lead();
        let mut scraped = HashMap::new();
        scraped.insert(
            "text_content".to_string(),
            "We are a 120 person team building a SaaS platform, founded in 2014".to_string(),
        );

        let result = enricher
            .enrich_lead_data(&lead, &scraped)
            .await
            .expect("heuristic strategy should resolve this text");

        assert!(result.confidence > 0.7, "confidence was {}", result.confidence);
        assert_eq!(result.data.get("industry").unwrap(), "Software");
        assert_eq!(result.data.get("employees").unwrap(), "51-200");
        assert_eq!(result.data.get("revenue_band").unwrap(), "$10M-50M");
        assert_eq!(result.data.get("founded_year").unwrap(), "2014");
    }

    /// A thin lead (scenario 6 from spec.md §8) is wired through
    /// enrichment (no-op, nothing to infer) straight into the scorer and
    /// messenger, confirming the whole non-scraping half of the pipeline
    /// composes without ever inventing data the lead doesn't have.
    #[tokio::test]
    async fn thin_lead_scores_low_and_gets_website_only_outreach() {
        let lead = empty_lead();

        let score = Scorer::with_default_criteria().score_lead(&lead);
        assert!((0.0..100.0).contains(&score.total_score));
        assert!(score.total_score < 40.0, "expected a disqualifying score for a bare website");

        let messenger = Messenger::new(
            "Acme Sales".to_string(),
            LlmClient::new(None, "llama-3.3-70b-versatile".to_string()),
        );
        let message = messenger
            .generate_message_with_style(&lead, MessageStyle::Professional)
            .await;

        assert!(message.contains("example.com"));
        assert!(!message.to_lowercase().contains("saas"));
        assert!(!message.to_lowercase().contains("industry:"));
    }
}
