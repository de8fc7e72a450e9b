use clap::{Parser, Subcommand};

/// leadforge — lead scraping, enrichment, scoring and outreach pipeline
#[derive(Parser)]
#[command(name = "leadforge", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the API server and the pipeline worker pool
    Serve {
        /// Port to bind
        #[arg(short, long, default_value = "8000")]
        port: u16,
    },

    /// Run database migrations and exit
    Migrate,

    /// Run the pipeline worker pool without the HTTP API
    Worker {
        /// Number of concurrent workers
        #[arg(short, long)]
        count: Option<usize>,
    },

    /// Load the configured plan tiers into the database
    SeedPlans,

    /// Issue a service-to-service API key for an organization
    IssueKey {
        /// Organization id to issue the key for
        #[arg(long)]
        org: i64,

        /// User id the key is attributed to
        #[arg(long)]
        user: i64,

        /// Label for the key
        #[arg(long)]
        name: String,
    },
}
