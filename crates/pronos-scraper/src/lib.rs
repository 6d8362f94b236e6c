pub mod error;
pub mod extract;
pub mod fetcher;
pub mod rate_limit;
pub mod registry;
pub mod retry;
pub mod urls;

pub use error::{ExtractError, RegistryError, ScraperError};
pub use extract::{
    Extraction, Extractor, FixturesExtractor, MatchStatsExtractor, WagesExtractor,
};
pub use fetcher::{paced_fetch, Document, Fetch, FetchResult, Fetcher};
pub use rate_limit::RateLimiter;
pub use registry::TeamRegistry;
pub use retry::{RetryPolicy, RetryState};
