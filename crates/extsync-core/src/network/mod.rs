//! Network access: HTTP client, retries, GitHub releases and remote feeds.

mod client;
mod feeds;
mod github;
mod retry;
mod sources;

pub use client::{extract_domain, HttpClient, RateLimitState};
pub use feeds::{parse_official_feed, RemoteFeeds};
pub use github::{GitHubAsset, GitHubClient, GitHubRelease};
pub use retry::{retry_async, RetryPolicy};
pub use sources::{CommunityEntry, CommunityIndexSource, OfficialFeedSource, ReleaseSource};
