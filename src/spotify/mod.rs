//! # Spotify Integration Module
//!
//! Remote metadata for the sync engine: what a playlist or album is called,
//! which tracks it holds, and when it last changed.
//!
//! ```text
//! Sync engine (reconciler, coordinator)
//!          ↓
//! Catalog            - source summaries, track snapshots, user playlists
//!          ↓
//! RemoteGateway      - bounded retry on HTTP 429, Retry-After + 1 waits,
//!                      abort on extreme waits, cursor pagination
//!          ↓
//! SpotifyClient      - bearer-authenticated JSON requests (reqwest)
//!          ↓
//! Spotify Web API
//! ```
//!
//! ## Rate Limiting
//!
//! Every request is wrapped by [`RemoteGateway::call`]. A 429 response with
//! `Retry-After: N` sleeps exactly `N + 1` seconds and retries, up to the
//! configured number of retries. When `N` exceeds the configured ceiling
//! (600 seconds by default) the call fails at once with
//! [`GatewayError::ExtremeRateLimit`]: blocking that long is treated as a
//! condition that needs the user, not a backoff target.
//!
//! ## Authentication
//!
//! Credentials use the client-credentials grant handled by
//! [`crate::management::TokenManager`]; only public playlist and album data
//! is read.

pub mod catalog;
pub mod client;
pub mod gateway;

pub use catalog::{Catalog, SourceSummary, SpotifyCatalog};
pub use client::{ApiError, SpotifyClient};
pub use gateway::{GatewayError, Paginated, RemoteGateway};
