//! `graph-client`: typed access to the social-graph REST API.
//!
//! # Architecture
//!
//! ```text
//! GraphApi (trait)      ← one request per method, one identity per instance
//!     │
//!     ├── HttpGraphClient  ← reqwest; 429 → RateLimited, other non-2xx → ApiFail
//!     │
//!     ▼
//! PageSource            ← one cursor-addressed listing (ids, users, search)
//!     │
//!     ▼
//! Paginator             ← "-1" … "0", fixed delay, retry-on-same-cursor
//!     │
//!     ▼
//! Hydrator              ← ids → users in lookup batches of ≤100
//! ```
//!
//! # Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use graph_client::{
//!     paging::{FollowIds, Paginator, PagingOptions},
//!     ClientOptions, Credentials, FollowKind, HttpGraphClient,
//! };
//!
//! let api = Arc::new(HttpGraphClient::new(&creds, ClientOptions::default())?);
//! let source = FollowIds { api, kind: FollowKind::Followers, user_id: "12".into() };
//! let mut ids = Paginator::new(source, PagingOptions::default());
//! while let Some(item) = ids.next_item().await {
//!     println!("{}", item?);
//! }
//! ```

pub mod api;
pub mod error;
pub mod http;
pub mod paging;
pub mod types;


pub use api::{prepare_lookup, GraphApi};
pub use error::{ApiResponse, GraphError};
pub use http::{ClientOptions, Credentials, HttpGraphClient, DEFAULT_BASE_URL};
pub use paging::{Hydrator, PageSource, Paginator, PagingOptions};
pub use types::{
    FollowKind, LastStatus, Limit, LimitStatus, LookupKey, Page, ReactionKind, Relationship,
    Tweet, TweetEntities, User, UserMention, CURSOR_INITIAL, CURSOR_TERMINAL, LOOKUP_BATCH_LIMIT,
};

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, GraphError>;
