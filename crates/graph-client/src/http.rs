use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, COOKIE};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::api::GraphApi;
use crate::types::{
    FollowKind, IdsResponse, LimitStatus, LimitStatusResponse, LookupKey, Page, ReactionKind,
    Relationship, RelationshipResponse, Tweet, User, UsersResponse, CURSOR_INITIAL,
    CURSOR_TERMINAL,
};
use crate::{ApiResponse, GraphError, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.twitter.com/1.1";

/// Relationship flags requested on every call so user records carry
/// `blocking`, `blocked_by`, `muting` and `followed_by`.
const DEFAULT_PARAMS: &[(&str, &str)] = &[
    ("include_profile_interstitial_type", "1"),
    ("include_blocking", "1"),
    ("include_blocked_by", "1"),
    ("include_followed_by", "1"),
    ("include_want_retweets", "1"),
    ("include_mute_edge", "1"),
    ("include_can_dm", "1"),
];

// ─── Credentials / ClientOptions ──────────────────────────────────────────

/// Session material for one logged-in identity.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub bearer_token: String,
    /// `ct0` cookie value, echoed in `x-csrf-token`.
    pub csrf_token: String,
    pub auth_token: String,
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub base_url: String,
    /// Page size for `*/ids` listings.
    pub ids_page_size: u32,
    /// Page size for `*/list` listings.
    pub list_page_size: u32,
    pub search_page_size: u32,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            ids_page_size: 5000,
            list_page_size: 200,
            search_page_size: 20,
        }
    }
}

// ─── HttpGraphClient ──────────────────────────────────────────────────────

/// [`GraphApi`] over the platform's REST endpoints.
///
/// GET parameters go in the query string, POST parameters in a form body.
/// Status 429 becomes [`GraphError::RateLimited`]; every other non-2xx becomes
/// [`GraphError::ApiFail`].
pub struct HttpGraphClient {
    http: reqwest::Client,
    options: ClientOptions,
}

impl HttpGraphClient {
    pub fn new(credentials: &Credentials, options: ClientOptions) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            header_value(&format!("Bearer {}", credentials.bearer_token))?,
        );
        headers.insert("x-csrf-token", header_value(&credentials.csrf_token)?);
        headers.insert("x-twitter-active-user", HeaderValue::from_static("yes"));
        headers.insert(
            "x-twitter-auth-type",
            HeaderValue::from_static("OAuth2Session"),
        );
        headers.insert(
            COOKIE,
            header_value(&format!(
                "auth_token={}; ct0={}",
                credentials.auth_token, credentials.csrf_token
            ))?,
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;
        Ok(Self { http, options })
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.options.base_url.trim_end_matches('/'), path);
        let mut all: Vec<(&str, String)> = DEFAULT_PARAMS
            .iter()
            .filter(|(k, _)| !params.iter().any(|(p, _)| p == k))
            .map(|(k, v)| (*k, v.to_string()))
            .collect();
        all.extend(params.iter().cloned());

        debug!(%method, path, "graph request");
        let builder = if method == Method::GET {
            self.http.get(&url).query(&all)
        } else {
            self.http.request(method, &url).form(&all)
        };
        let response = builder.send().await?;
        classify(path, response).await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let response = self.request(Method::GET, path, params).await?;
        decode(path, response).await
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let response = self.request(Method::POST, path, params).await?;
        decode(path, response).await
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| GraphError::Validation("credential contains invalid header characters".into()))
}

/// Map non-2xx responses onto the error taxonomy.
async fn classify(endpoint: &str, response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let reset_at = response
        .headers()
        .get("x-rate-limit-reset")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<i64>().ok());
    let body = response.text().await.unwrap_or_default();
    let snapshot = ApiResponse {
        status: status.as_u16(),
        endpoint: endpoint.to_string(),
        body,
        reset_at,
    };
    if status == StatusCode::TOO_MANY_REQUESTS {
        Err(GraphError::RateLimited(snapshot))
    } else {
        Err(GraphError::ApiFail(snapshot))
    }
}

async fn decode<T: DeserializeOwned>(endpoint: &str, response: reqwest::Response) -> Result<T> {
    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|source| GraphError::Decode {
        endpoint: endpoint.to_string(),
        source,
    })
}

/// `users/search` is page-numbered; expose it through the cursor contract.
fn search_page_number(cursor: &str) -> Result<u32> {
    if cursor == CURSOR_INITIAL {
        return Ok(1);
    }
    cursor
        .parse::<u32>()
        .ok()
        .filter(|n| *n >= 1)
        .ok_or_else(|| GraphError::Validation(format!("invalid search cursor '{cursor}'")))
}

#[async_trait]
impl GraphApi for HttpGraphClient {
    async fn verify_credentials(&self) -> Result<User> {
        self.get_json("/account/verify_credentials.json", &[]).await
    }

    async fn rate_limit_status(&self) -> Result<LimitStatus> {
        let resp: LimitStatusResponse = self
            .get_json("/application/rate_limit_status.json", &[])
            .await?;
        Ok(resp.resources)
    }

    async fn follow_ids(
        &self,
        kind: FollowKind,
        user_id: &str,
        cursor: &str,
    ) -> Result<Page<String>> {
        let path = format!("/{}/ids.json", kind.as_path());
        let resp: IdsResponse = self
            .get_json(
                &path,
                &[
                    ("user_id", user_id.to_string()),
                    ("stringify_ids", "true".into()),
                    ("count", self.options.ids_page_size.to_string()),
                    ("cursor", cursor.to_string()),
                ],
            )
            .await?;
        Ok(Page {
            next_cursor: resp.next_cursor_str,
            items: resp.ids,
        })
    }

    async fn follow_users(
        &self,
        kind: FollowKind,
        user_id: &str,
        cursor: &str,
    ) -> Result<Page<User>> {
        let path = format!("/{}/list.json", kind.as_path());
        let resp: UsersResponse = self
            .get_json(
                &path,
                &[
                    ("user_id", user_id.to_string()),
                    ("count", self.options.list_page_size.to_string()),
                    ("skip_status", "true".into()),
                    ("include_user_entities", "false".into()),
                    ("cursor", cursor.to_string()),
                ],
            )
            .await?;
        Ok(Page {
            next_cursor: resp.next_cursor_str,
            items: resp.users,
        })
    }

    async fn reaction_ids(
        &self,
        kind: ReactionKind,
        tweet_id: &str,
        cursor: &str,
    ) -> Result<Page<String>> {
        let resp: IdsResponse = self
            .get_json(
                kind.as_path(),
                &[
                    ("id", tweet_id.to_string()),
                    ("stringify_ids", "true".into()),
                    ("count", "100".into()),
                    ("cursor", cursor.to_string()),
                ],
            )
            .await?;
        Ok(Page {
            next_cursor: resp.next_cursor_str,
            items: resp.ids,
        })
    }

    async fn search_users(&self, query: &str, cursor: &str) -> Result<Page<User>> {
        let page = search_page_number(cursor)?;
        let count = self.options.search_page_size;
        let users: Vec<User> = self
            .get_json(
                "/users/search.json",
                &[
                    ("q", query.to_string()),
                    ("page", page.to_string()),
                    ("count", count.to_string()),
                    ("include_entities", "false".into()),
                ],
            )
            .await?;
        let next_cursor = if (users.len() as u32) < count {
            CURSOR_TERMINAL.to_string()
        } else {
            (page + 1).to_string()
        };
        Ok(Page {
            next_cursor,
            items: users,
        })
    }

    async fn users_lookup(&self, key: LookupKey, values: &[String]) -> Result<Vec<User>> {
        self.get_json(
            "/users/lookup.json",
            &[(key.as_param(), values.join(","))],
        )
        .await
    }

    async fn user_by_id(&self, user_id: &str) -> Result<User> {
        self.get_json(
            "/users/show.json",
            &[
                ("user_id", user_id.to_string()),
                ("skip_status", "true".into()),
                ("include_entities", "false".into()),
            ],
        )
        .await
    }

    async fn user_by_name(&self, screen_name: &str) -> Result<User> {
        self.get_json(
            "/users/show.json",
            &[
                ("screen_name", screen_name.to_string()),
                ("skip_status", "true".into()),
                ("include_entities", "false".into()),
            ],
        )
        .await
    }

    async fn tweet_by_id(&self, tweet_id: &str) -> Result<Tweet> {
        self.get_json(
            "/statuses/show.json",
            &[
                ("id", tweet_id.to_string()),
                ("tweet_mode", "extended".into()),
                ("include_entities", "true".into()),
            ],
        )
        .await
    }

    async fn relationship(&self, source_id: &str, target_id: &str) -> Result<Relationship> {
        let resp: RelationshipResponse = self
            .get_json(
                "/friendships/show.json",
                &[
                    ("source_id", source_id.to_string()),
                    ("target_id", target_id.to_string()),
                ],
            )
            .await?;
        Ok(resp.relationship)
    }

    async fn block_user(&self, user_id: &str) -> Result<User> {
        self.post_json(
            "/blocks/create.json",
            &[
                ("user_id", user_id.to_string()),
                ("include_entities", "false".into()),
                ("skip_status", "true".into()),
            ],
        )
        .await
    }

    async fn unblock_user(&self, user_id: &str) -> Result<User> {
        self.post_json(
            "/blocks/destroy.json",
            &[
                ("user_id", user_id.to_string()),
                ("include_entities", "false".into()),
                ("skip_status", "true".into()),
            ],
        )
        .await
    }

    async fn mute_user(&self, user_id: &str) -> Result<User> {
        self.post_json("/mutes/users/create.json", &[("user_id", user_id.to_string())])
            .await
    }

    async fn unmute_user(&self, user_id: &str) -> Result<User> {
        self.post_json("/mutes/users/destroy.json", &[("user_id", user_id.to_string())])
            .await
    }
}
