use std::sync::Arc;
use std::time::Duration;

use graph_client::paging::{FollowIds, Hydrator, Paginator, PagingOptions};
use graph_client::{ClientOptions, Credentials, FollowKind, GraphApi, GraphError, HttpGraphClient};
use mockito::{Matcher, Server};

fn client(server: &Server) -> HttpGraphClient {
    let creds = Credentials {
        bearer_token: "bearer".into(),
        csrf_token: "csrf".into(),
        auth_token: "auth".into(),
    };
    let options = ClientOptions {
        base_url: server.url(),
        ..ClientOptions::default()
    };
    HttpGraphClient::new(&creds, options).unwrap()
}

fn user_json(id: &str, name: &str) -> String {
    format!(r#"{{"id_str":"{id}","screen_name":"{name}","blocking":false}}"#)
}

#[tokio::test]
async fn follow_ids_sends_cursor_and_credentials() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/followers/ids.json")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("user_id".into(), "12".into()),
            Matcher::UrlEncoded("cursor".into(), "-1".into()),
            Matcher::UrlEncoded("include_blocked_by".into(), "1".into()),
        ]))
        .match_header("x-csrf-token", "csrf")
        .match_header("authorization", "Bearer bearer")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"ids":["1","2"],"next_cursor_str":"0"}"#)
        .create_async()
        .await;

    let page = client(&server)
        .follow_ids(FollowKind::Followers, "12", "-1")
        .await
        .unwrap();
    assert_eq!(page.items, vec!["1", "2"]);
    assert!(page.is_last());
    mock.assert_async().await;
}

#[tokio::test]
async fn status_429_is_rate_limited_with_reset() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/users/show.json")
        .match_query(Matcher::Any)
        .with_status(429)
        .with_header("x-rate-limit-reset", "1700000000")
        .with_body(r#"{"errors":[{"code":88,"message":"Rate limit exceeded"}]}"#)
        .create_async()
        .await;

    let err = client(&server).user_by_name("someone").await.unwrap_err();
    let GraphError::RateLimited(resp) = err else {
        panic!("expected RateLimited, got {err:?}");
    };
    assert_eq!(resp.status, 429);
    assert_eq!(resp.reset_at, Some(1_700_000_000));
    assert!(resp.body.contains("Rate limit exceeded"));
}

#[tokio::test]
async fn other_non_2xx_is_api_fail() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/blocks/create.json")
        .with_status(403)
        .with_body("forbidden")
        .create_async()
        .await;

    let err = client(&server).block_user("42").await.unwrap_err();
    assert!(matches!(err, GraphError::ApiFail(ref r) if r.status == 403));
    assert!(!err.is_rate_limited());
}

#[tokio::test]
async fn block_posts_user_id_as_form() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/blocks/create.json")
        .match_body(Matcher::UrlEncoded("user_id".into(), "42".into()))
        .with_status(200)
        .with_body(r#"{"id_str":"42","screen_name":"target","blocking":true}"#)
        .create_async()
        .await;

    let user = client(&server).block_user("42").await.unwrap();
    assert!(user.blocking);
    mock.assert_async().await;
}

#[tokio::test]
async fn oversized_lookup_fails_before_any_request() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/users/lookup.json")
        .match_query(Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let ids: Vec<String> = (0..101).map(|i| i.to_string()).collect();
    let err = client(&server).lookup_users_by_ids(&ids).await.unwrap_err();
    assert!(matches!(err, GraphError::Validation(_)));
    let empty = client(&server).lookup_users_by_ids(&[]).await.unwrap();
    assert!(empty.is_empty());
    mock.assert_async().await;
}

#[tokio::test]
async fn malformed_body_is_decode_error() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/account/verify_credentials.json")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body("not json")
        .create_async()
        .await;

    let err = client(&server).verify_credentials().await.unwrap_err();
    assert!(matches!(err, GraphError::Decode { .. }));
}

#[tokio::test]
async fn paginated_ids_are_hydrated_through_lookup() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/friends/ids.json")
        .match_query(Matcher::UrlEncoded("cursor".into(), "-1".into()))
        .with_status(200)
        .with_body(r#"{"ids":["1","2"],"next_cursor_str":"77"}"#)
        .create_async()
        .await;
    server
        .mock("GET", "/friends/ids.json")
        .match_query(Matcher::UrlEncoded("cursor".into(), "77".into()))
        .with_status(200)
        .with_body(r#"{"ids":["3"],"next_cursor_str":"0"}"#)
        .create_async()
        .await;
    let lookup = server
        .mock("GET", "/users/lookup.json")
        .match_query(Matcher::UrlEncoded("user_id".into(), "1,2,3".into()))
        .with_status(200)
        .with_body(format!(
            "[{},{},{}]",
            user_json("1", "a"),
            user_json("2", "b"),
            user_json("3", "c")
        ))
        .create_async()
        .await;

    let api: Arc<dyn GraphApi> = Arc::new(client(&server));
    let source = FollowIds {
        api: api.clone(),
        kind: FollowKind::Friends,
        user_id: "12".into(),
    };
    let options = PagingOptions {
        delay: Duration::ZERO,
        max_retries: None,
    };
    let mut users = Hydrator::new(Paginator::new(source, options), api);
    let mut names = Vec::new();
    while let Some(user) = users.next_user().await {
        names.push(user.unwrap().screen_name);
    }
    assert_eq!(names, vec!["a", "b", "c"]);
    lookup.assert_async().await;
}
