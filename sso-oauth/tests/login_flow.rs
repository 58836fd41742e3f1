//! End-to-end login against a mock OAuth2 provider served on an ephemeral port

use async_trait::async_trait;
use axum::{
    http::{HeaderMap, StatusCode},
    response::Redirect,
    routing::{get, post},
    Json, Router,
};
use axum_test::TestServer;
use oauth2::url::Url;
use parking_lot::Mutex;
use serde_json::{json, Value};
use sso_oauth::config::{ProfileEndpoint, ProviderSettings};
use sso_oauth::error::GENERIC_FAILURE_BODY;
use sso_oauth::prelude::*;
use std::sync::Arc;

const ACCESS_TOKEN: &str = "token-123";

#[derive(Default)]
struct RecordingHook {
    logins: Mutex<Vec<LocalUserId>>,
}

#[async_trait]
impl LoginHook for RecordingHook {
    async fn on_successful_login(&self, user_id: LocalUserId) -> SsoResult<()> {
        self.logins.lock().push(user_id);
        Ok(())
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == format!("Bearer {ACCESS_TOKEN}"))
}

fn profile_route(body: Value) -> axum::routing::MethodRouter {
    get(move |headers: HeaderMap| {
        let body = body.clone();
        async move {
            if authorized(&headers) {
                Ok(Json(body))
            } else {
                Err(StatusCode::UNAUTHORIZED)
            }
        }
    })
}

async fn spawn_provider() -> String {
    let app = Router::new()
        .route(
            "/oauth/token",
            post(|| async {
                Json(json!({
                    "access_token": ACCESS_TOKEN,
                    "token_type": "bearer",
                    "expires_in": 3600,
                }))
            }),
        )
        .route("/account/user/id", profile_route(json!({"id": 42})))
        .route(
            "/account/user/battletag",
            profile_route(json!({"battletag": "bob#1234"})),
        )
        .route(
            "/wow/user/characters",
            profile_route(json!({"characters": [
                {"name": "Alt", "guild": "Other", "guildRealm": "Stormrage"},
                {"name": "Main", "guild": "Knights", "guildRealm": "Argent Dawn"},
            ]})),
        )
        .route(
            "/broken",
            get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        )
        .route(
            "/moved",
            get(|| async { Redirect::temporary("/account/user/id") }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{addr}")
}

fn config(base: &str) -> SsoConfig {
    let mut config = SsoConfig {
        provider: ProviderSettings {
            authorization_url: format!("{base}/oauth/authorize"),
            token_url: format!("{base}/oauth/token"),
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            endpoints: vec![
                ProfileEndpoint {
                    name: "id".to_string(),
                    url: format!("{base}/account/user/id"),
                },
                ProfileEndpoint {
                    name: "battletag".to_string(),
                    url: format!("{base}/account/user/battletag"),
                },
                ProfileEndpoint {
                    name: "characters".to_string(),
                    url: format!("{base}/wow/user/characters"),
                },
            ],
            ..ProviderSettings::default()
        },
        ..SsoConfig::default()
    };
    config.profile.membership.target = Some("Knights:Argent Dawn".to_string());
    config
}

struct Harness {
    server: TestServer,
    index: MemoryIdentityIndex,
    accounts: MemoryAccountStore,
    hook: Arc<RecordingHook>,
}

fn harness(config: &SsoConfig) -> Harness {
    let index = MemoryIdentityIndex::new();
    let accounts = MemoryAccountStore::new();
    let hook = Arc::new(RecordingHook::default());

    let linker = AccountLinker::new(
        config.provider.name.clone(),
        Arc::new(index.clone()),
        Arc::new(accounts.clone()),
    );
    let normalizer = GuildProfileNormalizer::new(config.profile.clone(), config.grants.clone());
    let state = SsoState::new(config, Arc::new(normalizer), Arc::new(linker), hook.clone()).unwrap();

    Harness {
        server: TestServer::new(router(state)).unwrap(),
        index,
        accounts,
        hook,
    }
}

/// Start a login and return the CSRF state the provider would echo back
async fn begin_login(server: &TestServer) -> String {
    let response = server.get("/auth/bnet").await;
    response.assert_status(StatusCode::SEE_OTHER);

    let location = response.header("location");
    let url = Url::parse(location.to_str().unwrap()).unwrap();
    url.query_pairs()
        .find(|(key, _)| key == "state")
        .map(|(_, value)| value.into_owned())
        .unwrap()
}

#[tokio::test]
async fn test_full_login_creates_member_account() {
    let base = spawn_provider().await;
    let h = harness(&config(&base));

    let state = begin_login(&h.server).await;
    let response = h
        .server
        .get("/auth/bnet/callback")
        .add_query_param("code", "auth-code")
        .add_query_param("state", &state)
        .await;

    response.assert_status(StatusCode::SEE_OTHER);
    assert_eq!(response.header("location").to_str().unwrap(), "/");

    let logins = h.hook.logins.lock().clone();
    assert_eq!(logins.len(), 1);
    let user_id = logins[0];

    assert_eq!(h.index.lookup("bnet", "42").await.unwrap(), Some(user_id));
    let account = h.accounts.account(user_id).await.unwrap();
    assert_eq!(account.username, "bob#1234");
    assert!(account.roles.contains(&RoleTag::new("members")));
    assert_eq!(account.fields.get("bnetId").map(String::as_str), Some("42"));
}

#[tokio::test]
async fn test_second_login_resolves_same_user() {
    let base = spawn_provider().await;
    let h = harness(&config(&base));

    for _ in 0..2 {
        let state = begin_login(&h.server).await;
        h.server
            .get("/auth/bnet/callback")
            .add_query_param("code", "auth-code")
            .add_query_param("state", &state)
            .await
            .assert_status(StatusCode::SEE_OTHER);
    }

    let logins = h.hook.logins.lock().clone();
    assert_eq!(logins.len(), 2);
    assert_eq!(logins[0], logins[1]);
    assert_eq!(h.accounts.account_count().await, 1);
}

#[tokio::test]
async fn test_state_cannot_be_replayed() {
    let base = spawn_provider().await;
    let h = harness(&config(&base));

    let state = begin_login(&h.server).await;
    h.server
        .get("/auth/bnet/callback")
        .add_query_param("code", "auth-code")
        .add_query_param("state", &state)
        .await
        .assert_status(StatusCode::SEE_OTHER);

    let replay = h
        .server
        .get("/auth/bnet/callback")
        .add_query_param("code", "auth-code")
        .add_query_param("state", &state)
        .await;

    replay.assert_status(StatusCode::UNAUTHORIZED);
    replay.assert_text(GENERIC_FAILURE_BODY);
    assert_eq!(h.hook.logins.lock().len(), 1);
}

#[tokio::test]
async fn test_endpoint_failure_aborts_login() {
    let base = spawn_provider().await;
    let mut config = config(&base);
    config.provider.endpoints.push(ProfileEndpoint {
        name: "broken".to_string(),
        url: format!("{base}/broken"),
    });
    let h = harness(&config);

    let state = begin_login(&h.server).await;
    let response = h
        .server
        .get("/auth/bnet/callback")
        .add_query_param("code", "auth-code")
        .add_query_param("state", &state)
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
    response.assert_text(GENERIC_FAILURE_BODY);
    assert!(h.index.is_empty().await);
    assert_eq!(h.accounts.account_count().await, 0);
    assert!(h.hook.logins.lock().is_empty());
}

#[tokio::test]
async fn test_profile_redirect_is_not_followed() {
    let base = spawn_provider().await;
    let mut config = config(&base);
    config.provider.endpoints[0].url = format!("{base}/moved");
    let h = harness(&config);

    let state = begin_login(&h.server).await;
    let response = h
        .server
        .get("/auth/bnet/callback")
        .add_query_param("code", "auth-code")
        .add_query_param("state", &state)
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
    assert!(h.index.is_empty().await);
    assert!(h.hook.logins.lock().is_empty());
}
