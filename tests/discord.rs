// weather_digest - Daily Open-Meteo forecast digests for Discord
//
// Copyright 2026 The weather_digest authors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use reqwest::{Client, Url};
use serde_json::{json, Value};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use weather_digest::chat::{ChatError, DiscordClient, MessageSink};

const TOKEN: &str = "test-token";
const CHANNEL: u64 = 42;

#[derive(Default)]
struct FakeDiscord {
    posted: Mutex<Vec<String>>,
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bot {}", TOKEN))
        .unwrap_or(false)
}

async fn me(headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    Json(json!({ "id": "1001", "username": "tenki", "discriminator": "0" })).into_response()
}

async fn channel(headers: HeaderMap, Path(id): Path<u64>) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    if id != CHANNEL {
        return StatusCode::NOT_FOUND.into_response();
    }

    Json(json!({ "id": id.to_string(), "name": "weather", "type": 0 })).into_response()
}

async fn messages(
    State(fake): State<Arc<FakeDiscord>>,
    headers: HeaderMap,
    Path(id): Path<u64>,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    if id != CHANNEL {
        return StatusCode::NOT_FOUND.into_response();
    }

    let content = body["content"].as_str().unwrap_or_default().to_owned();
    fake.posted.lock().unwrap().push(content);
    Json(json!({ "id": "2002", "channel_id": id.to_string() })).into_response()
}

fn serve(fake: Arc<FakeDiscord>) -> Url {
    let app = Router::new()
        .route("/api/v10/users/@me", get(me))
        .route("/api/v10/channels/:id", get(channel))
        .route("/api/v10/channels/:id/messages", post(messages))
        .with_state(fake);

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(axum::Server::from_tcp(listener).unwrap().serve(app.into_make_service()));

    Url::parse(&format!("http://{}/api/v10/", addr)).unwrap()
}

#[tokio::test]
async fn login_and_channel_lookup() {
    let base = serve(Arc::default());
    let client = DiscordClient::new(Client::new(), base, TOKEN, CHANNEL);

    let user = client.current_user().await.unwrap();
    assert_eq!(user.username, "tenki");

    let channel = client.channel().await.unwrap();
    assert_eq!(channel.id, "42");
    assert_eq!(channel.name.as_deref(), Some("weather"));
}

#[tokio::test]
async fn rejected_token() {
    let base = serve(Arc::default());
    let client = DiscordClient::new(Client::new(), base, "wrong", CHANNEL);

    assert!(matches!(client.current_user().await, Err(ChatError::InvalidToken)));
}

#[tokio::test]
async fn unknown_channel() {
    let base = serve(Arc::default());
    let client = DiscordClient::new(Client::new(), base, TOKEN, 7);

    assert!(matches!(client.channel().await, Err(ChatError::InvalidChannel(7))));
    assert!(matches!(client.send("hello").await, Err(ChatError::InvalidChannel(7))));
}

#[tokio::test]
async fn messages_are_posted_verbatim() {
    let fake = Arc::new(FakeDiscord::default());
    let client = DiscordClient::new(Client::new(), serve(fake.clone()), TOKEN, CHANNEL);

    let digest = "東京\n最高気温 : 21.3度\n最低気温 : 14.0度\n雨が降りそうな時間帯 : 9:00 \n";
    client.send("Botが起動しました").await.unwrap();
    client.send(digest).await.unwrap();

    assert_eq!(
        *fake.posted.lock().unwrap(),
        vec!["Botが起動しました".to_owned(), digest.to_owned()]
    );
}

#[tokio::test]
async fn missing_user_endpoint_is_not_a_channel_error() {
    // Wrong API version prefix: every route 404s.
    let base = serve(Arc::default()).join("../v9/").unwrap();
    let client = DiscordClient::new(Client::new(), base, TOKEN, CHANNEL);

    match client.current_user().await {
        Err(ChatError::Unexpected(status, url)) => {
            assert_eq!(status, StatusCode::NOT_FOUND);
            assert!(url.path().ends_with("/api/v9/users/@me"));
        }
        other => panic!("unexpected result {:?}", other),
    }
}
