//! Common test utilities for profile-extract integration tests
//!
//! One wiremock server plays both the profile website and the
//! OpenAI-compatible model endpoint. Judge calls are told apart from
//! extraction calls by the `<field>_status` keys in the judge prompt.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use profile_extract::config::{FetchConfig, ModelConfig, ReduceConfig};
use profile_extract::{
    ChatClient, Config, FieldName, HtmlReducer, HttpFetcher, ItemPipeline, LlmExtractor, LlmJudge,
    RetryConfig,
};
use serde_json::{Value, json};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// API key handed to the mock model endpoint
pub const TEST_API_KEY: &str = "test-key";

/// Profile page with a main container and some boilerplate around it
pub fn profile_html(name: &str, email: &str) -> String {
    format!(
        r#"<html>
<head><title>{name}</title><style>body {{ color: red; }}</style></head>
<body>
  <nav><a href="/">Home</a> | <a href="/people">People</a></nav>
  <main>
    <h1>{name}</h1>
    <p>Professor, Department of Chemistry</p>
    <p>Email: {email}</p>
    <p>Ph.D., University of Idaho, 1999</p>
  </main>
  <footer>Copyright University</footer>
</body>
</html>"#
    )
}

/// Page whose only content is script, which reduces to nothing
pub const SCRIPT_ONLY_HTML: &str =
    "<html><body><script>window.location = '/elsewhere';</script></body></html>";

/// Test configuration pointing every endpoint at `server`
pub fn test_config(server: &MockServer) -> Config {
    Config {
        fetch: FetchConfig {
            request_delay: Duration::ZERO,
            timeout: Duration::from_secs(5),
            ..Default::default()
        },
        retry: RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
            jitter: false,
        },
        reduce: ReduceConfig::default(),
        models: ModelConfig {
            base_url: server.uri(),
            timeout: Duration::from_secs(5),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Pipeline built from real stage implementations against the mock server
pub fn build_pipeline(config: &Config, api_key: Option<&str>) -> ItemPipeline {
    let client = ChatClient::new(
        api_key.map(str::to_string),
        &config.models,
        config.pricing.clone(),
    )
    .expect("chat client");

    ItemPipeline::new(
        Arc::new(HttpFetcher::new(&config.fetch).expect("http fetcher")),
        Arc::new(HtmlReducer::new(&config.reduce)),
        Arc::new(LlmExtractor::new(client.clone(), &config.models)),
        Arc::new(LlmJudge::new(client, &config.models)),
        config.retry.clone(),
    )
}

/// Chat completion envelope around `content`
pub fn completion(content: &Value, prompt_tokens: u64, completion_tokens: u64) -> Value {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content.to_string() },
            "finish_reason": "stop"
        }],
        "usage": {
            "prompt_tokens": prompt_tokens,
            "completion_tokens": completion_tokens,
            "total_tokens": prompt_tokens + completion_tokens
        }
    })
}

/// Judge reply giving every field the same status
pub fn judge_reply(status: &str) -> Value {
    let mut reply = serde_json::Map::new();
    for field in FieldName::ALL {
        reply.insert(format!("{}_status", field), json!(status));
    }
    reply.insert("overall_comment".to_string(), json!("Looks consistent."));
    Value::Object(reply)
}

/// Serve an HTML page at `route`
pub async fn mount_page(server: &MockServer, route: &str, html: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string(html))
        .mount(server)
        .await;
}

/// Answer GETs on `route` with a bare status
pub async fn mount_status(server: &MockServer, route: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

/// Answer judge calls with `reply`
pub async fn mount_judge(server: &MockServer, reply: Value) {
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("first_name_status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(&reply, 400, 120)))
        .with_priority(2)
        .mount(server)
        .await;
}

/// Answer every other model call (extraction) with `record`
pub async fn mount_extractor(server: &MockServer, record: Value) {
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(&record, 1000, 200)))
        .with_priority(3)
        .mount(server)
        .await;
}
