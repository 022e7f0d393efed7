//! algod v1 REST client backed by `reqwest`.
//!
//! | operation              | request                                      |
//! |------------------------|----------------------------------------------|
//! | `current_round`        | `GET /v1/status`                             |
//! | `wait_for_round_after` | `GET /v1/status/wait-for-block-after/{round}`|
//! | `block_info`           | `GET /v1/block/{round}`                      |
//! | `block_raw`            | `GET /v1/block/{round}?raw=1`                |

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::time::Duration;

use chainfollow_core::{FollowError, NodeClient, RawResponse, Round};

use crate::config::{AlgodAuth, AlgodConfig, TOKEN_HEADER};

#[derive(Debug, Deserialize)]
struct NodeStatus {
    #[serde(rename = "lastRound")]
    last_round: Round,
}

pub struct AlgodClient {
    address: String,
    auth: AlgodAuth,
    http: reqwest::Client,
    request_timeout: Duration,
}

impl AlgodClient {
    pub fn new(config: AlgodConfig) -> Result<Self, FollowError> {
        config.auth.validate()?;
        // timeouts are per request so the long-poll can stay unbounded
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| FollowError::Config(format!("failed to build http client: {e}")))?;
        Ok(Self {
            address: config.address,
            auth: config.auth,
            http,
            request_timeout: config.request_timeout,
        })
    }

    /// A GET bounded by the request timeout.
    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.long_poll(path).timeout(self.request_timeout)
    }

    /// A GET with no client-side timeout.
    fn long_poll(&self, path: &str) -> reqwest::RequestBuilder {
        let req = self.http.get(format!("{}/v1{path}", self.address));
        match &self.auth {
            AlgodAuth::None => req,
            AlgodAuth::Token(token) => req.header(TOKEN_HEADER, token),
            AlgodAuth::Header { name, value } => req.header(name.as_str(), value.as_str()),
        }
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response, FollowError> {
        let resp = req.send().await.map_err(|e| self.transport_error(e))?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(FollowError::Transport(format!("HTTP {status}: {}", body.trim())));
        }
        Ok(resp)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<T, FollowError> {
        let resp = self.send(req).await?;
        resp.json::<T>().await.map_err(|e| self.transport_error(e))
    }

    fn transport_error(&self, e: reqwest::Error) -> FollowError {
        if e.is_timeout() {
            FollowError::Timeout {
                ms: self.request_timeout.as_millis() as u64,
            }
        } else {
            FollowError::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl NodeClient for AlgodClient {
    async fn current_round(&self) -> Result<Round, FollowError> {
        let status: NodeStatus = self.get_json(self.get("/status")).await?;
        Ok(status.last_round)
    }

    async fn block_raw(&self, round: Round) -> Result<RawResponse, FollowError> {
        let req = self.get(&format!("/block/{round}")).query(&[("raw", "1")]);
        let resp = self.send(req).await?;
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = resp.bytes().await.map_err(|e| self.transport_error(e))?;
        Ok(RawResponse {
            content_type,
            body: body.to_vec(),
        })
    }

    async fn block_info(&self, round: Round) -> Result<JsonValue, FollowError> {
        self.get_json(self.get(&format!("/block/{round}"))).await
    }

    async fn wait_for_round_after(&self, round: Round) -> Result<Round, FollowError> {
        let status: NodeStatus = self
            .get_json(self.long_poll(&format!("/status/wait-for-block-after/{round}")))
            .await?;
        tracing::debug!(after = round, last_round = status.last_round, "wait-for-block-after returned");
        Ok(status.last_round)
    }

    fn name(&self) -> &str {
        &self.address
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_last_round() {
        let s: NodeStatus =
            serde_json::from_str(r#"{"lastRound": 1234, "lastConsensusVersion": "v1"}"#).unwrap();
        assert_eq!(s.last_round, 1234);
    }

    #[tokio::test]
    async fn unreachable_node_is_retryable() {
        // port 9 (discard) is closed on test machines
        let client = AlgodClient::new(
            AlgodConfig::new("127.0.0.1:9", AlgodAuth::Token("t".into()))
                .with_timeout(Duration::from_secs(2)),
        )
        .unwrap();
        let err = client.current_round().await.unwrap_err();
        assert!(err.is_retryable(), "unexpected error: {err}");
        assert_eq!(client.name(), "http://127.0.0.1:9");
    }

    #[test]
    fn invalid_auth_is_rejected_at_construction() {
        let config = AlgodConfig::new(
            "127.0.0.1:9",
            AlgodAuth::Header {
                name: "X Bad".into(),
                value: "v".into(),
            },
        );
        assert!(matches!(AlgodClient::new(config), Err(FollowError::Config(_))));
    }

    #[tokio::test]
    async fn only_the_long_poll_outlives_the_request_timeout() {
        // accepts connections and never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let client = AlgodClient::new(
            AlgodConfig::new(addr.to_string(), AlgodAuth::None)
                .with_timeout(Duration::from_millis(200)),
        )
        .unwrap();

        let err = client.current_round().await.unwrap_err();
        assert!(matches!(err, FollowError::Timeout { ms: 200 }), "unexpected error: {err}");

        let wait = tokio::time::timeout(Duration::from_secs(1), client.wait_for_round_after(5)).await;
        assert!(wait.is_err(), "long-poll was cut short: {wait:?}");
    }
}
