//! # Race Service Module
//!
//! Client for the Virtual Loup de Mer web services.
//!
//! This module handles:
//! - Authenticated form-encoded POST requests (HTTP Basic)
//! - Fetching our boat state and race rankings
//! - Submitting waypoint changes
//! - Mapping HTTP failures and unexpected bodies to error types

pub mod protocol;
pub mod service;

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use crate::config::{AccountConfig, ServiceConfig};
use crate::error::{Result, VlmBridgeError};
use crate::nav::geo::Position;
use protocol::{parse_body, target_set_parms, BoatInfo, RankingResponse, TargetAck};
pub use service::RaceService;

/// Boat state endpoint
const BOAT_INFO_PATH: &str = "/ws/boatinfo.php";

/// Race ranking endpoint
const RANKING_PATH: &str = "/ws/raceinfo/ranking.php";

/// Waypoint setting endpoint
const TARGET_SET_PATH: &str = "/ws/boatsetup/target_set.php";

/// HTTP client for the race service
pub struct VlmClient {
    http: reqwest::Client,
    base_url: String,
    login: String,
    password: String,
    boat_id: u64,
}

impl std::fmt::Debug for VlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VlmClient")
            .field("base_url", &self.base_url)
            .field("login", &self.login)
            .field("boat_id", &self.boat_id)
            .finish_non_exhaustive()
    }
}

impl VlmClient {
    /// Build a client from configuration
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be initialised
    pub fn new(account: &AccountConfig, service: &ServiceConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(service.timeout_ms))
            .user_agent(format!("vlm-bridge/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: service.base_url.trim_end_matches('/').to_string(),
            login: account.login.clone(),
            password: account.password.clone(),
            boat_id: account.boat_id,
        })
    }

    /// Boat this client acts for
    pub fn boat_id(&self) -> u64 {
        self.boat_id
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// POST a form and return the body of a successful response
    async fn post_form(&self, path: &str, form: &[(&str, String)]) -> Result<Vec<u8>> {
        let url = self.url(path);
        debug!("POST {}", url);

        let resp = self
            .http
            .post(&url)
            .basic_auth(&self.login, Some(&self.password))
            .form(form)
            .send()
            .await?;

        check_status(resp.status())?;

        let body = resp.bytes().await?;
        debug!("Received {} bytes from {}", body.len(), path);
        Ok(body.to_vec())
    }
}

/// Map a non-success status to a transport error
fn check_status(status: reqwest::StatusCode) -> Result<()> {
    if status.is_success() {
        return Ok(());
    }
    Err(VlmBridgeError::Transport {
        status: status.as_u16(),
        reason: status.canonical_reason().unwrap_or("").to_string(),
    })
}

#[async_trait]
impl RaceService for VlmClient {
    async fn boat_info(&self) -> Result<BoatInfo> {
        let body = self
            .post_form(
                BOAT_INFO_PATH,
                &[("forcefmt", "json".to_string()), ("select_idu", self.boat_id.to_string())],
            )
            .await?;
        parse_body("boat info", &body)
    }

    async fn ranking(&self, race_id: &str) -> Result<RankingResponse> {
        let body = self
            .post_form(
                RANKING_PATH,
                &[("forcefmt", "json".to_string()), ("idr", race_id.to_string())],
            )
            .await?;
        parse_body("ranking", &body)
    }

    async fn set_target(&self, target: Position) -> Result<TargetAck> {
        let parms = target_set_parms(self.boat_id, target);
        debug!("New waypoint parms: {}", parms);

        let body = self
            .post_form(
                TARGET_SET_PATH,
                &[
                    ("forcefmt", "json".to_string()),
                    ("select_idu", self.boat_id.to_string()),
                    ("parms", parms),
                ],
            )
            .await?;

        let mut ack: TargetAck = parse_body("target set", &body)?;
        ack.raw = String::from_utf8_lossy(&body).into_owned();
        Ok(ack)
    }
}
