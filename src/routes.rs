//! HTTP surface of the dashboard.
//!
//! Handlers never fail on upstream trouble: each upstream call that goes wrong
//! leaves its field empty and adds a line to the response's `warnings`.

use std::{collections::HashMap, sync::Arc};

use axum::{Json, Router, extract::State, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info};

use crate::{
    config::AppConfig,
    parse::{id_string, non_empty_str},
    summary::{AvailableUser, aggregate_by_user, count_online, filter_available_users},
    time_window::{DayWindow, reference_date, today_window},
    upstream::{ChatStatus, MAX_PAGES, UpstreamClient, UpstreamError},
};

const ENDPOINTS: [&str; 5] = [
    "/",
    "/healthz",
    "/resumo-hoje",
    "/finalizados",
    "/usuarios-online",
];

pub fn router(config: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/healthz", get(healthz))
        .route("/resumo-hoje", get(resumo_hoje))
        .route("/finalizados", get(finalizados))
        .route("/usuarios-online", get(usuarios_online))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(config)
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelInfo {
    pub slug: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SectorInfo {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryPayload {
    pub channel: ChannelInfo,
    pub sector: SectorInfo,
    pub reference_date: String,
    pub online_count: Option<usize>,
    pub counts: StatusCounts,
    pub unassigned: Option<u64>,
    pub users: Vec<UserSummary>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct StatusCounts {
    pub automatic: Option<i64>,
    pub waiting: Option<i64>,
    pub manual: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: String,
    pub name: String,
    pub status: Option<String>,
    pub in_progress_count: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishedPayload {
    pub channel: ChannelInfo,
    pub sector: SectorInfo,
    pub reference_date: String,
    pub window: DayWindow,
    pub finished: Option<i64>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlineUsersPayload {
    pub channel: ChannelInfo,
    pub sector: SectorInfo,
    pub reference_date: String,
    pub total: usize,
    pub users: Vec<AvailableUser>,
    pub warnings: Vec<String>,
}

/// Soft-failure channel for one request.
#[derive(Debug, Default)]
struct Warnings(Vec<String>);

impl Warnings {
    fn record<T>(&mut self, label: &str, outcome: Result<T, UpstreamError>) -> Option<T> {
        match outcome {
            Ok(value) => Some(value),
            Err(err) => {
                self.0.push(format!("{label}: {err}"));
                None
            }
        }
    }

    fn push(&mut self, warning: String) {
        self.0.push(warning);
    }

    fn into_inner(self) -> Vec<String> {
        self.0
    }
}

fn channel_info(config: &AppConfig) -> ChannelInfo {
    ChannelInfo {
        slug: config.channel.slug.clone(),
        name: config.channel.name.clone(),
    }
}

fn sector_info(config: &AppConfig) -> SectorInfo {
    SectorInfo {
        id: config.sector.id.clone(),
        name: config.sector.name.clone(),
    }
}

async fn home(State(config): State<Arc<AppConfig>>) -> Json<Value> {
    Json(json!({
        "status": "dashboard-156 API running",
        "version": env!("CARGO_PKG_VERSION"),
        "channel": channel_info(&config),
        "sector": sector_info(&config),
        "endpoints": ENDPOINTS,
    }))
}

async fn healthz() -> Json<Value> {
    Json(json!({ "ok": true }))
}

async fn resumo_hoje(State(config): State<Arc<AppConfig>>) -> Json<SummaryPayload> {
    Json(build_summary(&config, Utc::now()).await)
}

async fn finalizados(State(config): State<Arc<AppConfig>>) -> Json<FinishedPayload> {
    Json(build_finished(&config, Utc::now()).await)
}

async fn usuarios_online(State(config): State<Arc<AppConfig>>) -> Json<OnlineUsersPayload> {
    Json(build_online_users(&config, Utc::now()).await)
}

pub async fn build_summary(config: &AppConfig, now: DateTime<Utc>) -> SummaryPayload {
    let mut warnings = Warnings::default();
    let mut payload = SummaryPayload {
        channel: channel_info(config),
        sector: sector_info(config),
        reference_date: reference_date(now, config.utc_offset),
        online_count: None,
        counts: StatusCounts::default(),
        unassigned: None,
        users: Vec::new(),
        warnings: Vec::new(),
    };

    let Some(client) = warnings.record("session", UpstreamClient::new(config)) else {
        payload.warnings = warnings.into_inner();
        return payload;
    };

    let users = warnings.record("users", client.fetch_users().await);
    payload.counts.automatic =
        warnings.record("automatic", client.count_chats(ChatStatus::Automatic, None).await);
    payload.counts.waiting =
        warnings.record("waiting", client.count_chats(ChatStatus::Waiting, None).await);
    payload.counts.manual =
        warnings.record("manual", client.count_chats(ChatStatus::Manual, None).await);
    let pages = warnings.record("chats/list", client.list_manual_chats().await);

    payload.online_count = users.as_deref().map(count_online);
    let directory: HashMap<String, &Value> = users
        .iter()
        .flatten()
        .filter_map(|user| id_string(user.get("id")).map(|id| (id, user)))
        .collect();

    if let Some(pages) = pages {
        debug!(pages = pages.pages, chats = pages.chats.len(), "fetched manual chats");
        if pages.truncated {
            warnings.push(format!(
                "chats/list: stopped after {MAX_PAGES} pages while upstream still reported more"
            ));
        }
        let aggregate = aggregate_by_user(&pages.chats, |id| {
            directory
                .get(id)
                .and_then(|user| non_empty_str(user.get("name")))
                .map(str::to_string)
        });
        payload.unassigned = Some(aggregate.unassigned);
        payload.users = aggregate
            .agents
            .into_iter()
            .map(|agent| UserSummary {
                name: agent.display_name().to_string(),
                status: directory
                    .get(&agent.id)
                    .and_then(|user| user.get("status"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
                id: agent.id,
                in_progress_count: agent.in_progress,
            })
            .collect();
    }

    payload.warnings = warnings.into_inner();
    info!(
        agents = payload.users.len(),
        warnings = payload.warnings.len(),
        "built daily summary"
    );
    payload
}

pub async fn build_finished(config: &AppConfig, now: DateTime<Utc>) -> FinishedPayload {
    let mut warnings = Warnings::default();
    let window = today_window(now, config.utc_offset);

    let finished = match warnings.record("session", UpstreamClient::new(config)) {
        Some(client) => warnings.record(
            "finished",
            client
                .count_chats(ChatStatus::Finished, Some(window.clone()))
                .await,
        ),
        None => None,
    };

    FinishedPayload {
        channel: channel_info(config),
        sector: sector_info(config),
        reference_date: reference_date(now, config.utc_offset),
        window,
        finished,
        warnings: warnings.into_inner(),
    }
}

pub async fn build_online_users(config: &AppConfig, now: DateTime<Utc>) -> OnlineUsersPayload {
    let mut warnings = Warnings::default();

    let users = match warnings.record("session", UpstreamClient::new(config)) {
        Some(client) => warnings.record("users", client.fetch_users().await),
        None => None,
    };
    let available = users
        .map(|users| filter_available_users(&users, &config.sector.id))
        .unwrap_or_default();

    OnlineUsersPayload {
        channel: channel_info(config),
        sector: sector_info(config),
        reference_date: reference_date(now, config.utc_offset),
        total: available.len(),
        users: available,
        warnings: warnings.into_inner(),
    }
}
