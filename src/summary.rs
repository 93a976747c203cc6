//! Reshaping of raw upstream records into the dashboard's summaries.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

use crate::parse::{id_string, non_empty_str};

pub const NO_NAME: &str = "no name";

const AVAILABLE_STATUSES: [&str; 2] = ["ONLINE", "AWAY"];

/// Manual-chat load of one agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentLoad {
    pub id: String,
    pub name: Option<String>,
    pub in_progress: u64,
}

impl AgentLoad {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(NO_NAME)
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Aggregate {
    pub agents: Vec<AgentLoad>,
    pub unassigned: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailableUser {
    pub name: Option<String>,
    pub status: Option<String>,
}

/// Groups chats by `currentUser.id`, most loaded agent first.
///
/// `fallback_name` supplies a name for agents whose chats carried none; it is
/// applied before ordering so the sort sees the names that get displayed.
pub fn aggregate_by_user<F>(chats: &[Value], fallback_name: F) -> Aggregate
where
    F: Fn(&str) -> Option<String>,
{
    let mut order: Vec<String> = Vec::new();
    let mut by_id: HashMap<String, AgentLoad> = HashMap::new();
    let mut unassigned = 0;

    for chat in chats {
        let user = chat.get("currentUser");
        let Some(id) = id_string(user.and_then(|u| u.get("id"))) else {
            unassigned += 1;
            continue;
        };
        let name = non_empty_str(user.and_then(|u| u.get("name")));

        let entry = by_id.entry(id.clone()).or_insert_with(|| {
            order.push(id.clone());
            AgentLoad {
                id,
                name: None,
                in_progress: 0,
            }
        });
        entry.in_progress += 1;
        if entry.name.is_none() {
            entry.name = name.map(str::to_string);
        }
    }

    let mut agents: Vec<AgentLoad> = order
        .into_iter()
        .filter_map(|id| by_id.remove(&id))
        .map(|mut agent| {
            if agent.name.is_none() {
                agent.name = fallback_name(&agent.id);
            }
            agent
        })
        .collect();
    agents.sort_by(|a, b| {
        b.in_progress
            .cmp(&a.in_progress)
            .then_with(|| sort_key(a.display_name()).cmp(&sort_key(b.display_name())))
            .then_with(|| a.id.cmp(&b.id))
    });

    Aggregate { agents, unassigned }
}

/// Users of `sector_id` who are ONLINE or AWAY, sorted by name.
pub fn filter_available_users(users: &[Value], sector_id: &str) -> Vec<AvailableUser> {
    let mut kept: Vec<AvailableUser> = users
        .iter()
        .filter(|user| is_available(user) && in_sector(user, sector_id))
        .map(|user| AvailableUser {
            name: user.get("name").and_then(Value::as_str).map(str::to_string),
            status: user.get("status").and_then(Value::as_str).map(str::to_string),
        })
        .collect();

    kept.sort_by_cached_key(|user| sort_key(user.name.as_deref().unwrap_or("")));
    kept
}

pub fn count_online(users: &[Value]) -> usize {
    users
        .iter()
        .filter(|user| status_of(user).is_some_and(|s| s.eq_ignore_ascii_case("ONLINE")))
        .count()
}

fn status_of(user: &Value) -> Option<&str> {
    user.get("status").and_then(Value::as_str)
}

fn is_available(user: &Value) -> bool {
    status_of(user).is_some_and(|status| {
        AVAILABLE_STATUSES
            .iter()
            .any(|allowed| status.eq_ignore_ascii_case(allowed))
    })
}

fn in_sector(user: &Value, sector_id: &str) -> bool {
    user.get("sectors")
        .and_then(Value::as_array)
        .is_some_and(|sectors| {
            sectors
                .iter()
                .any(|sector| id_string(sector.get("id")).as_deref() == Some(sector_id))
        })
}

fn sort_key(name: &str) -> String {
    name.to_lowercase()
}
