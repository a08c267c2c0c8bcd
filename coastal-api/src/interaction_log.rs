//! Admin interaction log.
//!
//! Records every user/chatbot exchange keyed by client IP so administrators
//! can review usage. Entries are capped per IP and message text is truncated
//! so the log file stays bounded. Like the history store, the file-backed
//! variant degrades to in-memory operation on write failure.

use coastal_common::util::now_iso;
use coastal_common::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::warn;

/// Stored message/response text cap, in characters.
pub const INTERACTION_TEXT_CAP: usize = 10_000;

/// Interactions kept per IP. Oldest entries are dropped first.
pub const PER_IP_INTERACTION_CAP: usize = 1000;

/// Metadata string values are truncated to this length.
const METADATA_VALUE_CAP: usize = 500;

/// One logged user/chatbot exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionEntry {
    pub timestamp: String,
    pub user_message: String,
    pub assistant_response: String,
    pub interaction_type: String,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// Per-IP record: first/last seen plus the capped interaction list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpRecord {
    pub first_seen: String,
    pub last_seen: String,
    pub total_interactions: usize,
    pub interactions: Vec<InteractionEntry>,
}

/// Aggregated statistics for one IP.
#[derive(Debug, Clone, Serialize)]
pub struct IpStats {
    pub ip_address: String,
    pub first_seen: String,
    pub last_seen: String,
    pub total_interactions: usize,
    pub interaction_type_counts: BTreeMap<String, usize>,
}

/// Filters for searching the interaction log.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchQuery {
    /// Substring match against user messages and responses.
    pub query: Option<String>,
    pub ip_address: Option<String>,
    pub interaction_type: Option<String>,
    /// ISO timestamps; compared lexicographically.
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub limit: Option<usize>,
}

/// A search hit carries its owning IP alongside the entry.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub entry: InteractionEntry,
    pub ip_address: String,
}

type Records = BTreeMap<String, IpRecord>;

/// IP-keyed interaction log. `path: None` keeps everything in memory.
pub struct InteractionLog {
    path: Option<PathBuf>,
    state: Mutex<LogState>,
}

struct LogState {
    records: Records,
    degraded: bool,
}

impl InteractionLog {
    /// Open (or create) a file-backed log. Missing or corrupt files start
    /// empty; unwritable locations degrade to in-memory.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_default(),
            Err(_) => Records::default(),
        };
        Self {
            path: Some(path),
            state: Mutex::new(LogState {
                records,
                degraded: false,
            }),
        }
    }

    /// Create a purely in-memory log.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(LogState {
                records: Records::default(),
                degraded: false,
            }),
        }
    }

    /// Record one interaction. Never fails the request path: persistence
    /// errors downgrade the log to in-memory with a warning.
    pub fn log_interaction(
        &self,
        ip_address: &str,
        user_message: &str,
        assistant_response: &str,
        session_id: Option<&str>,
        interaction_type: &str,
        metadata: Option<Value>,
    ) -> Result<()> {
        let ip = if ip_address.is_empty() {
            "unknown"
        } else {
            ip_address
        };
        let now = now_iso();

        let entry = InteractionEntry {
            timestamp: now.clone(),
            user_message: truncate_chars(user_message, INTERACTION_TEXT_CAP),
            assistant_response: truncate_chars(assistant_response, INTERACTION_TEXT_CAP),
            interaction_type: interaction_type.to_string(),
            session_id: session_id.unwrap_or("unknown").to_string(),
            metadata: metadata.map(sanitize_metadata),
        };

        let mut state = self.state.lock().map_err(|_| poisoned())?;
        let record = state
            .records
            .entry(ip.to_string())
            .or_insert_with(|| IpRecord {
                first_seen: now.clone(),
                last_seen: now.clone(),
                total_interactions: 0,
                interactions: Vec::new(),
            });

        record.interactions.push(entry);
        if record.interactions.len() > PER_IP_INTERACTION_CAP {
            let excess = record.interactions.len() - PER_IP_INTERACTION_CAP;
            record.interactions.drain(..excess);
        }
        record.last_seen = now;
        record.total_interactions = record.interactions.len();

        self.persist(&mut state);
        Ok(())
    }

    /// Interactions for one IP, optionally limited to the most recent N.
    pub fn ip_interactions(
        &self,
        ip_address: &str,
        limit: Option<usize>,
    ) -> Result<Vec<InteractionEntry>> {
        let state = self.state.lock().map_err(|_| poisoned())?;
        let Some(record) = state.records.get(ip_address) else {
            return Ok(Vec::new());
        };
        let interactions = &record.interactions;
        let entries = match limit {
            Some(n) if n < interactions.len() => interactions[interactions.len() - n..].to_vec(),
            _ => interactions.clone(),
        };
        Ok(entries)
    }

    /// All IPs seen so far.
    pub fn all_ips(&self) -> Result<Vec<String>> {
        let state = self.state.lock().map_err(|_| poisoned())?;
        Ok(state.records.keys().cloned().collect())
    }

    /// Statistics for one IP, or None if unseen.
    pub fn ip_stats(&self, ip_address: &str) -> Result<Option<IpStats>> {
        let state = self.state.lock().map_err(|_| poisoned())?;
        Ok(state
            .records
            .get(ip_address)
            .map(|record| build_stats(ip_address, record)))
    }

    /// Statistics for every IP.
    pub fn all_stats(&self) -> Result<BTreeMap<String, IpStats>> {
        let state = self.state.lock().map_err(|_| poisoned())?;
        Ok(state
            .records
            .iter()
            .map(|(ip, record)| (ip.clone(), build_stats(ip, record)))
            .collect())
    }

    /// Search interactions across IPs, most recent first.
    pub fn search(&self, query: &SearchQuery) -> Result<Vec<SearchHit>> {
        let state = self.state.lock().map_err(|_| poisoned())?;
        let limit = query.limit.unwrap_or(100);
        let needle = query.query.as_ref().map(|q| q.to_lowercase());

        let mut hits: Vec<SearchHit> = Vec::new();
        for (ip, record) in &state.records {
            if let Some(ref wanted_ip) = query.ip_address {
                if ip != wanted_ip {
                    continue;
                }
            }
            for entry in &record.interactions {
                if let Some(ref wanted_type) = query.interaction_type {
                    if &entry.interaction_type != wanted_type {
                        continue;
                    }
                }
                if let Some(ref start) = query.start_date {
                    if entry.timestamp.as_str() < start.as_str() {
                        continue;
                    }
                }
                if let Some(ref end) = query.end_date {
                    if entry.timestamp.as_str() > end.as_str() {
                        continue;
                    }
                }
                if let Some(ref needle) = needle {
                    let in_msg = entry.user_message.to_lowercase().contains(needle);
                    let in_resp = entry.assistant_response.to_lowercase().contains(needle);
                    if !in_msg && !in_resp {
                        continue;
                    }
                }
                hits.push(SearchHit {
                    entry: entry.clone(),
                    ip_address: ip.clone(),
                });
            }
        }

        hits.sort_by(|a, b| b.entry.timestamp.cmp(&a.entry.timestamp));
        hits.truncate(limit);
        Ok(hits)
    }

    fn persist(&self, state: &mut LogState) {
        let Some(path) = &self.path else {
            return;
        };
        if state.degraded {
            return;
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(e) = fs::create_dir_all(parent) {
                    warn!(path = %path.display(), error = %e, "Could not create log directory, using in-memory storage");
                    state.degraded = true;
                    return;
                }
            }
        }
        let raw = match serde_json::to_string_pretty(&state.records) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Could not serialize interaction log");
                return;
            }
        };
        if let Err(e) = fs::write(path, raw) {
            warn!(path = %path.display(), error = %e, "Could not save interaction log, using in-memory storage");
            state.degraded = true;
        }
    }
}

fn build_stats(ip: &str, record: &IpRecord) -> IpStats {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for entry in &record.interactions {
        *counts.entry(entry.interaction_type.clone()).or_default() += 1;
    }
    IpStats {
        ip_address: ip.to_string(),
        first_seen: record.first_seen.clone(),
        last_seen: record.last_seen.clone(),
        total_interactions: record.total_interactions,
        interaction_type_counts: counts,
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        text.chars().take(max).collect()
    }
}

/// Keep metadata JSON-safe and bounded: primitives pass through, everything
/// else is stringified and capped.
fn sanitize_metadata(metadata: Value) -> Value {
    match metadata {
        Value::Object(map) => {
            let sanitized = map
                .into_iter()
                .map(|(k, v)| {
                    let v = match v {
                        Value::String(s) => Value::String(truncate_chars(&s, METADATA_VALUE_CAP)),
                        Value::Null | Value::Bool(_) | Value::Number(_) => v,
                        other => Value::String(truncate_chars(&other.to_string(), METADATA_VALUE_CAP)),
                    };
                    (k, v)
                })
                .collect();
            Value::Object(sanitized)
        }
        other => Value::String(truncate_chars(&other.to_string(), METADATA_VALUE_CAP)),
    }
}

fn poisoned() -> Error {
    Error::Internal("interaction log lock poisoned".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn logs_and_reads_interactions() {
        let log = InteractionLog::in_memory();
        log.log_interaction("1.2.3.4", "hi", "hello", Some("s1"), "message", None)
            .unwrap();

        let entries = log.ip_interactions("1.2.3.4", None).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].user_message, "hi");
        assert_eq!(entries[0].session_id, "s1");
    }

    #[test]
    fn empty_ip_becomes_unknown() {
        let log = InteractionLog::in_memory();
        log.log_interaction("", "q", "a", None, "message", None)
            .unwrap();
        assert_eq!(log.all_ips().unwrap(), vec!["unknown"]);
        assert_eq!(
            log.ip_interactions("unknown", None).unwrap()[0].session_id,
            "unknown"
        );
    }

    #[test]
    fn truncates_long_messages() {
        let log = InteractionLog::in_memory();
        let long = "x".repeat(INTERACTION_TEXT_CAP + 500);
        log.log_interaction("1.2.3.4", &long, &long, None, "message", None)
            .unwrap();
        let entries = log.ip_interactions("1.2.3.4", None).unwrap();
        assert_eq!(entries[0].user_message.len(), INTERACTION_TEXT_CAP);
        assert_eq!(entries[0].assistant_response.len(), INTERACTION_TEXT_CAP);
    }

    #[test]
    fn caps_interactions_per_ip() {
        let log = InteractionLog::in_memory();
        for i in 0..(PER_IP_INTERACTION_CAP + 3) {
            log.log_interaction("ip", &format!("m{}", i), "r", None, "message", None)
                .unwrap();
        }
        let entries = log.ip_interactions("ip", None).unwrap();
        assert_eq!(entries.len(), PER_IP_INTERACTION_CAP);
        assert_eq!(entries[0].user_message, "m3");

        let stats = log.ip_stats("ip").unwrap().unwrap();
        assert_eq!(stats.total_interactions, PER_IP_INTERACTION_CAP);
    }

    #[test]
    fn limit_returns_most_recent() {
        let log = InteractionLog::in_memory();
        for i in 0..5 {
            log.log_interaction("ip", &format!("m{}", i), "r", None, "message", None)
                .unwrap();
        }
        let entries = log.ip_interactions("ip", Some(2)).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].user_message, "m3");
        assert_eq!(entries[1].user_message, "m4");
    }

    #[test]
    fn stats_count_interaction_types() {
        let log = InteractionLog::in_memory();
        log.log_interaction("ip", "a", "b", None, "message", None)
            .unwrap();
        log.log_interaction("ip", "c", "d", None, "message", None)
            .unwrap();
        log.log_interaction("ip", "e", "f", None, "safety_evaluation", None)
            .unwrap();

        let stats = log.ip_stats("ip").unwrap().unwrap();
        assert_eq!(stats.interaction_type_counts["message"], 2);
        assert_eq!(stats.interaction_type_counts["safety_evaluation"], 1);
        assert!(log.ip_stats("other").unwrap().is_none());
    }

    #[test]
    fn search_filters_by_query_and_type() {
        let log = InteractionLog::in_memory();
        log.log_interaction("a", "hurricane kit", "pack water", None, "message", None)
            .unwrap();
        log.log_interaction("b", "flood zones", "avoid low areas", None, "message", None)
            .unwrap();
        log.log_interaction("b", "eval", "score", None, "safety_evaluation", None)
            .unwrap();

        let hits = log
            .search(&SearchQuery {
                query: Some("hurricane".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].ip_address, "a");

        let hits = log
            .search(&SearchQuery {
                interaction_type: Some("safety_evaluation".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entry.user_message, "eval");
    }

    #[test]
    fn metadata_strings_are_capped() {
        let log = InteractionLog::in_memory();
        let big = "z".repeat(1000);
        log.log_interaction(
            "ip",
            "q",
            "a",
            None,
            "message",
            Some(json!({"zipcode": "78401", "blob": big, "nested": {"x": 1}})),
        )
        .unwrap();

        let entries = log.ip_interactions("ip", None).unwrap();
        let meta = entries[0].metadata.as_ref().unwrap();
        assert_eq!(meta["zipcode"], "78401");
        assert_eq!(meta["blob"].as_str().unwrap().len(), 500);
        assert!(meta["nested"].is_string());
    }

    #[test]
    fn file_backed_log_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("admin_log.json");

        {
            let log = InteractionLog::open(&path);
            log.log_interaction("1.1.1.1", "q", "a", None, "message", None)
                .unwrap();
        }

        let reopened = InteractionLog::open(&path);
        assert_eq!(reopened.ip_interactions("1.1.1.1", None).unwrap().len(), 1);
    }
}
