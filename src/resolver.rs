use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::warn;

use crate::config::Config;
use crate::error::Result;
use crate::soa::{SoaGenerator, SoaSettings};
use crate::store::{Entry, KvStore, Pair, Query, normalize_key};

/// One element of a stored record value: a JSON array of these makes up
/// the value of every `zones/...` key.
#[derive(Debug, Deserialize)]
struct RecordValue {
    #[serde(rename = "TTL")]
    ttl: Option<u32>,
    #[serde(rename = "Payload")]
    payload: Option<String>,
}

/// Answers frontend queries from the KV store and synthesizes SOA
/// records at zone apexes.
pub struct Resolver {
    config: Config,
    kv: Arc<dyn KvStore>,
}

/// Lists the `zones` prefix and collects the distinct zone labels.
///
/// Backends shape listing keys inconsistently: for a key stored at
/// `zones/example.com/A`, Consul reports `zones/example.com/A` while
/// etcd-style stores report `zones/example.com/`. Normalizing before
/// splitting makes both look alike.
async fn all_zones(kv: &dyn KvStore) -> Result<Vec<String>> {
    let pairs = kv.list("zones").await?;

    let mut zones = HashSet::new();
    for pair in &pairs {
        let tokens: Vec<&str> = normalize_key(&pair.key).split('/').collect();
        if tokens.len() < 2 || tokens[1].is_empty() {
            continue;
        }
        zones.insert(tokens[1].to_string());
    }

    Ok(zones.into_iter().collect())
}

/// Maps a query name to the longest matching zone and the remaining
/// labels to its left. Returns empty strings when no zone matches.
fn find_zone(zones: &[String], name: &str) -> (String, String) {
    let normalized = name.to_lowercase();
    let mut tokens: Vec<&str> = normalized.split('.').collect();

    if tokens.len() < 2 {
        return (String::new(), String::new());
    }

    // Absolute names carry a trailing dot; drop the one empty token.
    if tokens.last() == Some(&"") {
        tokens.pop();
    }

    let mut zone = String::new();
    let mut remainder = String::new();

    // Sweep candidates right to left; each later (longer) match
    // overwrites the earlier one, so the longest suffix wins.
    let mut start = tokens.len() as isize - 2;
    while start >= 0 {
        let candidate = tokens[start as usize..].join(".");

        if zones.iter().any(|existing| *existing == candidate) {
            zone = candidate;
            remainder = tokens[..start as usize]
                .iter()
                .filter(|token| !token.is_empty())
                .copied()
                .collect::<Vec<&str>>()
                .join(".");
        }

        start -= 1;
    }

    (zone, remainder)
}

fn pair_segments(pair: &Pair) -> usize {
    normalize_key(&pair.key).split('/').count()
}

fn filter_pairs(pairs: Vec<Pair>, segments: usize) -> Vec<Pair> {
    pairs
        .into_iter()
        .filter(|pair| pair_segments(pair) == segments)
        .collect()
}

/// Lists the record keys for a zone (apex) or one of its labels.
///
/// A single listing returns apex and descendant keys alike; the segment
/// count is what tells them apart: `zones/<zone>/<type>` has 3 segments,
/// `zones/<zone>/<label>/<type>` has 4.
async fn zone_pairs(kv: &dyn KvStore, zone: &str, remainder: &str) -> Result<Vec<Pair>> {
    let (prefix, segments) = if remainder.is_empty() {
        (format!("zones/{zone}"), 3)
    } else {
        (format!("zones/{zone}/{remainder}"), 4)
    };

    Ok(filter_pairs(kv.list(&prefix).await?, segments))
}

/// Decodes the surviving pairs into records, filtered by query type.
/// Malformed values cost only the offending key or element, never the
/// whole query.
async fn zone_entries(
    kv: &dyn KvStore,
    zone: &str,
    remainder: &str,
    record_type: &str,
    default_ttl: u32,
) -> Result<Vec<Entry>> {
    let pairs = zone_pairs(kv, zone, remainder).await?;

    let mut entries = Vec::new();
    for pair in pairs {
        let key = normalize_key(&pair.key);
        let entry_type = key.rsplit('/').next().unwrap_or("");

        // Record types compare case-sensitively, unlike zone names.
        if record_type != "ANY" && entry_type != record_type {
            continue;
        }

        let values: Vec<RecordValue> = match serde_json::from_slice(&pair.value) {
            Ok(values) => values,
            Err(err) => {
                warn!("discarding key {}: {}", key, err);
                continue;
            }
        };

        for value in values {
            let Some(payload) = value.payload else {
                warn!("discarding entry in key {} because payload is missing", key);
                continue;
            };

            entries.push(Entry {
                record_type: entry_type.to_string(),
                ttl: value.ttl.unwrap_or(default_ttl),
                payload,
            });
        }
    }

    Ok(entries)
}

impl Resolver {
    pub fn new(config: Config, kv: Arc<dyn KvStore>) -> Self {
        Self { config, kv }
    }

    /// Resolves a query to an ordered record list. An unmatched zone is
    /// an empty answer, not an error. At the apex, `ANY` and `SOA`
    /// queries additionally run the SOA generator; its record, when one
    /// is produced, always comes first.
    pub async fn resolve(&self, query: &Query) -> Result<Vec<Entry>> {
        let zones = all_zones(self.kv.as_ref()).await?;
        let (zone, remainder) = find_zone(&zones, &query.name);

        if zone.is_empty() {
            return Ok(Vec::new());
        }

        let mut entries = zone_entries(
            self.kv.as_ref(),
            &zone,
            &remainder,
            &query.record_type,
            self.config.default_ttl,
        )
        .await?;

        if remainder.is_empty() && (query.record_type == "ANY" || query.record_type == "SOA") {
            let generator =
                SoaGenerator::new(SoaSettings::from(&self.config), Utc::now().date_naive());

            if let Some(soa) = generator.retrieve_or_create(self.kv.as_ref(), &zone).await? {
                entries.insert(0, soa);
            }
        }

        Ok(entries)
    }
}
