use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Config;
use crate::error::{BackendError, Result};
use crate::store::{Entry, KvStore};

/// How many times a CAS-rejected revision advance is retried before the
/// query goes out without an SOA record.
const CAS_ATTEMPTS: u32 = 3;

/// SOA fields taken from the configuration.
#[derive(Debug, Clone)]
pub struct SoaSettings {
    pub name_server: String,
    pub email_addr: String,
    pub refresh: i32,
    pub retry: i32,
    pub expiry: i32,
    pub nx: i32,
    pub default_ttl: u32,
}

impl From<&Config> for SoaSettings {
    fn from(config: &Config) -> Self {
        Self {
            name_server: config.hostname.clone(),
            email_addr: config.hostmaster_email_address.clone(),
            refresh: config.soa_refresh,
            retry: config.soa_retry,
            expiry: config.soa_expiry,
            nx: config.soa_nx,
            default_ttl: config.default_ttl,
        }
    }
}

/// Revision state persisted at `soa/<zone>`.
///
/// `sn_modify_index` records the highest modify-index observed under the
/// zone when the serial was last advanced; the serial itself is
/// `sn_date * 100 + sn_version`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct SoaRevision {
    #[serde(rename = "SnModifyIndex")]
    sn_modify_index: u64,
    #[serde(rename = "SnDate")]
    sn_date: i32,
    #[serde(rename = "SnVersion")]
    sn_version: u32,
}

/// Synthesizes a zone's SOA record and advances the persisted revision
/// whenever the zone's data has changed since the last sync.
///
/// The clock is injected so tests can pin the serial date.
pub struct SoaGenerator {
    settings: SoaSettings,
    today: NaiveDate,
}

impl SoaGenerator {
    pub fn new(settings: SoaSettings, today: NaiveDate) -> Self {
        Self { settings, today }
    }

    /// Bounded retry wrapper around [`SoaGenerator::attempt`]. Returns
    /// `Ok(None)` once all attempts lost the CAS race; the caller then
    /// answers without an SOA record.
    pub async fn retrieve_or_create(&self, kv: &dyn KvStore, zone: &str) -> Result<Option<Entry>> {
        for attempt in 0..CAS_ATTEMPTS {
            if let Some(entry) = self.attempt(kv, zone).await? {
                return Ok(Some(entry));
            }

            debug!("SOA revision for {} lost CAS attempt {}", zone, attempt + 1);
        }

        Ok(None)
    }

    /// One revision-advance attempt. `Ok(None)` means a concurrent
    /// generator won the CAS race and the attempt should be retried.
    pub async fn attempt(&self, kv: &dyn KvStore, zone: &str) -> Result<Option<Entry>> {
        let pairs = kv.list(&format!("zones/{zone}")).await?;
        let latest = pairs.iter().map(|pair| pair.modify_index).max().unwrap_or(0);

        let key = format!("soa/{zone}");
        let previous = match kv.get(&key).await {
            Ok(pair) => Some(pair),
            Err(BackendError::KeyNotFound) => None,
            Err(err) => return Err(err),
        };

        let mut rev = match &previous {
            Some(pair) => serde_json::from_slice::<SoaRevision>(&pair.value)?,
            None => SoaRevision {
                sn_modify_index: latest,
                sn_date: date_number(self.today),
                sn_version: 0,
            },
        };

        if previous.is_some() && rev.sn_modify_index != latest {
            rev.sn_modify_index = latest;

            let today = date_number(self.today);
            if rev.sn_date != today {
                rev.sn_date = today;
                rev.sn_version = 0;
            } else {
                // Wraps at 100: the serial regresses within the day.
                rev.sn_version = (rev.sn_version + 1) % 100;
            }
        }

        let encoded = serde_json::to_vec(&rev)?;
        if !kv.atomic_put(&key, &encoded, previous.as_ref()).await? {
            return Ok(None);
        }

        Ok(Some(self.format_entry(&rev)))
    }

    fn format_entry(&self, rev: &SoaRevision) -> Entry {
        let payload = format!(
            "{} {} {} {} {} {} {}",
            self.settings.name_server,
            self.settings.email_addr,
            serial(rev.sn_date, rev.sn_version),
            self.settings.refresh,
            self.settings.retry,
            self.settings.expiry,
            self.settings.nx,
        );

        Entry {
            record_type: "SOA".to_string(),
            ttl: self.settings.default_ttl,
            payload,
        }
    }
}

/// `YYYYMMDDnn`; fits in u32 for every date up to year 4294.
fn serial(date: i32, version: u32) -> u32 {
    date as u32 * 100 + version
}

fn date_number(date: NaiveDate) -> i32 {
    date.year() * 10000 + date.month() as i32 * 100 + date.day() as i32
}
