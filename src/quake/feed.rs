//! P2P地震情報 (p2pquake.net) feed polling.
//!
//! The v2 history endpoint is polled once a minute for JMA earthquake
//! reports (code 551). Report ids already seen are skipped; the first
//! successful poll only seeds the seen-set so a restart does not replay
//! old quakes into every channel.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;
use tracing::error;
use tracing::warn;
use url::Url;

use super::scale_label;
use super::QuakeConfig;
use crate::serenity;
use crate::storage::ConfigStore;
use crate::util;

const HISTORY_ENDPOINT: &str = "https://api.p2pquake.net/v2/history";

/// JMA earthquake information, code 551 in the feed.
const QUAKE_INFO_CODE: &str = "551";

const POLL_INTERVAL: Duration = Duration::from_secs(60);

/// One report from the history endpoint. Fields the relay does not touch
/// are left out; absent fields decode to their defaults.
#[derive(Debug, Deserialize)]
pub struct QuakeReport {
    pub id: String,
    pub earthquake: Option<Earthquake>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Earthquake {
    #[serde(default)]
    pub time: String,
    #[serde(default = "unknown_scale")]
    pub max_scale: i64,
    pub hypocenter: Option<Hypocenter>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Hypocenter {
    #[serde(default)]
    pub name: String,
    /// -1 when not yet determined.
    #[serde(default = "unknown_magnitude")]
    pub magnitude: f64,
}

fn unknown_scale() -> i64 {
    -1
}

fn unknown_magnitude() -> f64 {
    -1.0
}

/// Poll the feed for the life of the process. Fetch and send failures are
/// logged and the loop carries on; it never exits on its own.
pub async fn poll_loop(
    http: Arc<serenity::Http>,
    cache: Arc<serenity::Cache>,
    configs: ConfigStore<QuakeConfig>,
    client: reqwest::Client,
) {
    let url = match Url::parse_with_params(
        HISTORY_ENDPOINT,
        &[("codes", QUAKE_INFO_CODE), ("limit", "10")],
    ) {
        Ok(url) => url,
        Err(err) => {
            error!("Bad earthquake feed endpoint, relay disabled: {err}");
            return;
        }
    };

    let mut seen: HashSet<String> = HashSet::new();
    let mut seeded = false;

    loop {
        match fetch_reports(&client, url.clone()).await {
            Ok(reports) => {
                for report in reports {
                    if !seen.insert(report.id.clone()) {
                        continue;
                    }
                    if seeded {
                        relay(&http, &cache, &configs, &report).await;
                    }
                }
                seeded = true;
            }
            Err(err) => warn!("Earthquake feed fetch failed: {err}"),
        }

        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

async fn fetch_reports(
    client: &reqwest::Client,
    url: Url,
) -> Result<Vec<QuakeReport>, reqwest::Error> {
    client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await
}

/// Post one quake to every registered guild whose threshold it meets.
async fn relay(
    http: &serenity::Http,
    cache: &serenity::Cache,
    configs: &ConfigStore<QuakeConfig>,
    report: &QuakeReport,
) {
    let Some(quake) = &report.earthquake else {
        return;
    };

    let configs = match configs.records().await {
        Ok(configs) => configs,
        Err(err) => {
            error!("Could not load quake configs, dropping report {}: {err}", report.id);
            return;
        }
    };

    for config in configs {
        if quake.max_scale < config.min_scale {
            debug!(
                "Quake {} below threshold for '{}', skipping.",
                report.id, config.guild_name
            );
            continue;
        }

        let guild_id = serenity::GuildId::new(config.guild_id as u64);
        let Some(channel_id) =
            util::resolve_channel_by_name(cache, guild_id, &config.channel_name)
        else {
            error!(
                "Channel '{}' not found in guild '{}', cannot relay quake alert.",
                config.channel_name, config.guild_name
            );
            continue;
        };

        let message = serenity::CreateMessage::new().embed(quake_embed(quake));
        if let Err(err) = channel_id.send_message(http, message).await {
            error!(
                "Failed to relay quake alert to '{}': {err}",
                config.guild_name
            );
        }
    }
}

fn quake_embed(quake: &Earthquake) -> serenity::CreateEmbed {
    let hypocenter = quake.hypocenter.as_ref();
    let epicenter = hypocenter
        .map(|h| h.name.as_str())
        .filter(|name| !name.is_empty())
        .unwrap_or("不明");
    let magnitude = hypocenter
        .map(|h| h.magnitude)
        .filter(|m| *m >= 0.0)
        .map(|m| format!("M{m:.1}"))
        .unwrap_or_else(|| "不明".to_string());

    serenity::CreateEmbed::new()
        .title("地震情報")
        .colour(scale_colour(quake.max_scale))
        .field("発生時刻", quake.time.clone(), false)
        .field("震源地", epicenter, true)
        .field("最大震度", scale_label(quake.max_scale), true)
        .field("マグニチュード", magnitude, true)
}

/// Stronger shaking, hotter color.
fn scale_colour(scale: i64) -> u32 {
    match scale {
        ..=29 => 0x3498db,
        30..=44 => 0xf1c40f,
        45..=54 => 0xe67e22,
        _ => 0xe74c3c,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_payload_decodes_with_missing_fields() {
        // Hypocenter data often trails the first report.
        let payload = r#"[
            {"id": "abc", "code": 551,
             "earthquake": {"time": "2026/08/07 12:00:00", "maxScale": 45}},
            {"id": "def", "code": 551}
        ]"#;

        let reports: Vec<QuakeReport> = serde_json::from_str(payload).expect("decode");

        assert_eq!(reports.len(), 2);
        let quake = reports[0].earthquake.as_ref().expect("earthquake");
        assert_eq!(quake.max_scale, 45);
        assert!(quake.hypocenter.is_none());
        assert!(reports[1].earthquake.is_none());
    }

    #[test]
    fn unknown_magnitude_renders_as_unknown() {
        let quake = Earthquake {
            time: "2026/08/07 12:00:00".to_string(),
            max_scale: 30,
            hypocenter: Some(Hypocenter {
                name: String::new(),
                magnitude: -1.0,
            }),
        };

        // Building the embed must not panic on partial data.
        let _ = quake_embed(&quake);
    }
}
