//! Per-guild weekly report timers.
//!
//! One spawned task per registered guild, tracked in a map owned by the
//! scheduler so a guild never has two live timers: starting again replaces
//! the existing task, stopping aborts it. The task polls once a second for
//! an exact weekday/hour/minute match, runs the report cycle, then sleeps
//! slightly under a week before polling again.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::report;
use super::tally;
use super::AwardSchedule;
use super::AwardsConfig;
use super::NOTHING_TO_REPORT;
use super::RETENTION_DAYS;
use crate::serenity;
use crate::storage::ConfigStore;
use crate::storage::RecordStore;
use crate::util;
use crate::SudachiError;

/// How often a waiting timer re-checks the clock.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Pause after a report before polling again. Kept short of a full week so
/// clock drift cannot skip the next trigger minute.
const RESCHEDULE_AFTER: Duration = Duration::from_secs(6 * 86_400 + 22 * 3_600);

/// Everything a timer task needs, cloned into the task at start.
#[derive(Clone)]
pub struct SchedulerContext {
    pub http: Arc<serenity::Http>,
    pub cache: Arc<serenity::Cache>,
    pub configs: ConfigStore<AwardsConfig>,
    pub schedules: ConfigStore<AwardSchedule>,
    pub records: RecordStore,
}

/// Owner of the per-guild timer tasks.
#[derive(Default)]
pub struct AwardScheduler {
    tasks: Mutex<HashMap<serenity::GuildId, JoinHandle<()>>>,
}

impl AwardScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or restart) the weekly timer for a guild.
    ///
    /// Missing config or schedule rows are logged and ignored, the guild
    /// simply is not scheduled. An existing timer is always cancelled before
    /// the new one is installed.
    pub async fn start(
        &self,
        scx: SchedulerContext,
        guild_id: serenity::GuildId,
    ) -> Result<(), sqlx::Error> {
        let Some(schedule) = scx.schedules.get(guild_id).await? else {
            debug!("No award schedule registered for guild {guild_id}, not starting a timer.");
            return Ok(());
        };
        if scx.configs.get(guild_id).await?.is_none() {
            debug!("No awards config registered for guild {guild_id}, not starting a timer.");
            return Ok(());
        }

        info!(
            "Scheduling weekly awards for guild {guild_id}: weekday {} at {:02}:{:02}",
            schedule.weekday, schedule.hour, schedule.minute
        );
        let handle = tokio::spawn(run_timer(scx, guild_id, schedule));
        self.install(guild_id, handle).await;

        Ok(())
    }

    /// Cancel the guild's timer. Safe to call when none exists. A report
    /// cycle already past its await points runs to completion.
    pub async fn stop(&self, guild_id: serenity::GuildId) {
        if let Some(handle) = self.tasks.lock().await.remove(&guild_id) {
            handle.abort();
            info!("Stopped weekly awards timer for guild {guild_id}.");
        }
    }

    /// Whether the guild currently has a live timer.
    pub async fn is_running(&self, guild_id: serenity::GuildId) -> bool {
        self.tasks
            .lock()
            .await
            .get(&guild_id)
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Replace, never stack: at most one live timer per guild.
    async fn install(&self, guild_id: serenity::GuildId, handle: JoinHandle<()>) {
        let mut tasks = self.tasks.lock().await;
        if let Some(old) = tasks.insert(guild_id, handle) {
            old.abort();
        }
    }
}

/// Timer loop of one guild, lives until aborted.
async fn run_timer(scx: SchedulerContext, guild_id: serenity::GuildId, schedule: AwardSchedule) {
    loop {
        tokio::time::sleep(POLL_INTERVAL).await;
        if !schedule.matches(Local::now()) {
            continue;
        }

        if let Err(err) = run_cycle(&scx, guild_id).await {
            error!("Weekly awards cycle failed for guild {guild_id}: {err}");
        }

        // The same minute matches for sixty polls, sleeping past it also
        // lines the timer up for next week.
        tokio::time::sleep(RESCHEDULE_AFTER).await;
    }
}

/// One report cycle: prune, rank, announce.
///
/// A vanished channel or failed sends abort only this cycle's output; the
/// timer reschedules regardless.
async fn run_cycle(scx: &SchedulerContext, guild_id: serenity::GuildId) -> Result<(), SudachiError> {
    let Some(config) = scx.configs.get(guild_id).await? else {
        warn!("Guild {guild_id} is no longer registered, skipping its report cycle.");
        return Ok(());
    };

    // Retention prune first so the ranking never sees aged-out messages.
    let pruned = scx.records.delete_outdated(guild_id, RETENTION_DAYS).await?;
    if pruned > 0 {
        info!("Pruned {pruned} outdated messages for '{}'.", config.guild_name);
        if let Err(err) = scx.records.reclaim().await {
            warn!("Storage reclaim failed after prune: {err}");
        }
    }

    let Some(channel_id) =
        util::resolve_channel_by_name(&scx.cache, guild_id, &config.channel_name)
    else {
        let err = SudachiError::ChannelNotFound {
            name: config.channel_name.clone(),
            guild: config.guild_name.clone(),
        };
        error!("Skipping this report: {err}");
        return Ok(());
    };

    let snapshot = scx.records.all().await?;
    let groups = tally::rank_messages(
        snapshot,
        guild_id,
        config.min_reactions,
        config.rank_limit as usize,
    );

    if groups.is_empty() {
        info!("Nothing to report for '{}' this week.", config.guild_name);
        if let Err(err) = channel_id.say(&scx.http, NOTHING_TO_REPORT).await {
            error!(
                "Failed to send empty-week notice to '{}': {err}",
                config.guild_name
            );
        }
        return Ok(());
    }

    let blocks = report::compose(&groups);
    report::deliver(&scx.http, channel_id, blocks).await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::future::pending;

    use super::*;

    fn guild() -> serenity::GuildId {
        serenity::GuildId::new(1)
    }

    #[tokio::test]
    async fn installing_twice_replaces_the_first_timer() {
        let scheduler = AwardScheduler::new();

        let first = tokio::spawn(pending::<()>());
        let first_abort = first.abort_handle();
        scheduler.install(guild(), first).await;

        let second = tokio::spawn(pending::<()>());
        scheduler.install(guild(), second).await;

        assert_eq!(scheduler.tasks.lock().await.len(), 1);
        // The replaced task was aborted, not left running unsupervised.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(first_abort.is_finished());
        assert!(scheduler.is_running(guild()).await);
    }

    #[tokio::test]
    async fn stop_aborts_and_is_idempotent() {
        let scheduler = AwardScheduler::new();

        scheduler.install(guild(), tokio::spawn(pending::<()>())).await;
        assert!(scheduler.is_running(guild()).await);

        scheduler.stop(guild()).await;
        assert!(!scheduler.is_running(guild()).await);

        // Stopping an idle guild is a no-op.
        scheduler.stop(guild()).await;
    }
}
