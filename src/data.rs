//! Shared bot state handed to every command and event handler.

use std::collections::HashSet;

use crate::awards::AwardsFeature;
use crate::awards::SchedulerContext;
use crate::quake::QuakeFeature;
use crate::serenity;

/// The data kept between shards.
pub struct Data {
    /// Users who receive bug notifications by direct message.
    pub notify_list: HashSet<serenity::UserId>,
    /// Weekly reaction awards feature.
    pub awards: AwardsFeature,
    /// Earthquake alert relay feature.
    pub quake: QuakeFeature,
}

impl Data {
    /// Bundle what an award timer task needs to run detached from `self`.
    pub fn award_scheduler_context(&self, ctx: &serenity::Context) -> SchedulerContext {
        SchedulerContext {
            http: ctx.http.clone(),
            cache: ctx.cache.clone(),
            configs: self.awards.configs.clone(),
            schedules: self.awards.schedules.clone(),
            records: self.awards.records.clone(),
        }
    }
}
