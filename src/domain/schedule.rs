use crate::domain::matcher::{matches_keyword, matches_site};
use crate::domain::models::{LocalMoment, Rule, Schedule, TimeInterval};
use chrono::NaiveTime;

impl TimeInterval {
    /// `start <= time < end`; an interval that fails to parse never contains anything.
    pub fn contains(&self, time: NaiveTime) -> bool {
        match self.bounds() {
            Some((start, end)) => start <= time && time < end,
            None => false,
        }
    }
}

pub fn is_active(schedule: &Schedule, moment: &LocalMoment) -> bool {
    schedule.days.contains(&moment.day)
        && schedule
            .time_intervals
            .iter()
            .any(|interval| interval.contains(moment.time))
}

/// Sites are checked before keywords; the first hit is reported.
pub fn matched_rule(schedule: &Schedule, url: &str) -> Option<Rule> {
    if let Some(site) = schedule.sites.iter().find(|site| matches_site(url, site)) {
        return Some(Rule::url(site.clone()));
    }
    schedule
        .keywords
        .iter()
        .find(|keyword| matches_keyword(url, keyword))
        .map(|keyword| Rule::keyword(keyword.clone()))
}
