use crate::domain::models::LocalMoment;
use chrono::{DateTime, Local, NaiveDateTime, Utc};
use chrono_tz::Tz;
use std::sync::Arc;

pub type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Converts the current instant into the wall-clock reading schedules are written in.
#[derive(Clone)]
pub struct Clock {
    now_provider: NowProvider,
    timezone: Option<Tz>,
}

impl Clock {
    pub fn system(timezone: Option<Tz>) -> Self {
        Self {
            now_provider: Arc::new(Utc::now),
            timezone,
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn now_local(&self) -> NaiveDateTime {
        let now = (self.now_provider)();
        match self.timezone {
            Some(timezone) => now.with_timezone(&timezone).naive_local(),
            None => now.with_timezone(&Local).naive_local(),
        }
    }

    pub fn moment(&self) -> LocalMoment {
        LocalMoment::from_naive(self.now_local())
    }
}
