use crate::domain::models::{LocalMoment, Rule, ScheduleId, Settings};
use crate::domain::schedule::{is_active, matched_rule};
use crate::infrastructure::error::InfraError;
use std::collections::HashSet;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Block(BlockVerdict),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockVerdict {
    pub redirect_url: String,
    /// `None` for global rules.
    pub schedule: Option<(usize, ScheduleId)>,
    pub rule: Rule,
}

/// The single place a URL is judged against the live settings.
pub struct BlockDecisionEngine<'a> {
    settings: &'a Settings,
}

impl<'a> BlockDecisionEngine<'a> {
    pub fn new(settings: &'a Settings) -> Self {
        Self { settings }
    }

    /// Global rules first and unconditionally; then active schedules in list
    /// order, skipping any whose own break is running.
    pub fn evaluate(
        &self,
        url: &str,
        moment: &LocalMoment,
        running_breaks: &HashSet<ScheduleId>,
    ) -> Decision {
        if let Some(rule) = self.settings.blocked_sites.iter().find(|rule| rule.matches(url)) {
            return Decision::Block(BlockVerdict {
                redirect_url: self.settings.global_redirect_url.clone(),
                schedule: None,
                rule: rule.clone(),
            });
        }

        for (index, schedule) in self.settings.schedules.iter().enumerate() {
            if !is_active(schedule, moment) || running_breaks.contains(&schedule.id) {
                continue;
            }
            if let Some(rule) = matched_rule(schedule, url) {
                return Decision::Block(BlockVerdict {
                    redirect_url: schedule
                        .effective_redirect(&self.settings.global_redirect_url)
                        .to_string(),
                    schedule: Some((index, schedule.id.clone())),
                    rule,
                });
            }
        }

        Decision::Allow
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationOutcome {
    Allow,
    Redirect(String),
}

/// Turns a blocking decision on a navigation into a concrete redirect.
#[derive(Debug, Clone)]
pub struct RedirectResolver {
    extension_origin: Url,
    blocked_page: Url,
}

impl RedirectResolver {
    pub fn new(extension_origin: &str, blocked_page_path: &str) -> Result<Self, InfraError> {
        let origin = extension_origin.trim();
        let origin = if origin.ends_with('/') {
            origin.to_string()
        } else {
            format!("{origin}/")
        };
        let extension_origin = Url::parse(&origin)
            .map_err(|error| InfraError::InvalidConfig(format!("invalid extension origin {origin}: {error}")))?;
        let blocked_page = extension_origin
            .join(blocked_page_path.trim().trim_start_matches('/'))
            .map_err(|error| InfraError::InvalidConfig(format!("invalid blocked page path: {error}")))?;
        Ok(Self {
            extension_origin,
            blocked_page,
        })
    }

    pub fn blocked_page(&self) -> &Url {
        &self.blocked_page
    }

    /// Absolute http(s) and extension-scheme targets pass through; anything
    /// else is a path inside the extension.
    pub fn resolve(&self, target: &str) -> Result<Url, InfraError> {
        let target = target.trim();
        let extension_prefix = format!("{}://", self.extension_origin.scheme());
        let absolute = target.starts_with("http://")
            || target.starts_with("https://")
            || target.starts_with(&extension_prefix);
        let resolved = if absolute {
            Url::parse(target)
        } else {
            self.extension_origin.join(target.trim_start_matches('/'))
        };
        resolved.map_err(|error| InfraError::InvalidConfig(format!("invalid redirect target {target}: {error}")))
    }

    pub fn navigation_outcome(
        &self,
        url: &str,
        frame_id: Option<u32>,
        decision: &Decision,
    ) -> Result<NavigationOutcome, InfraError> {
        if frame_id.unwrap_or(0) != 0 {
            return Ok(NavigationOutcome::Allow);
        }
        let Ok(navigation) = Url::parse(url) else {
            return Ok(NavigationOutcome::Allow);
        };
        if !matches!(navigation.scheme(), "http" | "https") {
            return Ok(NavigationOutcome::Allow);
        }
        let Decision::Block(verdict) = decision else {
            return Ok(NavigationOutcome::Allow);
        };

        let mut target = self.resolve(&verdict.redirect_url)?;
        if navigation == target || url.starts_with(self.blocked_page.as_str()) {
            return Ok(NavigationOutcome::Allow);
        }
        if !self.is_extension_url(&target) {
            // Outside targets are handed back exactly as configured.
            return Ok(NavigationOutcome::Redirect(verdict.redirect_url.trim().to_string()));
        }
        target.query_pairs_mut().append_pair("blockedUrl", url);
        Ok(NavigationOutcome::Redirect(target.to_string()))
    }

    fn is_extension_url(&self, target: &Url) -> bool {
        target.scheme() == self.extension_origin.scheme()
            && target.host_str() == self.extension_origin.host_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Schedule, TimeInterval};
    use chrono::NaiveDate;

    fn sample_schedule(id: &str) -> Schedule {
        Schedule {
            id: ScheduleId::from(id),
            name: "Work".to_string(),
            days: vec![1, 2, 3, 4, 5],
            time_intervals: vec![TimeInterval::new("09:00", "17:00")],
            sites: vec!["x.com".to_string()],
            keywords: vec!["reddit".to_string()],
            redirect_url: String::new(),
            break_duration: 10,
        }
    }

    fn sample_settings() -> Settings {
        Settings {
            global_redirect_url: "pages/blocked.html".to_string(),
            blocked_sites: vec![Rule::url("casino.example")],
            schedules: vec![sample_schedule("sch-work")],
        }
    }

    fn monday(hour: u32, minute: u32) -> LocalMoment {
        LocalMoment::from_naive(
            NaiveDate::from_ymd_opt(2026, 2, 16)
                .expect("date")
                .and_hms_opt(hour, minute, 0)
                .expect("time"),
        )
    }

    fn resolver() -> RedirectResolver {
        RedirectResolver::new("chrome-extension://abc", "pages/blocked.html").expect("resolver")
    }

    #[test]
    fn active_schedule_blocks_matching_host() {
        let settings = sample_settings();
        let decision = BlockDecisionEngine::new(&settings).evaluate(
            "https://x.com/home",
            &monday(10, 0),
            &HashSet::new(),
        );

        let Decision::Block(verdict) = decision else {
            panic!("expected block");
        };
        assert_eq!(verdict.redirect_url, "pages/blocked.html");
        assert_eq!(verdict.schedule, Some((0, ScheduleId::from("sch-work"))));
        assert_eq!(verdict.rule, Rule::url("x.com"));
    }

    #[test]
    fn outside_window_or_unrelated_host_is_allowed() {
        let settings = sample_settings();
        let engine = BlockDecisionEngine::new(&settings);
        assert_eq!(
            engine.evaluate("https://x.com/", &monday(17, 0), &HashSet::new()),
            Decision::Allow
        );
        assert_eq!(
            engine.evaluate("https://electrolux.com/", &monday(10, 0), &HashSet::new()),
            Decision::Allow
        );
    }

    #[test]
    fn running_break_exempts_only_its_schedule() {
        let mut settings = sample_settings();
        let mut other = sample_schedule("sch-other");
        other.redirect_url = "https://focus.example/".to_string();
        settings.schedules.push(other);
        let running = HashSet::from([ScheduleId::from("sch-work")]);

        let Decision::Block(verdict) =
            BlockDecisionEngine::new(&settings).evaluate("https://x.com/", &monday(10, 0), &running)
        else {
            panic!("expected block by the second schedule");
        };
        assert_eq!(verdict.schedule, Some((1, ScheduleId::from("sch-other"))));
        assert_eq!(verdict.redirect_url, "https://focus.example/");
    }

    #[test]
    fn global_rule_wins_over_running_break_and_time() {
        let settings = sample_settings();
        let running = HashSet::from([ScheduleId::from("sch-work")]);
        let decision = BlockDecisionEngine::new(&settings).evaluate(
            "https://www.casino.example/",
            &monday(3, 0),
            &running,
        );

        let Decision::Block(verdict) = decision else {
            panic!("expected block");
        };
        assert_eq!(verdict.schedule, None);
        assert_eq!(verdict.redirect_url, "pages/blocked.html");
    }

    #[test]
    fn break_lets_schedule_sites_through() {
        let settings = sample_settings();
        let running = HashSet::from([ScheduleId::from("sch-work")]);
        assert_eq!(
            BlockDecisionEngine::new(&settings).evaluate("https://x.com/", &monday(10, 0), &running),
            Decision::Allow
        );
    }

    #[test]
    fn relative_target_resolves_inside_extension_with_blocked_url() {
        let settings = sample_settings();
        let decision =
            BlockDecisionEngine::new(&settings).evaluate("https://x.com/a?b=c", &monday(10, 0), &HashSet::new());

        let outcome = resolver()
            .navigation_outcome("https://x.com/a?b=c", Some(0), &decision)
            .expect("outcome");
        assert_eq!(
            outcome,
            NavigationOutcome::Redirect(
                "chrome-extension://abc/pages/blocked.html?blockedUrl=https%3A%2F%2Fx.com%2Fa%3Fb%3Dc"
                    .to_string()
            )
        );
    }

    #[test]
    fn absolute_target_passes_through_without_query() {
        let decision = Decision::Block(BlockVerdict {
            redirect_url: "https://focus.example/".to_string(),
            schedule: None,
            rule: Rule::url("x.com"),
        });

        let outcome = resolver()
            .navigation_outcome("https://x.com/", None, &decision)
            .expect("outcome");
        assert_eq!(outcome, NavigationOutcome::Redirect("https://focus.example/".to_string()));
    }

    #[test]
    fn absolute_target_is_returned_as_configured() {
        let decision = Decision::Block(BlockVerdict {
            redirect_url: "https://focus.example".to_string(),
            schedule: None,
            rule: Rule::url("x.com"),
        });

        let outcome = resolver()
            .navigation_outcome("https://x.com/", Some(0), &decision)
            .expect("outcome");
        assert_eq!(outcome, NavigationOutcome::Redirect("https://focus.example".to_string()));
    }

    #[test]
    fn redirect_to_self_is_suppressed() {
        let decision = Decision::Block(BlockVerdict {
            redirect_url: "https://x.com".to_string(),
            schedule: None,
            rule: Rule::url("x.com"),
        });

        let outcome = resolver()
            .navigation_outcome("https://x.com/", Some(0), &decision)
            .expect("outcome");
        assert_eq!(outcome, NavigationOutcome::Allow);
    }

    #[test]
    fn subframes_and_non_http_navigations_are_ignored() {
        let decision = Decision::Block(BlockVerdict {
            redirect_url: "pages/blocked.html".to_string(),
            schedule: None,
            rule: Rule::keyword("x"),
        });
        let resolver = resolver();

        assert_eq!(
            resolver.navigation_outcome("https://x.com/", Some(3), &decision).expect("outcome"),
            NavigationOutcome::Allow
        );
        assert_eq!(
            resolver
                .navigation_outcome("chrome-extension://abc/pages/blocked.html?blockedUrl=x", Some(0), &decision)
                .expect("outcome"),
            NavigationOutcome::Allow
        );
        assert_eq!(
            resolver.navigation_outcome("ftp://x.com/", Some(0), &decision).expect("outcome"),
            NavigationOutcome::Allow
        );
    }

    #[test]
    fn resolver_keeps_extension_scheme_targets() {
        let resolved = resolver()
            .resolve("chrome-extension://abc/pages/funny.html")
            .expect("resolve");
        assert_eq!(resolved.as_str(), "chrome-extension://abc/pages/funny.html");
        assert_eq!(
            resolver().blocked_page().as_str(),
            "chrome-extension://abc/pages/blocked.html"
        );
    }
}
