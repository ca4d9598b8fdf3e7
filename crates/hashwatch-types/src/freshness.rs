use serde::{Deserialize, Serialize};

/// How recently a miner has reported, relative to the poll cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Freshness {
    Active,
    Lagging,
    Stale,
    Unknown,
}

impl Freshness {
    pub fn label(self) -> &'static str {
        match self {
            Freshness::Active => "Active",
            Freshness::Lagging => "Lagging",
            Freshness::Stale => "Stale",
            Freshness::Unknown => "Unknown",
        }
    }
}

/// Classification thresholds scaled from the poll interval: a miner is
/// active within two intervals of its last report and lagging within five.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FreshnessPolicy {
    pub poll_interval_secs: u64,
}

impl FreshnessPolicy {
    pub fn new(poll_interval_secs: u64) -> Self {
        Self { poll_interval_secs }
    }

    pub fn active_within_secs(&self) -> u64 {
        self.poll_interval_secs * 2
    }

    pub fn lagging_within_secs(&self) -> u64 {
        self.poll_interval_secs * 5
    }

    pub fn classify(&self, age_sec: Option<u64>) -> Freshness {
        match age_sec {
            None => Freshness::Unknown,
            Some(age) if age <= self.active_within_secs() => Freshness::Active,
            Some(age) if age <= self.lagging_within_secs() => Freshness::Lagging,
            Some(_) => Freshness::Stale,
        }
    }
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self::new(15)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_matches_dashboard_badges() {
        // 15s polling: active <= 30s, lagging <= 75s, stale beyond.
        let policy = FreshnessPolicy::default();
        assert_eq!(policy.classify(Some(0)), Freshness::Active);
        assert_eq!(policy.classify(Some(30)), Freshness::Active);
        assert_eq!(policy.classify(Some(31)), Freshness::Lagging);
        assert_eq!(policy.classify(Some(75)), Freshness::Lagging);
        assert_eq!(policy.classify(Some(76)), Freshness::Stale);
        assert_eq!(policy.classify(None), Freshness::Unknown);
    }

    #[test]
    fn thresholds_scale_with_interval() {
        let policy = FreshnessPolicy::new(30);
        assert_eq!(policy.active_within_secs(), 60);
        assert_eq!(policy.lagging_within_secs(), 150);
        assert_eq!(policy.classify(Some(61)), Freshness::Lagging);
    }
}
