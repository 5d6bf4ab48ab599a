use serde::{Deserialize, Serialize};

use crate::model::ids::UserId;

/// Name shown when a profile has no display name.
pub const FALLBACK_DISPLAY_NAME: &str = "Learner";

/// Answered-question count that unlocks the completion achievement.
pub const ACHIEVEMENT_THRESHOLD: u64 = 100;

/// Number of questions in the daily challenge.
pub const DAILY_GOAL: u32 = 10;

/// A user's public profile.
///
/// `total_points` and `current_streak` are maintained by the backing store;
/// the core only reads them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: UserId,
    #[serde(rename = "full_name")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub current_streak: u32,
    #[serde(default)]
    pub total_points: u64,
}

impl Profile {
    #[must_use]
    pub fn new(id: UserId, display_name: Option<String>) -> Self {
        Self {
            id,
            display_name,
            current_streak: 0,
            total_points: 0,
        }
    }

    /// Display name, falling back to [`FALLBACK_DISPLAY_NAME`] when unset or blank.
    #[must_use]
    pub fn display_name_or_default(&self) -> &str {
        display_name_or_default(self.display_name.as_deref())
    }
}

/// One row of the global ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    #[serde(rename = "id")]
    pub user_id: UserId,
    #[serde(rename = "full_name")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub total_points: u64,
}

impl LeaderboardEntry {
    #[must_use]
    pub fn display_name_or_default(&self) -> &str {
        display_name_or_default(self.display_name.as_deref())
    }
}

impl From<&Profile> for LeaderboardEntry {
    fn from(p: &Profile) -> Self {
        Self {
            user_id: p.id,
            display_name: p.display_name.clone(),
            total_points: p.total_points,
        }
    }
}

fn display_name_or_default(name: Option<&str>) -> &str {
    match name {
        Some(name) if !name.trim().is_empty() => name,
        _ => FALLBACK_DISPLAY_NAME,
    }
}

/// Orders entries by points, highest first.
///
/// Stable: entries with equal points keep their incoming order.
pub fn rank_by_points(entries: &mut [LeaderboardEntry]) {
    entries.sort_by(|a, b| b.total_points.cmp(&a.total_points));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_name_falls_back() {
        let mut p = Profile::new(UserId::random(), Some("  ".into()));
        assert_eq!(p.display_name_or_default(), "Learner");
        p.display_name = None;
        assert_eq!(p.display_name_or_default(), "Learner");
        p.display_name = Some("Asha".into());
        assert_eq!(p.display_name_or_default(), "Asha");
    }

    #[test]
    fn ranking_is_descending() {
        let mut entries: Vec<_> = [5_u64, 40, 12, 40, 0]
            .into_iter()
            .map(|points| LeaderboardEntry {
                user_id: UserId::random(),
                display_name: None,
                total_points: points,
            })
            .collect();
        rank_by_points(&mut entries);
        assert!(entries.windows(2).all(|w| w[0].total_points >= w[1].total_points));
        assert_eq!(entries[0].total_points, 40);
        assert_eq!(entries[4].total_points, 0);
    }
}
