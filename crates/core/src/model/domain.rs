use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown question domain: {0:?}")]
pub struct DomainParseError(pub String);

/// Fixed set of question categories.
///
/// Wire/storage form is the snake_case name (`general_knowledge`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Aptitude,
    Reasoning,
    Verbal,
    Technical,
    GeneralKnowledge,
}

impl Domain {
    /// All domains in display order.
    pub const ALL: [Domain; 5] = [
        Domain::Aptitude,
        Domain::Reasoning,
        Domain::Verbal,
        Domain::Technical,
        Domain::GeneralKnowledge,
    ];

    /// Domains offered as one-tap starting points on the dashboard.
    pub const QUICK_START: [Domain; 3] = [Domain::Aptitude, Domain::Reasoning, Domain::Technical];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Domain::Aptitude => "aptitude",
            Domain::Reasoning => "reasoning",
            Domain::Verbal => "verbal",
            Domain::Technical => "technical",
            Domain::GeneralKnowledge => "general_knowledge",
        }
    }

    /// Human-readable label, e.g. "General Knowledge".
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Domain::Aptitude => "Aptitude",
            Domain::Reasoning => "Reasoning",
            Domain::Verbal => "Verbal",
            Domain::Technical => "Technical",
            Domain::GeneralKnowledge => "General Knowledge",
        }
    }

    /// Interprets a user-supplied filter.
    ///
    /// Unknown or empty values mean "no filter" instead of an error, so a stale
    /// link with a bad domain still starts a quiz across all domains.
    #[must_use]
    pub fn from_filter(raw: Option<&str>) -> Option<Self> {
        raw.and_then(|value| value.parse().ok())
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = DomainParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "aptitude" => Ok(Domain::Aptitude),
            "reasoning" => Ok(Domain::Reasoning),
            "verbal" => Ok(Domain::Verbal),
            "technical" => Ok(Domain::Technical),
            "general_knowledge" => Ok(Domain::GeneralKnowledge),
            other => Err(DomainParseError(other.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_known_domain() {
        for domain in Domain::ALL {
            assert_eq!(domain.as_str().parse::<Domain>().unwrap(), domain);
        }
    }

    #[test]
    fn parsing_is_exact() {
        assert!("Aptitude".parse::<Domain>().is_err());
        assert!("general knowledge".parse::<Domain>().is_err());
    }

    #[test]
    fn unknown_filter_is_ignored() {
        assert_eq!(Domain::from_filter(Some("astrology")), None);
        assert_eq!(Domain::from_filter(Some("")), None);
        assert_eq!(Domain::from_filter(None), None);
        assert_eq!(Domain::from_filter(Some("verbal")), Some(Domain::Verbal));
    }

    #[test]
    fn labels_are_title_cased() {
        assert_eq!(Domain::GeneralKnowledge.label(), "General Knowledge");
    }
}
