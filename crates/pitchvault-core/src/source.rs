use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Football data sources the loader knows how to pull from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceId {
    Fbref,
    Fotmob,
    Understat,
    Whoscored,
    Sofascore,
    Espn,
    Clubelo,
    Matchhistory,
    Sofifa,
}

impl SourceId {
    pub const ALL: [Self; 9] = [
        Self::Fbref,
        Self::Fotmob,
        Self::Understat,
        Self::Whoscored,
        Self::Sofascore,
        Self::Espn,
        Self::Clubelo,
        Self::Matchhistory,
        Self::Sofifa,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fbref => "fbref",
            Self::Fotmob => "fotmob",
            Self::Understat => "understat",
            Self::Whoscored => "whoscored",
            Self::Sofascore => "sofascore",
            Self::Espn => "espn",
            Self::Clubelo => "clubelo",
            Self::Matchhistory => "matchhistory",
            Self::Sofifa => "sofifa",
        }
    }
}

impl Display for SourceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceId {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|source| source.as_str() == normalized)
            .ok_or(ValidationError::InvalidSource { value: normalized })
    }
}
