//! Mission entity - a campaign objective tracked across turns

use serde::{Deserialize, Serialize};

use crate::MissionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MissionStatus {
    #[default]
    Active,
    Completed,
    Failed,
}

impl std::fmt::Display for MissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MissionStatus::Active => write!(f, "active"),
            MissionStatus::Completed => write!(f, "completed"),
            MissionStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for MissionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(MissionStatus::Active),
            "completed" | "complete" => Ok(MissionStatus::Completed),
            "failed" => Ok(MissionStatus::Failed),
            _ => Err(format!("Unknown mission status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mission {
    pub id: MissionId,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub status: MissionStatus,
}

impl Mission {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: MissionId::new(),
            name: name.into(),
            description: description.into(),
            status: MissionStatus::Active,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == MissionStatus::Active
    }
}
