use std::fmt;

use chrono::NaiveDateTime;
use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Deserializer, Serialize};

/// Skill tier code such as `"B"`. Compared by exact string equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String")]
pub struct RatingLevel(String);

impl RatingLevel {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for RatingLevel {
    fn from(code: String) -> Self {
        Self::new(code)
    }
}

/// Optional level where a blank code means no level at all.
pub fn deserialize_optional_level<'de, D>(deserializer: D) -> Result<Option<RatingLevel>, D::Error>
where
    D: Deserializer<'de>,
{
    let level = Option::<RatingLevel>::deserialize(deserializer)?;
    Ok(level.filter(|r| !r.as_str().is_empty()))
}

impl fmt::Display for RatingLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl ToSql for RatingLevel {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0.as_str()))
    }
}

impl FromSql for RatingLevel {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value.as_str().map(RatingLevel::new)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub id: String,
    pub display_name: String,
    pub phone: String,
    pub rating: Option<RatingLevel>,
    pub is_coach: bool,
    pub is_staff: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewPlayer {
    pub display_name: String,
    pub phone: String,
    #[serde(default, deserialize_with = "deserialize_optional_level")]
    pub rating: Option<RatingLevel>,
    #[serde(default)]
    pub is_coach: bool,
    #[serde(default)]
    pub is_staff: bool,
}

/// Who is performing an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    Player(String),
    Staff(String),
    System,
}

impl Actor {
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Actor::Player(id) | Actor::Staff(id) => Some(id),
            Actor::System => None,
        }
    }

    /// Staff and system callers may use administrative override paths.
    pub fn is_privileged(&self) -> bool {
        matches!(self, Actor::Staff(_) | Actor::System)
    }

    pub fn is(&self, user_id: &str) -> bool {
        self.user_id() == Some(user_id)
    }

    /// Label written into history entries.
    pub fn label(&self) -> String {
        match self {
            Actor::Player(id) => id.clone(),
            Actor::Staff(id) => format!("staff:{id}"),
            Actor::System => "system".to_string(),
        }
    }
}
