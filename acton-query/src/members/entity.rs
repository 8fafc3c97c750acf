//! Member and team entities with their static metadata

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::query::{Entity, EntityDef, FromRecord, QueryResult, Record, Reference};

/// Team table metadata
pub static TEAM: EntityDef = EntityDef {
    alias: "team",
    table: "team",
    key: "id",
    columns: &["id", "name"],
    references: &[],
};

/// Member table metadata; `team` is a nullable many-to-one reference
pub static MEMBER: EntityDef = EntityDef {
    alias: "member",
    table: "member",
    key: "id",
    columns: &["id", "username", "age", "team_id"],
    references: &[Reference {
        name: "team",
        foreign_key: "team_id",
        target: &TEAM,
    }],
};

/// Columns of `member` as the query root
pub mod member {
    use crate::query::Column;

    /// `member.id`
    pub const ID: Column = Column::new("member", "id");
    /// `member.username`, nullable
    pub const USERNAME: Column = Column::new("member", "username");
    /// `member.age`
    pub const AGE: Column = Column::new("member", "age");
    /// `member.team_id`, nullable
    pub const TEAM_ID: Column = Column::new("member", "team_id");
}

/// Columns of the joined `team` reference
pub mod team {
    use crate::query::Column;

    /// `team.id`
    pub const ID: Column = Column::new("team", "id");
    /// `team.name`
    pub const NAME: Column = Column::new("team", "name");
}

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// The raw identity value
            pub fn get(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

entity_id!(
    /// Identity of a [`Member`], assigned by the storage collaborator
    MemberId
);
entity_id!(
    /// Identity of a [`Team`], assigned by the storage collaborator
    TeamId
);

/// A team
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    /// Identity
    pub id: TeamId,
    /// Team name
    pub name: String,
}

impl FromRecord for Team {
    fn from_record(record: &Record) -> QueryResult<Self> {
        Ok(Self {
            id: TeamId(record.get("id")?),
            name: record.get("name")?,
        })
    }
}

impl Entity for Team {
    fn def() -> &'static EntityDef {
        &TEAM
    }
}

/// A member's team: either fetched in the same round trip or known only by id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamRef {
    /// Only the foreign key was read
    Unloaded(TeamId),
    /// The team was fetched eagerly
    Loaded(Team),
}

impl TeamRef {
    /// Whether the team was materialized
    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded(_))
    }

    /// The loaded team, if any
    pub fn loaded(&self) -> Option<&Team> {
        match self {
            Self::Loaded(team) => Some(team),
            Self::Unloaded(_) => None,
        }
    }

    /// Identity of the team, loaded or not
    pub fn id(&self) -> TeamId {
        match self {
            Self::Unloaded(id) => *id,
            Self::Loaded(team) => team.id,
        }
    }
}

/// A member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    /// Identity
    pub id: MemberId,
    /// Login name, nullable
    pub username: Option<String>,
    /// Age in years
    pub age: i32,
    /// The member's team; `None` when `team_id` is NULL
    pub team: Option<TeamRef>,
}

impl FromRecord for Member {
    fn from_record(record: &Record) -> QueryResult<Self> {
        let team_id: Option<i64> = record.get("team_id")?;
        let team = match team_id {
            None => None,
            Some(_) if record.contains("team.id") => {
                Some(TeamRef::Loaded(Team::from_record(&record.nested("team"))?))
            }
            Some(id) => Some(TeamRef::Unloaded(TeamId(id))),
        };
        Ok(Self {
            id: MemberId(record.get("id")?),
            username: record.get("username")?,
            age: record.get("age")?,
            team,
        })
    }
}

impl Entity for Member {
    fn def() -> &'static EntityDef {
        &MEMBER
    }
}

/// Input for a new member
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NewMember {
    /// Login name, nullable
    pub username: Option<String>,
    /// Age in years
    pub age: i32,
    /// Team to join, if any
    pub team_id: Option<TeamId>,
}

impl NewMember {
    /// Member with a username and age and no team
    pub fn new(username: impl Into<String>, age: i32) -> Self {
        Self {
            username: Some(username.into()),
            age,
            team_id: None,
        }
    }

    /// Assign the member to a team
    #[must_use]
    pub fn with_team(mut self, team: TeamId) -> Self {
        self.team_id = Some(team);
        self
    }
}

/// Input for a new team
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTeam {
    /// Team name
    pub name: String,
}

impl NewTeam {
    /// Team with a name
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}
