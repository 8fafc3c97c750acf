//! Flat member projections

use serde::{Deserialize, Serialize};

use super::entity::{member, team};
use crate::query::{Binding, FieldsShape, FromRecord, Projection, QueryResult, Record};

/// A member row joined with its team, flattened
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberTeamDto {
    /// `member.id`
    pub member_id: i64,
    /// `member.username`
    pub username: Option<String>,
    /// `member.age`
    pub age: i32,
    /// `team.id`; `None` for a member without a team
    pub team_id: Option<i64>,
    /// `team.name`; `None` for a member without a team
    pub team_name: Option<String>,
}

impl MemberTeamDto {
    /// `member.id → member_id`, `team.id → team_id`, `team.name → team_name`
    pub fn shape() -> QueryResult<FieldsShape<Self>> {
        FieldsShape::new([
            Binding::new(member::ID, "member_id"),
            member::USERNAME.into(),
            member::AGE.into(),
            Binding::new(team::ID, "team_id"),
            Binding::new(team::NAME, "team_name"),
        ])
    }
}

impl FromRecord for MemberTeamDto {
    fn from_record(record: &Record) -> QueryResult<Self> {
        Ok(Self {
            member_id: record.get("member_id")?,
            username: record.get("username")?,
            age: record.get("age")?,
            team_id: record.get("team_id")?,
            team_name: record.get("team_name")?,
        })
    }
}

impl Projection for MemberTeamDto {
    const FIELDS: &'static [&'static str] =
        &["member_id", "username", "age", "team_id", "team_name"];
}

/// Username and age only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberDto {
    /// `member.username`
    pub username: Option<String>,
    /// `member.age`
    pub age: i32,
}

impl MemberDto {
    /// Fields bound by name
    pub fn shape() -> QueryResult<FieldsShape<Self>> {
        FieldsShape::new([member::USERNAME.into(), member::AGE.into()])
    }
}

impl FromRecord for MemberDto {
    fn from_record(record: &Record) -> QueryResult<Self> {
        Ok(Self {
            username: record.get("username")?,
            age: record.get("age")?,
        })
    }
}

impl Projection for MemberDto {
    const FIELDS: &'static [&'static str] = &["username", "age"];
}

/// A member under different field names: `username → name`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserDto {
    /// `member.username`
    pub name: Option<String>,
    /// `member.age`
    pub age: i32,
}

impl UserDto {
    /// `username` bound to `name`
    pub fn shape() -> QueryResult<FieldsShape<Self>> {
        FieldsShape::new([Binding::new(member::USERNAME, "name"), member::AGE.into()])
    }
}

impl FromRecord for UserDto {
    fn from_record(record: &Record) -> QueryResult<Self> {
        Ok(Self {
            name: record.get("name")?,
            age: record.get("age")?,
        })
    }
}

impl Projection for UserDto {
    const FIELDS: &'static [&'static str] = &["name", "age"];
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryErrorKind;

    #[test]
    fn test_shapes_bind_every_field() {
        assert!(MemberTeamDto::shape().is_ok());
        assert!(MemberDto::shape().is_ok());
        assert!(UserDto::shape().is_ok());
    }

    #[test]
    fn test_two_ids_to_one_name_is_mapping_error() {
        let error = FieldsShape::<MemberTeamDto>::new([
            Binding::new(member::ID, "member_id"),
            Binding::new(team::ID, "member_id"),
            member::USERNAME.into(),
            member::AGE.into(),
            Binding::new(team::NAME, "team_name"),
        ])
        .unwrap_err();
        assert_eq!(error.kind, QueryErrorKind::MappingFailed);
        assert!(error.message.contains("bound twice"));
    }

    #[test]
    fn test_unbound_field_is_mapping_error() {
        let error = FieldsShape::<UserDto>::new([member::AGE.into()]).unwrap_err();
        assert_eq!(error.kind, QueryErrorKind::MappingFailed);
        assert!(error.message.contains("`name`"));
    }

    #[test]
    fn test_null_team_maps_to_none() {
        let record = Record::new()
            .with("member_id", 1)
            .with("username", "member1")
            .with("age", 10)
            .with("team_id", crate::query::Value::Null)
            .with("team_name", crate::query::Value::Null);
        let dto = MemberTeamDto::from_record(&record).unwrap();
        assert_eq!(dto.team_id, None);
        assert_eq!(dto.team_name, None);
    }
}
