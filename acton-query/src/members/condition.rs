//! Member search criteria

use serde::{Deserialize, Serialize};

use super::entity::{member, team};
use crate::query::{compose, fragment, FilterExpression};

/// Optional member search fields
///
/// Every field is independent; an unset field places no constraint. Blank
/// text counts as unset.
///
/// # Example
///
/// ```rust
/// use acton_query::members::MemberSearchCondition;
///
/// let condition = MemberSearchCondition::default()
///     .with_team_name("teamB")
///     .with_age_goe(20);
/// assert_eq!(condition.to_filter().len(), 2);
/// assert!(MemberSearchCondition::default().to_filter().is_match_all());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MemberSearchCondition {
    /// Exact username
    pub username: Option<String>,
    /// Exact team name; implies a join on `team`
    pub team_name: Option<String>,
    /// Minimum age, inclusive
    pub age_goe: Option<i32>,
    /// Maximum age, inclusive
    pub age_loe: Option<i32>,
}

impl MemberSearchCondition {
    /// Match this username exactly
    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Match members of the named team
    #[must_use]
    pub fn with_team_name(mut self, team_name: impl Into<String>) -> Self {
        self.team_name = Some(team_name.into());
        self
    }

    /// Minimum age, inclusive
    #[must_use]
    pub fn with_age_goe(mut self, age: i32) -> Self {
        self.age_goe = Some(age);
        self
    }

    /// Maximum age, inclusive
    #[must_use]
    pub fn with_age_loe(mut self, age: i32) -> Self {
        self.age_loe = Some(age);
        self
    }

    /// The filter built from the set fields
    pub fn to_filter(&self) -> FilterExpression {
        compose([
            fragment::text_eq(member::USERNAME, self.username.as_deref()),
            fragment::text_eq(team::NAME, self.team_name.as_deref()),
            fragment::goe(member::AGE, self.age_goe),
            fragment::loe(member::AGE, self.age_loe),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_partial() {
        let condition: MemberSearchCondition =
            serde_json::from_str(r#"{"team_name": "teamB", "age_loe": 40}"#).unwrap();
        assert_eq!(condition.team_name.as_deref(), Some("teamB"));
        assert_eq!(condition.age_loe, Some(40));
        assert_eq!(condition.username, None);
        assert_eq!(condition.to_filter().len(), 2);
    }

    #[test]
    fn test_blank_username_is_absent() {
        let condition = MemberSearchCondition::default().with_username("  ");
        assert!(condition.to_filter().is_match_all());
    }

    #[test]
    fn test_filter_text() {
        let condition = MemberSearchCondition::default()
            .with_age_goe(20)
            .with_age_loe(40)
            .with_team_name("teamB");
        assert_eq!(
            condition.to_filter().to_string(),
            "team.name = 'teamB' AND member.age >= 20 AND member.age <= 40"
        );
    }
}
