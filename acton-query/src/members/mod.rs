//! Members and teams: the searchable domain
//!
//! A `member` optionally belongs to a `team`. [`MemberRepository`] answers
//! searches built from a [`MemberSearchCondition`], projecting rows into
//! [`MemberTeamDto`]s or whole [`Member`] entities.

mod condition;
mod dto;
mod entity;
mod repository;

pub use condition::MemberSearchCondition;
pub use dto::{MemberDto, MemberTeamDto, UserDto};
pub use entity::{
    member, team, Member, MemberId, NewMember, NewTeam, Team, TeamId, TeamRef, MEMBER, TEAM,
};
pub use repository::{MemberRepository, SearchRepository};
