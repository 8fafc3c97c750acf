//! Member search repository
//!
//! [`SearchRepository`] is the read interface callers program against;
//! [`MemberRepository`] implements it over any [`Storage`] collaborator and
//! adds writes when the collaborator also implements [`Persistence`].
//!
//! # Example
//!
//! ```rust
//! use acton_query::members::{
//!     MemberRepository, MemberSearchCondition, NewMember, NewTeam, SearchRepository,
//! };
//! use acton_query::storage::MemoryStore;
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let repo = MemberRepository::new(MemoryStore::new());
//! let team = repo.save_team(NewTeam::new("teamA")).await?;
//! repo.save(NewMember::new("member1", 10).with_team(team.id)).await?;
//!
//! let found = repo
//!     .search(&MemberSearchCondition::default().with_team_name("teamA"))
//!     .await?;
//! assert_eq!(found.len(), 1);
//! assert_eq!(found[0].team_name.as_deref(), Some("teamA"));
//! # Ok::<(), acton_query::query::QueryError>(())
//! # }).unwrap();
//! ```

use std::future::Future;

use tracing::{debug, instrument};

use super::condition::MemberSearchCondition;
use super::dto::MemberTeamDto;
use super::entity::{
    member, team, Member, MemberId, NewMember, NewTeam, Team, TeamId, TeamRef, MEMBER, TEAM,
};
use crate::query::{
    EntityShape, Expr, FilterExpression, JoinRequest, PageResult, Predicate, Query, QueryExecutor,
    QueryResult, SortKey, SortSpec, TupleShape,
};
use crate::storage::{Assignment, Persistence, Storage};

/// Read operations over one searchable entity
///
/// Uses RPITIT (Return Position Impl Trait In Traits) for async methods
/// without `async_trait`.
///
/// # Type Parameters
///
/// - `Id`: identity of the entity
/// - `Entity`: the full entity returned by identity lookups
/// - `Condition`: optional search criteria
/// - `Item`: the projection returned by searches
pub trait SearchRepository<Id, Entity, Condition, Item>: Send + Sync {
    /// Find an entity by its identity
    ///
    /// Returns `Ok(None)` if nothing matches.
    fn find_by_id(&self, id: Id) -> impl Future<Output = QueryResult<Option<Entity>>> + Send;

    /// Every item matching the set criteria; unset criteria place no constraint
    fn search(
        &self,
        condition: &Condition,
    ) -> impl Future<Output = QueryResult<Vec<Item>>> + Send;

    /// One window of matching items plus the total match count.
    ///
    /// Ties in `sort` are broken by identity, so windows never overlap.
    fn page(
        &self,
        condition: &Condition,
        sort: &SortSpec,
        offset: i64,
        limit: i64,
    ) -> impl Future<Output = QueryResult<PageResult<Item>>> + Send;

    /// Number of matching items
    fn count(&self, condition: &Condition) -> impl Future<Output = QueryResult<u64>> + Send;
}

/// Member queries over a storage collaborator
#[derive(Debug, Clone)]
pub struct MemberRepository<S> {
    executor: QueryExecutor<S>,
}

impl<S: Storage> MemberRepository<S> {
    /// Repository with default query limits
    pub fn new(storage: S) -> Self {
        Self::with_executor(QueryExecutor::new(storage))
    }

    /// Repository over a configured executor
    pub fn with_executor(executor: QueryExecutor<S>) -> Self {
        Self { executor }
    }

    /// The underlying executor, for ad-hoc queries
    pub fn executor(&self) -> &QueryExecutor<S> {
        &self.executor
    }

    fn search_query(condition: &MemberSearchCondition) -> Query {
        Query::select_from(&MEMBER)
            .filter(condition.to_filter())
            .join(JoinRequest::left("team"))
    }

    /// Every member in identity order, teams unloaded
    pub async fn find_all(&self) -> QueryResult<Vec<Member>> {
        self.executor
            .fetch_list(
                &EntityShape::<Member>::new(),
                &Query::select_from(&MEMBER),
                &SortKey::asc(member::ID).into(),
            )
            .await
    }

    /// Every member in identity order with its team fetched in the same round trip
    pub async fn find_all_with_team(&self) -> QueryResult<Vec<Member>> {
        let query = Query::select_from(&MEMBER).join(JoinRequest::left("team").fetch());
        self.executor
            .fetch_list(&EntityShape::<Member>::new(), &query, &SortKey::asc(member::ID).into())
            .await
    }

    /// Members with exactly this username
    pub async fn find_by_username(&self, username: &str) -> QueryResult<Vec<Member>> {
        let query = Query::select_from(&MEMBER).and(Predicate::eq(member::USERNAME, username));
        self.executor
            .fetch_list(&EntityShape::<Member>::new(), &query, &SortKey::asc(member::ID).into())
            .await
    }

    /// Average member age per team name, members without a team grouped under `None`
    pub async fn average_age_by_team(&self) -> QueryResult<Vec<(Option<String>, f64)>> {
        let shape = TupleShape::new([team::NAME.into(), Expr::avg(member::AGE)]);
        let query = Query::select_from(&MEMBER).group_by(team::NAME);
        let rows = self
            .executor
            .fetch_list(&shape, &query, &SortKey::asc(team::NAME).into())
            .await?;
        rows.iter()
            .map(|row| Ok((row.at(0)?, row.at(1)?)))
            .collect()
    }
}

impl<S: Storage> SearchRepository<MemberId, Member, MemberSearchCondition, MemberTeamDto>
    for MemberRepository<S>
{
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: MemberId) -> QueryResult<Option<Member>> {
        let query = Query::select_from(&MEMBER).and(Predicate::eq(member::ID, id.get()));
        self.executor.fetch_one(&EntityShape::<Member>::new(), &query).await
    }

    #[instrument(skip(self))]
    async fn search(&self, condition: &MemberSearchCondition) -> QueryResult<Vec<MemberTeamDto>> {
        let items = self
            .executor
            .fetch_list(
                &MemberTeamDto::shape()?,
                &Self::search_query(condition),
                &SortKey::asc(member::ID).into(),
            )
            .await?;
        debug!(found = items.len(), "member search");
        Ok(items)
    }

    #[instrument(skip(self, sort), fields(sort = %sort))]
    async fn page(
        &self,
        condition: &MemberSearchCondition,
        sort: &SortSpec,
        offset: i64,
        limit: i64,
    ) -> QueryResult<PageResult<MemberTeamDto>> {
        let sort = sort.clone().then(SortKey::asc(member::ID));
        self.executor
            .fetch_page(
                &MemberTeamDto::shape()?,
                &Self::search_query(condition),
                &sort,
                offset,
                limit,
            )
            .await
    }

    #[instrument(skip(self))]
    async fn count(&self, condition: &MemberSearchCondition) -> QueryResult<u64> {
        self.executor.count(&Self::search_query(condition)).await
    }
}

impl<S: Storage + Persistence> MemberRepository<S> {
    /// Persist a new member; the collaborator assigns its identity
    pub async fn save(&self, new: NewMember) -> QueryResult<Member> {
        let id = self
            .executor
            .insert(
                &MEMBER,
                vec![
                    ("username", new.username.clone().into()),
                    ("age", new.age.into()),
                    ("team_id", new.team_id.map(TeamId::get).into()),
                ],
            )
            .await?;
        Ok(Member {
            id: MemberId(id),
            username: new.username,
            age: new.age,
            team: new.team_id.map(TeamRef::Unloaded),
        })
    }

    /// Persist a new team
    pub async fn save_team(&self, new: NewTeam) -> QueryResult<Team> {
        let id = self
            .executor
            .insert(&TEAM, vec![("name", new.name.clone().into())])
            .await?;
        Ok(Team {
            id: TeamId(id),
            name: new.name,
        })
    }

    /// Add `amount` to the age of every member younger than `age`.
    ///
    /// Members read before the call keep their old ages.
    pub async fn add_age_below(&self, age: i32, amount: i32) -> QueryResult<u64> {
        let filter = FilterExpression::from(Predicate::lt(member::AGE, age));
        let assignments = [Assignment::set(
            member::AGE.name,
            Expr::add(member::AGE, amount),
        )];
        self.executor
            .bulk_update(&MEMBER, &filter, &assignments)
            .await
    }

    /// Delete every member older than `age`
    pub async fn delete_older_than(&self, age: i32) -> QueryResult<u64> {
        let filter = FilterExpression::from(Predicate::gt(member::AGE, age));
        self.executor.bulk_delete(&MEMBER, &filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::members::dto::{MemberDto, UserDto};
    use crate::query::{Binding, FieldsShape, QueryErrorKind, ScalarShape};
    use crate::storage::MemoryStore;

    /// teamA: member1 (10), member2 (20); teamB: member3 (30), member4 (40)
    async fn seeded() -> MemberRepository<MemoryStore> {
        let repo = MemberRepository::new(MemoryStore::new());
        let team_a = repo.save_team(NewTeam::new("teamA")).await.unwrap();
        let team_b = repo.save_team(NewTeam::new("teamB")).await.unwrap();
        for (name, age, team) in [
            ("member1", 10, team_a.id),
            ("member2", 20, team_a.id),
            ("member3", 30, team_b.id),
            ("member4", 40, team_b.id),
        ] {
            repo.save(NewMember::new(name, age).with_team(team))
                .await
                .unwrap();
        }
        repo
    }

    fn usernames(items: &[MemberTeamDto]) -> Vec<&str> {
        items
            .iter()
            .map(|dto| dto.username.as_deref().unwrap_or("<null>"))
            .collect()
    }

    #[tokio::test]
    async fn test_empty_condition_returns_everything() {
        let repo = seeded().await;
        let all = repo.search(&MemberSearchCondition::default()).await.unwrap();
        assert_eq!(usernames(&all), ["member1", "member2", "member3", "member4"]);
    }

    #[tokio::test]
    async fn test_search_by_team_and_age_range() {
        let repo = seeded().await;
        let condition = MemberSearchCondition::default()
            .with_age_goe(20)
            .with_age_loe(40)
            .with_team_name("teamB");
        let found = repo.search(&condition).await.unwrap();
        assert_eq!(usernames(&found), ["member3", "member4"]);
        assert_eq!(found[0].team_name.as_deref(), Some("teamB"));
        assert_eq!(found[0].team_id, Some(2));
    }

    #[tokio::test]
    async fn test_satisfied_constraint_never_grows_results() {
        let repo = seeded().await;
        let base = MemberSearchCondition::default().with_age_goe(15);
        let before = repo.count(&base).await.unwrap();
        let narrowed = repo.count(&base.clone().with_team_name("teamA")).await.unwrap();
        let satisfied = repo.count(&base.clone().with_age_loe(100)).await.unwrap();
        assert_eq!(before, 3);
        assert_eq!(narrowed, 1);
        assert_eq!(satisfied, before);
    }

    #[tokio::test]
    async fn test_zero_bound_is_a_constraint() {
        let repo = seeded().await;
        let condition = MemberSearchCondition::default().with_age_loe(0);
        assert!(repo.search(&condition).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_page_total_is_window_invariant() {
        let repo = seeded().await;
        let condition = MemberSearchCondition::default();
        let sort = SortSpec::new();

        let page = repo.page(&condition, &sort, 1, 2).await.unwrap();
        assert_eq!(usernames(&page.items), ["member2", "member3"]);
        assert_eq!(page.total, 4);
        assert_eq!((page.offset, page.limit), (1, 2));
        assert!(page.has_next());

        for (offset, limit) in [(0, 1), (3, 10), (10, 5)] {
            let other = repo.page(&condition, &sort, offset, limit).await.unwrap();
            assert_eq!(other.total, 4);
        }
        let beyond = repo.page(&condition, &sort, 10, 5).await.unwrap();
        assert!(beyond.items.is_empty());
    }

    #[tokio::test]
    async fn test_page_sorted_desc() {
        let repo = seeded().await;
        let page = repo
            .page(
                &MemberSearchCondition::default(),
                &SortKey::desc(member::AGE).into(),
                0,
                2,
            )
            .await
            .unwrap();
        assert_eq!(usernames(&page.items), ["member4", "member3"]);
    }

    #[tokio::test]
    async fn test_negative_page_rejected() {
        let repo = seeded().await;
        let error = repo
            .page(&MemberSearchCondition::default(), &SortSpec::new(), 0, -1)
            .await
            .unwrap_err();
        assert_eq!(error.kind, QueryErrorKind::ValidationFailed);
    }

    #[tokio::test]
    async fn test_find_by_id_returns_saved_member() {
        let repo = seeded().await;
        let team = repo.save_team(NewTeam::new("teamC")).await.unwrap();
        let saved = repo
            .save(NewMember::new("member5", 50).with_team(team.id))
            .await
            .unwrap();
        let found = repo.find_by_id(saved.id).await.unwrap();
        assert_eq!(found, Some(saved));
        assert_eq!(repo.find_by_id(MemberId(999)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_find_by_username() {
        let repo = seeded().await;
        let found = repo.find_by_username("member2").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].age, 20);
    }

    #[tokio::test]
    async fn test_fetch_join_loads_team() {
        let repo = seeded().await;

        let plain = repo.find_all().await.unwrap();
        assert!(plain
            .iter()
            .all(|m| m.team.as_ref().is_some_and(|t| !t.is_loaded())));

        let fetched = repo.find_all_with_team().await.unwrap();
        assert!(fetched
            .iter()
            .all(|m| m.team.as_ref().is_some_and(TeamRef::is_loaded)));
        assert_eq!(
            fetched[3].team.as_ref().and_then(TeamRef::loaded).map(|t| t.name.as_str()),
            Some("teamB")
        );
    }

    #[tokio::test]
    async fn test_member_without_team_survives_left_join() {
        let repo = seeded().await;
        repo.save(NewMember::new("loner", 5)).await.unwrap();

        let all = repo.search(&MemberSearchCondition::default()).await.unwrap();
        assert_eq!(all.len(), 5);
        assert_eq!(all[4].team_name, None);

        let fetched = repo.find_all_with_team().await.unwrap();
        assert_eq!(fetched[4].team, None);
    }

    #[tokio::test]
    async fn test_aggregates() {
        let repo = seeded().await;
        let shape = TupleShape::new([
            Expr::count_all(),
            Expr::sum(member::AGE),
            Expr::avg(member::AGE),
            Expr::max(member::AGE),
            Expr::min(member::AGE),
        ]);
        let row = repo
            .executor()
            .fetch_one(&shape, &Query::select_from(&MEMBER))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.get::<i64>(&Expr::count_all()).unwrap(), 4);
        assert_eq!(row.get::<i64>(&Expr::sum(member::AGE)).unwrap(), 100);
        assert_eq!(row.get::<f64>(&Expr::avg(member::AGE)).unwrap(), 25.0);
        assert_eq!(row.get::<i32>(&Expr::max(member::AGE)).unwrap(), 40);
        assert_eq!(row.get::<i32>(&Expr::min(member::AGE)).unwrap(), 10);
    }

    #[tokio::test]
    async fn test_group_by_team() {
        let repo = seeded().await;
        let averages = repo.average_age_by_team().await.unwrap();
        assert_eq!(
            averages,
            vec![
                (Some("teamA".to_string()), 15.0),
                (Some("teamB".to_string()), 35.0)
            ]
        );
    }

    #[tokio::test]
    async fn test_bulk_update_leaves_loaded_entities_stale() {
        let repo = seeded().await;
        let before = repo.find_all().await.unwrap();

        assert_eq!(repo.add_age_below(28, 1).await.unwrap(), 2);

        assert_eq!(before[0].age, 10);
        let after = repo.find_all().await.unwrap();
        let ages: Vec<i32> = after.iter().map(|m| m.age).collect();
        assert_eq!(ages, [11, 21, 30, 40]);
    }

    #[tokio::test]
    async fn test_bulk_delete() {
        let repo = seeded().await;
        assert_eq!(repo.delete_older_than(18).await.unwrap(), 3);
        let remaining = repo.find_all().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].username.as_deref(), Some("member1"));
    }

    #[tokio::test]
    async fn test_null_username_sorts_last() {
        let repo = MemberRepository::new(MemoryStore::new());
        repo.save(NewMember {
            username: None,
            age: 100,
            team_id: None,
        })
        .await
        .unwrap();
        repo.save(NewMember::new("member5", 100)).await.unwrap();
        repo.save(NewMember::new("member6", 100)).await.unwrap();

        let sort = SortSpec::new()
            .then(SortKey::desc(member::AGE))
            .then(SortKey::asc(member::USERNAME).nulls_last());
        let names = repo
            .executor()
            .fetch_list(
                &ScalarShape::<Option<String>>::new(member::USERNAME),
                &Query::select_from(&MEMBER).and(Predicate::eq(member::AGE, 100)),
                &sort,
            )
            .await
            .unwrap();
        assert_eq!(
            names,
            vec![Some("member5".to_string()), Some("member6".to_string()), None]
        );
    }

    #[tokio::test]
    async fn test_dto_projections() {
        let repo = seeded().await;
        let query = Query::select_from(&MEMBER).and(Predicate::eq(member::USERNAME, "member1"));

        let dto = repo
            .executor()
            .fetch_one(&MemberDto::shape().unwrap(), &query)
            .await
            .unwrap();
        assert_eq!(
            dto,
            Some(MemberDto {
                username: Some("member1".to_string()),
                age: 10
            })
        );

        let user = repo
            .executor()
            .fetch_one(&UserDto::shape().unwrap(), &query)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.name.as_deref(), Some("member1"));
    }

    #[tokio::test]
    async fn test_concat_and_lower_projection() {
        let repo = seeded().await;
        let shape = TupleShape::new([
            Expr::concat([member::USERNAME.into(), Expr::from("_"), Expr::text(member::AGE)]),
            Expr::lower(team::NAME),
        ]);
        let row = repo
            .executor()
            .fetch_first(&shape, &Query::select_from(&MEMBER), &SortKey::asc(member::ID).into())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.at::<String>(0).unwrap(), "member1_10");
        assert_eq!(row.at::<String>(1).unwrap(), "teama");
    }

    #[tokio::test]
    async fn test_ids_bound_apart_map_cleanly() {
        #[derive(Debug)]
        struct Ids {
            member_id: i64,
            team_id: Option<i64>,
        }
        impl crate::query::FromRecord for Ids {
            fn from_record(record: &crate::query::Record) -> QueryResult<Self> {
                Ok(Self {
                    member_id: record.get("member_id")?,
                    team_id: record.get("team_id")?,
                })
            }
        }
        impl crate::query::Projection for Ids {
            const FIELDS: &'static [&'static str] = &["member_id", "team_id"];
        }

        let repo = seeded().await;
        let shape = FieldsShape::<Ids>::new([
            Binding::new(member::ID, "member_id"),
            Binding::new(team::ID, "team_id"),
        ])
        .unwrap();
        let rows = repo
            .executor()
            .fetch_list(&shape, &Query::select_from(&MEMBER), &SortKey::asc(member::ID).into())
            .await
            .unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[2].member_id, 3);
        assert_eq!(rows[2].team_id, Some(2));
    }

    #[tokio::test]
    async fn test_type_mismatch_is_mapping_error() {
        let repo = seeded().await;
        let error = repo
            .executor()
            .fetch_list(
                &ScalarShape::<i64>::new(member::USERNAME),
                &Query::select_from(&MEMBER),
                &SortSpec::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(error.kind, QueryErrorKind::MappingFailed);
    }
}
