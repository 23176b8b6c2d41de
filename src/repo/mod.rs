use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Map, Value};

use crate::auth::Role;
use crate::models::*;

pub mod inmem;
pub mod pg;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RepoError {
    #[error("not found")] NotFound,
    /// Unique constraint hit or optimistic version check lost.
    #[error("conflict")] Conflict,
    #[error("internal: {0}")] Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

/// 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub limit: u32,
}

impl Page {
    pub fn offset(&self) -> u64 { (self.page.saturating_sub(1) as u64) * self.limit as u64 }
}

#[derive(Debug, Clone)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub total: u64,
}

impl<T> Paged<T> {
    pub fn from_sorted(all: Vec<T>, page: Option<Page>) -> Self {
        let total = all.len() as u64;
        let items = match page {
            Some(p) => all.into_iter().skip(p.offset() as usize).take(p.limit as usize).collect(),
            None => all,
        };
        Self { items, total }
    }
}

/// Stored entities that take part in optimistic concurrency control.
pub trait Document: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    fn id(&self) -> Id;
    fn version(&self) -> i64;
    fn set_version(&mut self, version: i64);
    fn created_at(&self) -> DateTime<Utc>;
    fn updated_at(&self) -> DateTime<Utc>;
}

macro_rules! document {
    ($($t:ty),* $(,)?) => {$(
        impl Document for $t {
            fn id(&self) -> Id { self.id }
            fn version(&self) -> i64 { self.version }
            fn set_version(&mut self, version: i64) { self.version = version; }
            fn created_at(&self) -> DateTime<Utc> { self.created_at }
            fn updated_at(&self) -> DateTime<Utc> { self.updated_at }
        }
    )*};
}

document!(User, Category, Service, Issue, Booking, Proposal, ChatRoom);

// ---------------------------------------------------------------- filters
//
// Each filter knows how to test an entity (in-memory backend) and how to
// express itself as JSONB containment documents (Postgres backend). Several
// documents mean "any of".

fn put(map: &mut Map<String, Value>, key: &str, value: impl Serialize) {
    if let Ok(v) = serde_json::to_value(value) {
        map.insert(key.to_string(), v);
    }
}

#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub role: Option<Role>,
}

impl UserFilter {
    pub fn matches(&self, u: &User) -> bool { self.role.map_or(true, |r| u.role == r) }
    pub fn conditions(&self) -> Vec<Value> {
        let mut m = Map::new();
        if let Some(r) = self.role { put(&mut m, "role", r); }
        vec![Value::Object(m)]
    }
}

#[derive(Debug, Clone, Default)]
pub struct ServiceFilter {
    pub provider: Option<Id>,
    pub category: Option<Id>,
    pub active_only: bool,
}

impl ServiceFilter {
    pub fn matches(&self, s: &Service) -> bool {
        self.provider.map_or(true, |p| s.provider == p)
            && self.category.map_or(true, |c| s.category == c)
            && (!self.active_only || s.is_active)
    }
    pub fn conditions(&self) -> Vec<Value> {
        let mut m = Map::new();
        if let Some(p) = self.provider { put(&mut m, "provider", p); }
        if let Some(c) = self.category { put(&mut m, "category", c); }
        if self.active_only { put(&mut m, "is_active", true); }
        vec![Value::Object(m)]
    }
}

#[derive(Debug, Clone, Default)]
pub struct IssueFilter {
    pub consumer: Option<Id>,
    pub assigned_provider: Option<Id>,
    pub status: Option<IssueStatus>,
    pub category: Option<Id>,
    pub priority: Option<Priority>,
}

impl IssueFilter {
    pub fn matches(&self, i: &Issue) -> bool {
        self.consumer.map_or(true, |c| i.consumer == c)
            && self.assigned_provider.map_or(true, |p| i.assigned_provider == Some(p))
            && self.status.map_or(true, |s| i.status == s)
            && self.category.map_or(true, |c| i.category == c)
            && self.priority.map_or(true, |p| i.priority == p)
    }
    pub fn conditions(&self) -> Vec<Value> {
        let mut m = Map::new();
        if let Some(v) = self.consumer { put(&mut m, "consumer", v); }
        if let Some(v) = self.assigned_provider { put(&mut m, "assigned_provider", v); }
        if let Some(v) = self.status { put(&mut m, "status", v); }
        if let Some(v) = self.category { put(&mut m, "category", v); }
        if let Some(v) = self.priority { put(&mut m, "priority", v); }
        vec![Value::Object(m)]
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSortKey {
    #[default]
    CreatedAt,
    Upvotes,
    Priority,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IssueSort {
    pub key: IssueSortKey,
    pub order: SortOrder,
}

impl IssueSort {
    pub fn compare(&self, a: &Issue, b: &Issue) -> std::cmp::Ordering {
        let primary = match self.key {
            IssueSortKey::CreatedAt => a.created_at.cmp(&b.created_at),
            IssueSortKey::Upvotes => a.upvotes.cmp(&b.upvotes),
            IssueSortKey::Priority => a.priority.cmp(&b.priority),
        }
        .then_with(|| a.created_at.cmp(&b.created_at));
        match self.order {
            SortOrder::Asc => primary,
            SortOrder::Desc => primary.reverse(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BookingFilter {
    pub consumer: Option<Id>,
    pub provider: Option<Id>,
    pub status: Option<BookingStatus>,
    pub issue: Option<Id>,
}

impl BookingFilter {
    pub fn matches(&self, b: &Booking) -> bool {
        self.consumer.map_or(true, |c| b.consumer == c)
            && self.provider.map_or(true, |p| b.provider == p)
            && self.status.map_or(true, |s| b.status == s)
            && self.issue.map_or(true, |i| b.issue == Some(i))
    }
    pub fn conditions(&self) -> Vec<Value> {
        let mut m = Map::new();
        if let Some(v) = self.consumer { put(&mut m, "consumer", v); }
        if let Some(v) = self.provider { put(&mut m, "provider", v); }
        if let Some(v) = self.status { put(&mut m, "status", v); }
        if let Some(v) = self.issue { put(&mut m, "issue", v); }
        vec![Value::Object(m)]
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProposalFilter {
    pub booking_id: Option<Id>,
    pub proposed_by: Option<Id>,
    pub proposed_to: Option<Id>,
    /// Either side of the proposal.
    pub party: Option<Id>,
    pub status: Option<ProposalStatus>,
}

impl ProposalFilter {
    pub fn matches(&self, p: &Proposal) -> bool {
        self.booking_id.map_or(true, |b| p.booking_id == b)
            && self.proposed_by.map_or(true, |u| p.proposed_by == u)
            && self.proposed_to.map_or(true, |u| p.proposed_to == u)
            && self.party.map_or(true, |u| p.proposed_by == u || p.proposed_to == u)
            && self.status.map_or(true, |s| p.status == s)
    }
    pub fn conditions(&self) -> Vec<Value> {
        let mut m = Map::new();
        if let Some(v) = self.booking_id { put(&mut m, "booking_id", v); }
        if let Some(v) = self.proposed_by { put(&mut m, "proposed_by", v); }
        if let Some(v) = self.proposed_to { put(&mut m, "proposed_to", v); }
        if let Some(v) = self.status { put(&mut m, "status", v); }
        match self.party {
            None => vec![Value::Object(m)],
            Some(u) => ["proposed_by", "proposed_to"]
                .iter()
                .map(|side| {
                    let mut alt = m.clone();
                    put(&mut alt, side, u);
                    Value::Object(alt)
                })
                .collect(),
        }
    }
}

pub fn participant_condition(user: Id) -> Vec<Value> {
    vec![json!({ "participants": [user] })]
}

// ----------------------------------------------------------------- traits

#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Fails with `Conflict` when the email (case-insensitive) is taken.
    async fn create_user(&self, user: User) -> RepoResult<User>;
    async fn get_user(&self, id: Id) -> RepoResult<User>;
    async fn find_user_by_email(&self, email: &str) -> RepoResult<User>;
    async fn list_users(&self, filter: &UserFilter, page: Option<Page>) -> RepoResult<Paged<User>>;
    async fn update_user(&self, user: User) -> RepoResult<User>;
}

#[async_trait]
pub trait CategoryRepo: Send + Sync {
    /// Fails with `Conflict` when the name (case-insensitive) is taken.
    async fn create_category(&self, category: Category) -> RepoResult<Category>;
    async fn get_category(&self, id: Id) -> RepoResult<Category>;
    async fn list_categories(&self, active_only: bool) -> RepoResult<Vec<Category>>;
    async fn update_category(&self, category: Category) -> RepoResult<Category>;
}

#[async_trait]
pub trait ServiceRepo: Send + Sync {
    async fn create_service(&self, service: Service) -> RepoResult<Service>;
    async fn get_service(&self, id: Id) -> RepoResult<Service>;
    async fn list_services(&self, filter: &ServiceFilter, page: Option<Page>) -> RepoResult<Paged<Service>>;
    async fn update_service(&self, service: Service) -> RepoResult<Service>;
    async fn delete_service(&self, id: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait IssueRepo: Send + Sync {
    async fn create_issue(&self, issue: Issue) -> RepoResult<Issue>;
    async fn get_issue(&self, id: Id) -> RepoResult<Issue>;
    async fn list_issues(&self, filter: &IssueFilter, sort: IssueSort, page: Option<Page>) -> RepoResult<Paged<Issue>>;
    /// Compare-and-swap on `issue.version`.
    async fn update_issue(&self, issue: Issue) -> RepoResult<Issue>;
    async fn delete_issue(&self, id: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait BookingRepo: Send + Sync {
    /// Fails with `Conflict` when the issue already has an active booking.
    async fn create_booking(&self, booking: Booking) -> RepoResult<Booking>;
    async fn get_booking(&self, id: Id) -> RepoResult<Booking>;
    /// Newest first.
    async fn list_bookings(&self, filter: &BookingFilter, page: Option<Page>) -> RepoResult<Paged<Booking>>;
    async fn update_booking(&self, booking: Booking) -> RepoResult<Booking>;
    async fn delete_booking(&self, id: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait ProposalRepo: Send + Sync {
    async fn create_proposal(&self, proposal: Proposal) -> RepoResult<Proposal>;
    async fn get_proposal(&self, id: Id) -> RepoResult<Proposal>;
    /// Newest first.
    async fn list_proposals(&self, filter: &ProposalFilter) -> RepoResult<Vec<Proposal>>;
    async fn update_proposal(&self, proposal: Proposal) -> RepoResult<Proposal>;
}

#[async_trait]
pub trait ChatRepo: Send + Sync {
    /// Fails with `Conflict` when the booking already has a room.
    async fn create_room(&self, room: ChatRoom) -> RepoResult<ChatRoom>;
    async fn get_room(&self, id: Id) -> RepoResult<ChatRoom>;
    async fn find_room_by_booking(&self, booking_id: Id) -> RepoResult<Option<ChatRoom>>;
    /// Most recently updated first.
    async fn list_rooms_for(&self, user: Id) -> RepoResult<Vec<ChatRoom>>;
    async fn update_room(&self, room: ChatRoom) -> RepoResult<ChatRoom>;
    async fn create_message(&self, message: Message) -> RepoResult<Message>;
    async fn get_message(&self, id: Id) -> RepoResult<Message>;
    /// Newest first.
    async fn list_messages(&self, room: Id, page: Page) -> RepoResult<Paged<Message>>;
    /// Adds a read receipt for `user` to every message in the room sent by someone else
    /// and not yet read by them. Returns how many messages changed.
    async fn mark_read(&self, room: Id, user: Id, at: DateTime<Utc>) -> RepoResult<u64>;
}

pub trait Repo: UserRepo + CategoryRepo + ServiceRepo + IssueRepo + BookingRepo + ProposalRepo + ChatRepo {}

impl<T> Repo for T where T: UserRepo + CategoryRepo + ServiceRepo + IssueRepo + BookingRepo + ProposalRepo + ChatRepo {}
