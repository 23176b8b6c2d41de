use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{Pool, Postgres};

use super::*;

/// Postgres store. Every collection is a table of JSONB documents carrying a
/// `version` column that updates compare-and-swap against.
#[derive(Clone)]
pub struct PgRepo {
    pool: Pool<Postgres>,
}

trait Table: Document + Unpin {
    const TABLE: &'static str;
}

macro_rules! table {
    ($($t:ty => $name:literal),* $(,)?) => {$(
        impl Table for $t { const TABLE: &'static str = $name; }
    )*};
}

table!(
    User => "users",
    Category => "categories",
    Service => "services",
    Issue => "issues",
    Booking => "bookings",
    Proposal => "proposals",
    ChatRoom => "chat_rooms",
);

fn db_err(e: sqlx::Error) -> RepoError {
    match &e {
        sqlx::Error::RowNotFound => RepoError::NotFound,
        sqlx::Error::Database(d) => match d.code().as_deref() {
            Some("23505") => RepoError::Conflict,
            Some("23503") => RepoError::NotFound,
            _ => RepoError::Internal(e.to_string()),
        },
        _ => RepoError::Internal(e.to_string()),
    }
}

fn limit_offset(page: Option<Page>) -> (Option<i64>, i64) {
    match page {
        Some(p) => (Some(p.limit as i64), p.offset() as i64),
        None => (None, 0),
    }
}

const PRIORITY_RANK: &str = "CASE doc->>'priority' WHEN 'low' THEN 0 WHEN 'medium' THEN 1 WHEN 'high' THEN 2 ELSE 3 END";

fn issue_order(sort: IssueSort) -> String {
    let dir = match sort.order {
        SortOrder::Asc => "ASC",
        SortOrder::Desc => "DESC",
    };
    match sort.key {
        IssueSortKey::CreatedAt => format!("created_at {dir}"),
        IssueSortKey::Upvotes => format!("(doc->>'upvotes')::int {dir}, created_at {dir}"),
        IssueSortKey::Priority => format!("{PRIORITY_RANK} {dir}, created_at {dir}"),
    }
}

impl PgRepo {
    pub fn new(pool: Pool<Postgres>) -> Self { Self { pool } }

    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new().max_connections(10).connect(url).await?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    async fn insert<T: Table>(&self, mut doc: T) -> RepoResult<T> {
        doc.set_version(0);
        let sql = format!(
            "INSERT INTO {} (id, version, created_at, updated_at, doc) VALUES ($1, 0, $2, $3, $4)",
            T::TABLE
        );
        sqlx::query(&sql)
            .bind(doc.id())
            .bind(doc.created_at())
            .bind(doc.updated_at())
            .bind(Json(&doc))
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(doc)
    }

    async fn fetch<T: Table>(&self, id: Id) -> RepoResult<T> {
        let sql = format!("SELECT doc FROM {} WHERE id = $1", T::TABLE);
        let row: Option<Json<T>> = sqlx::query_scalar(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(|Json(d)| d).ok_or(RepoError::NotFound)
    }

    async fn replace<T: Table>(&self, mut doc: T) -> RepoResult<T> {
        let expected = doc.version();
        doc.set_version(expected + 1);
        let sql = format!(
            "UPDATE {} SET version = $3, updated_at = $4, doc = $5 WHERE id = $1 AND version = $2",
            T::TABLE
        );
        let done = sqlx::query(&sql)
            .bind(doc.id())
            .bind(expected)
            .bind(expected + 1)
            .bind(doc.updated_at())
            .bind(Json(&doc))
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if done.rows_affected() == 1 {
            return Ok(doc);
        }
        let exists_sql = format!("SELECT EXISTS (SELECT 1 FROM {} WHERE id = $1)", T::TABLE);
        let exists: bool = sqlx::query_scalar(&exists_sql)
            .bind(doc.id())
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Err(if exists { RepoError::Conflict } else { RepoError::NotFound })
    }

    async fn remove<T: Table>(&self, id: Id) -> RepoResult<()> {
        let sql = format!("DELETE FROM {} WHERE id = $1", T::TABLE);
        let done = sqlx::query(&sql).bind(id).execute(&self.pool).await.map_err(db_err)?;
        if done.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    /// Documents matching any of `conditions` (JSONB containment), ordered by
    /// the fixed `order` clause.
    async fn find<T: Table>(&self, conditions: Vec<Value>, order: &str, page: Option<Page>) -> RepoResult<Paged<T>> {
        const MATCH: &str = "EXISTS (SELECT 1 FROM jsonb_array_elements($1::jsonb) AS f(cond) WHERE doc @> f.cond)";
        let conds = Json(Value::Array(conditions));
        let (limit, offset) = limit_offset(page);

        let sql = format!("SELECT doc FROM {} WHERE {MATCH} ORDER BY {order} LIMIT $2 OFFSET $3", T::TABLE);
        let rows: Vec<Json<T>> = sqlx::query_scalar(&sql)
            .bind(&conds)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        let total = match page {
            None => rows.len() as u64,
            Some(_) => {
                let count_sql = format!("SELECT COUNT(*) FROM {} WHERE {MATCH}", T::TABLE);
                let n: i64 = sqlx::query_scalar(&count_sql)
                    .bind(&conds)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(db_err)?;
                n as u64
            }
        };
        Ok(Paged { items: rows.into_iter().map(|Json(d)| d).collect(), total })
    }
}

#[async_trait]
impl UserRepo for PgRepo {
    async fn create_user(&self, user: User) -> RepoResult<User> { self.insert(user).await }
    async fn get_user(&self, id: Id) -> RepoResult<User> { self.fetch(id).await }
    async fn find_user_by_email(&self, email: &str) -> RepoResult<User> {
        let row: Option<Json<User>> = sqlx::query_scalar("SELECT doc FROM users WHERE lower(doc->>'email') = lower($1)")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(|Json(u)| u).ok_or(RepoError::NotFound)
    }
    async fn list_users(&self, filter: &UserFilter, page: Option<Page>) -> RepoResult<Paged<User>> {
        self.find(filter.conditions(), "created_at DESC", page).await
    }
    async fn update_user(&self, user: User) -> RepoResult<User> { self.replace(user).await }
}

#[async_trait]
impl CategoryRepo for PgRepo {
    async fn create_category(&self, category: Category) -> RepoResult<Category> { self.insert(category).await }
    async fn get_category(&self, id: Id) -> RepoResult<Category> { self.fetch(id).await }
    async fn list_categories(&self, active_only: bool) -> RepoResult<Vec<Category>> {
        let cond = if active_only { json!({ "is_active": true }) } else { json!({}) };
        let page = self.find(vec![cond], "lower(doc->>'name') ASC", None).await?;
        Ok(page.items)
    }
    async fn update_category(&self, category: Category) -> RepoResult<Category> { self.replace(category).await }
}

#[async_trait]
impl ServiceRepo for PgRepo {
    async fn create_service(&self, service: Service) -> RepoResult<Service> { self.insert(service).await }
    async fn get_service(&self, id: Id) -> RepoResult<Service> { self.fetch(id).await }
    async fn list_services(&self, filter: &ServiceFilter, page: Option<Page>) -> RepoResult<Paged<Service>> {
        self.find(filter.conditions(), "created_at DESC", page).await
    }
    async fn update_service(&self, service: Service) -> RepoResult<Service> { self.replace(service).await }
    async fn delete_service(&self, id: Id) -> RepoResult<()> { self.remove::<Service>(id).await }
}

#[async_trait]
impl IssueRepo for PgRepo {
    async fn create_issue(&self, issue: Issue) -> RepoResult<Issue> { self.insert(issue).await }
    async fn get_issue(&self, id: Id) -> RepoResult<Issue> { self.fetch(id).await }
    async fn list_issues(&self, filter: &IssueFilter, sort: IssueSort, page: Option<Page>) -> RepoResult<Paged<Issue>> {
        self.find(filter.conditions(), &issue_order(sort), page).await
    }
    async fn update_issue(&self, issue: Issue) -> RepoResult<Issue> { self.replace(issue).await }
    async fn delete_issue(&self, id: Id) -> RepoResult<()> { self.remove::<Issue>(id).await }
}

#[async_trait]
impl BookingRepo for PgRepo {
    async fn create_booking(&self, booking: Booking) -> RepoResult<Booking> { self.insert(booking).await }
    async fn get_booking(&self, id: Id) -> RepoResult<Booking> { self.fetch(id).await }
    async fn list_bookings(&self, filter: &BookingFilter, page: Option<Page>) -> RepoResult<Paged<Booking>> {
        self.find(filter.conditions(), "created_at DESC", page).await
    }
    async fn update_booking(&self, booking: Booking) -> RepoResult<Booking> { self.replace(booking).await }
    async fn delete_booking(&self, id: Id) -> RepoResult<()> { self.remove::<Booking>(id).await }
}

#[async_trait]
impl ProposalRepo for PgRepo {
    async fn create_proposal(&self, proposal: Proposal) -> RepoResult<Proposal> { self.insert(proposal).await }
    async fn get_proposal(&self, id: Id) -> RepoResult<Proposal> { self.fetch(id).await }
    async fn list_proposals(&self, filter: &ProposalFilter) -> RepoResult<Vec<Proposal>> {
        Ok(self.find(filter.conditions(), "created_at DESC", None).await?.items)
    }
    async fn update_proposal(&self, proposal: Proposal) -> RepoResult<Proposal> { self.replace(proposal).await }
}

#[async_trait]
impl ChatRepo for PgRepo {
    async fn create_room(&self, room: ChatRoom) -> RepoResult<ChatRoom> { self.insert(room).await }
    async fn get_room(&self, id: Id) -> RepoResult<ChatRoom> { self.fetch(id).await }
    async fn find_room_by_booking(&self, booking_id: Id) -> RepoResult<Option<ChatRoom>> {
        let found = self.find::<ChatRoom>(vec![json!({ "booking_id": booking_id })], "created_at ASC", None).await?;
        Ok(found.items.into_iter().next())
    }
    async fn list_rooms_for(&self, user: Id) -> RepoResult<Vec<ChatRoom>> {
        Ok(self.find(participant_condition(user), "updated_at DESC", None).await?.items)
    }
    async fn update_room(&self, room: ChatRoom) -> RepoResult<ChatRoom> { self.replace(room).await }

    async fn create_message(&self, message: Message) -> RepoResult<Message> {
        sqlx::query("INSERT INTO messages (id, chat_room_id, created_at, doc) VALUES ($1, $2, $3, $4)")
            .bind(message.id)
            .bind(message.chat_room_id)
            .bind(message.created_at)
            .bind(Json(&message))
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(message)
    }

    async fn get_message(&self, id: Id) -> RepoResult<Message> {
        let row: Option<Json<Message>> = sqlx::query_scalar("SELECT doc FROM messages WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(|Json(m)| m).ok_or(RepoError::NotFound)
    }

    async fn list_messages(&self, room: Id, page: Page) -> RepoResult<Paged<Message>> {
        let rows: Vec<Json<Message>> = sqlx::query_scalar(
            "SELECT doc FROM messages WHERE chat_room_id = $1 ORDER BY seq DESC LIMIT $2 OFFSET $3",
        )
        .bind(room)
        .bind(page.limit as i64)
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE chat_room_id = $1")
            .bind(room)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(Paged { items: rows.into_iter().map(|Json(m)| m).collect(), total: total as u64 })
    }

    async fn mark_read(&self, room: Id, user: Id, at: DateTime<Utc>) -> RepoResult<u64> {
        let receipt = json!([{ "user_id": user, "read_at": at }]);
        let already = json!([{ "user_id": user }]);
        let done = sqlx::query(
            "UPDATE messages SET doc = jsonb_set(doc, '{read_by}', (doc->'read_by') || $3::jsonb) \
             WHERE chat_room_id = $1 AND doc->>'sender_id' <> $2 AND NOT (doc->'read_by' @> $4::jsonb)",
        )
        .bind(room)
        .bind(user.to_string())
        .bind(Json(receipt))
        .bind(Json(already))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(done.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_order_ties_break_on_creation() {
        let sort = IssueSort { key: IssueSortKey::Upvotes, order: SortOrder::Asc };
        assert_eq!(issue_order(sort), "(doc->>'upvotes')::int ASC, created_at ASC");
        assert_eq!(issue_order(IssueSort::default()), "created_at DESC");
    }

    #[test]
    fn unpaged_queries_have_no_limit() {
        assert_eq!(limit_offset(None), (None, 0));
        assert_eq!(limit_offset(Some(Page { page: 2, limit: 10 })), (Some(10), 10));
    }
}
