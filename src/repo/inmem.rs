use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::*;

#[derive(Default, Serialize, Deserialize)]
struct State {
    users: HashMap<Id, User>,
    categories: HashMap<Id, Category>,
    services: HashMap<Id, Service>,
    issues: HashMap<Id, Issue>,
    bookings: HashMap<Id, Booking>,
    proposals: HashMap<Id, Proposal>,
    rooms: HashMap<Id, ChatRoom>,
    // append-only, insertion order is chronological
    messages: Vec<Message>,
}

/// In-process store; optionally snapshots itself to a JSON file after every write.
#[derive(Clone, Default)]
pub struct InMemRepo {
    state: Arc<RwLock<State>>,
    snapshot_path: Option<Arc<PathBuf>>,
}

fn insert_new<T: Document>(map: &mut HashMap<Id, T>, doc: T) -> RepoResult<T> {
    if map.contains_key(&doc.id()) {
        return Err(RepoError::Conflict);
    }
    map.insert(doc.id(), doc.clone());
    Ok(doc)
}

fn compare_and_swap<T: Document>(map: &mut HashMap<Id, T>, mut doc: T) -> RepoResult<T> {
    let current = map.get_mut(&doc.id()).ok_or(RepoError::NotFound)?;
    if current.version() != doc.version() {
        return Err(RepoError::Conflict);
    }
    doc.set_version(doc.version() + 1);
    *current = doc.clone();
    Ok(doc)
}

fn newest_first<T: Document>(mut v: Vec<T>) -> Vec<T> {
    v.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
    v
}

impl InMemRepo {
    /// Ephemeral store (tests, demos).
    pub fn new() -> Self { Self::default() }

    /// Store backed by `<dir>/state.json`; loads an existing snapshot when present.
    pub fn with_snapshot_dir(dir: &Path) -> Self {
        let path = dir.join("state.json");
        let state = Self::load_state_from(&path);
        Self {
            state: Arc::new(RwLock::new(state)),
            snapshot_path: Some(Arc::new(path)),
        }
    }

    fn load_state_from(path: &Path) -> State {
        match std::fs::read(path) {
            Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                Ok(s) => {
                    info!("loaded snapshot '{}'", path.display());
                    s
                }
                Err(e) => {
                    warn!("failed to parse snapshot '{}': {e}. Starting empty.", path.display());
                    State::default()
                }
            },
            Err(e) => {
                info!("no snapshot at '{}' ({e}), starting empty", path.display());
                State::default()
            }
        }
    }

    fn read(&self) -> RepoResult<RwLockReadGuard<'_, State>> {
        self.state.read().map_err(|_| RepoError::Internal("state lock poisoned".into()))
    }

    fn write(&self) -> RepoResult<RwLockWriteGuard<'_, State>> {
        self.state.write().map_err(|_| RepoError::Internal("state lock poisoned".into()))
    }

    /// Writes the snapshot if one is configured. Must be called without holding the lock.
    fn persist(&self) {
        let Some(path) = self.snapshot_path.as_ref() else { return };
        let bytes = match self.state.read() {
            Ok(s) => serde_json::to_vec_pretty(&*s),
            Err(_) => return,
        };
        match bytes {
            Ok(bytes) => {
                if let Some(dir) = path.parent() {
                    let _ = std::fs::create_dir_all(dir);
                }
                if let Err(e) = std::fs::write(path.as_ref(), bytes) {
                    warn!("failed to write snapshot '{}': {e}", path.display());
                }
            }
            Err(e) => warn!("failed to serialise snapshot: {e}"),
        }
    }

    /// Runs a mutation under the write lock, then persists on success.
    fn mutate<T>(&self, f: impl FnOnce(&mut State) -> RepoResult<T>) -> RepoResult<T> {
        let out = {
            let mut s = self.write()?;
            f(&mut s)?
        };
        self.persist();
        Ok(out)
    }
}

#[async_trait]
impl UserRepo for InMemRepo {
    async fn create_user(&self, user: User) -> RepoResult<User> {
        self.mutate(|s| {
            if s.users.values().any(|u| u.email.eq_ignore_ascii_case(&user.email)) {
                return Err(RepoError::Conflict);
            }
            insert_new(&mut s.users, user)
        })
    }
    async fn get_user(&self, id: Id) -> RepoResult<User> {
        self.read()?.users.get(&id).cloned().ok_or(RepoError::NotFound)
    }
    async fn find_user_by_email(&self, email: &str) -> RepoResult<User> {
        self.read()?
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned()
            .ok_or(RepoError::NotFound)
    }
    async fn list_users(&self, filter: &UserFilter, page: Option<Page>) -> RepoResult<Paged<User>> {
        let s = self.read()?;
        let v = s.users.values().filter(|u| filter.matches(u)).cloned().collect();
        Ok(Paged::from_sorted(newest_first(v), page))
    }
    async fn update_user(&self, user: User) -> RepoResult<User> {
        self.mutate(|s| compare_and_swap(&mut s.users, user))
    }
}

#[async_trait]
impl CategoryRepo for InMemRepo {
    async fn create_category(&self, category: Category) -> RepoResult<Category> {
        self.mutate(|s| {
            if s.categories.values().any(|c| c.name.eq_ignore_ascii_case(&category.name)) {
                return Err(RepoError::Conflict);
            }
            insert_new(&mut s.categories, category)
        })
    }
    async fn get_category(&self, id: Id) -> RepoResult<Category> {
        self.read()?.categories.get(&id).cloned().ok_or(RepoError::NotFound)
    }
    async fn list_categories(&self, active_only: bool) -> RepoResult<Vec<Category>> {
        let s = self.read()?;
        let mut v: Vec<_> = s.categories.values().filter(|c| !active_only || c.is_active).cloned().collect();
        v.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        Ok(v)
    }
    async fn update_category(&self, category: Category) -> RepoResult<Category> {
        self.mutate(|s| {
            if s.categories.values().any(|c| c.id != category.id && c.name.eq_ignore_ascii_case(&category.name)) {
                return Err(RepoError::Conflict);
            }
            compare_and_swap(&mut s.categories, category)
        })
    }
}

#[async_trait]
impl ServiceRepo for InMemRepo {
    async fn create_service(&self, service: Service) -> RepoResult<Service> {
        self.mutate(|s| insert_new(&mut s.services, service))
    }
    async fn get_service(&self, id: Id) -> RepoResult<Service> {
        self.read()?.services.get(&id).cloned().ok_or(RepoError::NotFound)
    }
    async fn list_services(&self, filter: &ServiceFilter, page: Option<Page>) -> RepoResult<Paged<Service>> {
        let s = self.read()?;
        let v = s.services.values().filter(|x| filter.matches(x)).cloned().collect();
        Ok(Paged::from_sorted(newest_first(v), page))
    }
    async fn update_service(&self, service: Service) -> RepoResult<Service> {
        self.mutate(|s| compare_and_swap(&mut s.services, service))
    }
    async fn delete_service(&self, id: Id) -> RepoResult<()> {
        self.mutate(|s| s.services.remove(&id).map(|_| ()).ok_or(RepoError::NotFound))
    }
}

#[async_trait]
impl IssueRepo for InMemRepo {
    async fn create_issue(&self, issue: Issue) -> RepoResult<Issue> {
        self.mutate(|s| insert_new(&mut s.issues, issue))
    }
    async fn get_issue(&self, id: Id) -> RepoResult<Issue> {
        self.read()?.issues.get(&id).cloned().ok_or(RepoError::NotFound)
    }
    async fn list_issues(&self, filter: &IssueFilter, sort: IssueSort, page: Option<Page>) -> RepoResult<Paged<Issue>> {
        let s = self.read()?;
        let mut v: Vec<_> = s.issues.values().filter(|i| filter.matches(i)).cloned().collect();
        v.sort_by(|a, b| sort.compare(a, b));
        Ok(Paged::from_sorted(v, page))
    }
    async fn update_issue(&self, issue: Issue) -> RepoResult<Issue> {
        self.mutate(|s| compare_and_swap(&mut s.issues, issue))
    }
    async fn delete_issue(&self, id: Id) -> RepoResult<()> {
        self.mutate(|s| s.issues.remove(&id).map(|_| ()).ok_or(RepoError::NotFound))
    }
}

#[async_trait]
impl BookingRepo for InMemRepo {
    async fn create_booking(&self, booking: Booking) -> RepoResult<Booking> {
        self.mutate(|s| {
            if let Some(issue) = booking.issue {
                if s.bookings.values().any(|b| b.issue == Some(issue) && b.status.is_active()) {
                    return Err(RepoError::Conflict);
                }
            }
            insert_new(&mut s.bookings, booking)
        })
    }
    async fn get_booking(&self, id: Id) -> RepoResult<Booking> {
        self.read()?.bookings.get(&id).cloned().ok_or(RepoError::NotFound)
    }
    async fn list_bookings(&self, filter: &BookingFilter, page: Option<Page>) -> RepoResult<Paged<Booking>> {
        let s = self.read()?;
        let v = s.bookings.values().filter(|b| filter.matches(b)).cloned().collect();
        Ok(Paged::from_sorted(newest_first(v), page))
    }
    async fn update_booking(&self, booking: Booking) -> RepoResult<Booking> {
        self.mutate(|s| {
            if let Some(issue) = booking.issue {
                let clash = s.bookings.values().any(|b| {
                    b.id != booking.id && b.issue == Some(issue) && b.status.is_active()
                });
                if clash && booking.status.is_active() {
                    return Err(RepoError::Conflict);
                }
            }
            compare_and_swap(&mut s.bookings, booking)
        })
    }
    async fn delete_booking(&self, id: Id) -> RepoResult<()> {
        self.mutate(|s| s.bookings.remove(&id).map(|_| ()).ok_or(RepoError::NotFound))
    }
}

#[async_trait]
impl ProposalRepo for InMemRepo {
    async fn create_proposal(&self, proposal: Proposal) -> RepoResult<Proposal> {
        self.mutate(|s| insert_new(&mut s.proposals, proposal))
    }
    async fn get_proposal(&self, id: Id) -> RepoResult<Proposal> {
        self.read()?.proposals.get(&id).cloned().ok_or(RepoError::NotFound)
    }
    async fn list_proposals(&self, filter: &ProposalFilter) -> RepoResult<Vec<Proposal>> {
        let s = self.read()?;
        let v = s.proposals.values().filter(|p| filter.matches(p)).cloned().collect();
        Ok(newest_first(v))
    }
    async fn update_proposal(&self, proposal: Proposal) -> RepoResult<Proposal> {
        self.mutate(|s| compare_and_swap(&mut s.proposals, proposal))
    }
}

#[async_trait]
impl ChatRepo for InMemRepo {
    async fn create_room(&self, room: ChatRoom) -> RepoResult<ChatRoom> {
        self.mutate(|s| {
            if s.rooms.values().any(|r| r.booking_id == room.booking_id) {
                return Err(RepoError::Conflict);
            }
            insert_new(&mut s.rooms, room)
        })
    }
    async fn get_room(&self, id: Id) -> RepoResult<ChatRoom> {
        self.read()?.rooms.get(&id).cloned().ok_or(RepoError::NotFound)
    }
    async fn find_room_by_booking(&self, booking_id: Id) -> RepoResult<Option<ChatRoom>> {
        Ok(self.read()?.rooms.values().find(|r| r.booking_id == booking_id).cloned())
    }
    async fn list_rooms_for(&self, user: Id) -> RepoResult<Vec<ChatRoom>> {
        let s = self.read()?;
        let mut v: Vec<_> = s.rooms.values().filter(|r| r.participants.contains(&user)).cloned().collect();
        v.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(v)
    }
    async fn update_room(&self, room: ChatRoom) -> RepoResult<ChatRoom> {
        self.mutate(|s| compare_and_swap(&mut s.rooms, room))
    }
    async fn create_message(&self, message: Message) -> RepoResult<Message> {
        self.mutate(|s| {
            if !s.rooms.contains_key(&message.chat_room_id) {
                return Err(RepoError::NotFound);
            }
            s.messages.push(message.clone());
            Ok(message)
        })
    }
    async fn get_message(&self, id: Id) -> RepoResult<Message> {
        self.read()?.messages.iter().find(|m| m.id == id).cloned().ok_or(RepoError::NotFound)
    }
    async fn list_messages(&self, room: Id, page: Page) -> RepoResult<Paged<Message>> {
        let s = self.read()?;
        let v: Vec<_> = s.messages.iter().rev().filter(|m| m.chat_room_id == room).cloned().collect();
        Ok(Paged::from_sorted(v, Some(page)))
    }
    async fn mark_read(&self, room: Id, user: Id, at: DateTime<Utc>) -> RepoResult<u64> {
        self.mutate(|s| {
            let mut changed = 0;
            for m in s.messages.iter_mut().filter(|m| m.chat_room_id == room && m.sender_id != user) {
                if !m.read_by.iter().any(|r| r.user_id == user) {
                    m.read_by.push(ReadReceipt { user_id: user, read_at: at });
                    changed += 1;
                }
            }
            Ok(changed)
        })
    }
}
