mod common;

use chrono::{Duration, Utc};
use urbifix::auth::Role;
use urbifix::models::*;
use urbifix::repo::inmem::InMemRepo;
use urbifix::repo::{BookingRepo, ChatRepo, IssueRepo, IssueSort, IssueFilter, Page, RepoError, UserRepo};

use common::*;

fn booking(consumer: Id, provider: Id, service: Id, issue: Option<Id>) -> Booking {
    let now = Utc::now();
    Booking {
        id: Id::new_v4(),
        consumer,
        provider,
        service,
        issue,
        scheduled_date: now + Duration::days(2),
        scheduled_time: None,
        status: BookingStatus::Pending,
        total_amount: 120.0,
        original_amount: 120.0,
        negotiated_amount: None,
        payment_status: PaymentStatus::Pending,
        transaction_id: None,
        paid_at: None,
        notes: String::new(),
        cancellation_reason: None,
        negotiation_data: BookingNegotiation::default(),
        chat_room_id: None,
        rating: None,
        review: None,
        completed_at: None,
        created_at: now,
        updated_at: now,
        version: 0,
    }
}

fn message(room: Id, sender: Id, text: &str) -> Message {
    Message {
        id: Id::new_v4(),
        chat_room_id: room,
        sender_id: sender,
        message_type: MessageType::Text,
        content: MessageContent { text: Some(text.into()), ..Default::default() },
        read_by: Vec::new(),
        reply_to: None,
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn emails_are_unique_ignoring_case() {
    let repo = InMemRepo::new();
    let (user, _) = seed_user(&repo, Role::Consumer, "Cara").await;
    let mut twin = repo.get_user(user.id).await.unwrap();
    twin.id = Id::new_v4();
    twin.email = user.email.to_uppercase();
    assert_eq!(repo.create_user(twin).await.unwrap_err(), RepoError::Conflict);
    assert_eq!(repo.find_user_by_email(&user.email).await.unwrap().id, user.id);
}

#[tokio::test]
async fn stale_issue_update_loses() {
    let repo = InMemRepo::new();
    let (consumer, _) = seed_user(&repo, Role::Consumer, "Cara").await;
    let category = seed_category(&repo, "Roads").await;
    let now = Utc::now();
    let issue = repo
        .create_issue(Issue {
            id: Id::new_v4(),
            title: "Flooded underpass".into(),
            description: "Water after every rain".into(),
            category: category.id,
            location: Location::default(),
            priority: Priority::High,
            status: IssueStatus::Open,
            consumer: consumer.id,
            assigned_provider: None,
            images: vec![],
            upvotes: 0,
            upvoted_by: vec![],
            views_count: 0,
            viewed_by: vec![],
            crowdfunding: Crowdfunding::default(),
            estimated_cost: None,
            resolved_at: None,
            created_at: now,
            updated_at: now,
            version: 0,
        })
        .await
        .unwrap();

    let mut a = issue.clone();
    a.assigned_provider = Some(Id::new_v4());
    a.status = IssueStatus::InProgress;
    let mut b = issue;
    b.assigned_provider = Some(Id::new_v4());
    b.status = IssueStatus::InProgress;

    let winner = repo.update_issue(a).await.unwrap();
    assert_eq!(repo.update_issue(b).await.unwrap_err(), RepoError::Conflict);
    let stored = repo.get_issue(winner.id).await.unwrap();
    assert_eq!(stored.assigned_provider, winner.assigned_provider);

    let open = repo
        .list_issues(&IssueFilter { status: Some(IssueStatus::Open), ..Default::default() }, IssueSort::default(), None)
        .await
        .unwrap();
    assert_eq!(open.total, 0);
}

#[tokio::test]
async fn one_active_booking_per_issue() {
    let repo = InMemRepo::new();
    let (c, p, s, issue) = (Id::new_v4(), Id::new_v4(), Id::new_v4(), Id::new_v4());
    let first = repo.create_booking(booking(c, p, s, Some(issue))).await.unwrap();
    assert_eq!(repo.create_booking(booking(c, p, s, Some(issue))).await.unwrap_err(), RepoError::Conflict);
    // bookings without an issue are unrestricted
    repo.create_booking(booking(c, p, s, None)).await.unwrap();
    repo.create_booking(booking(c, p, s, None)).await.unwrap();

    let mut done = first;
    done.status = BookingStatus::Rejected;
    repo.update_booking(done).await.unwrap();
    repo.create_booking(booking(c, p, s, Some(issue))).await.unwrap();
}

#[tokio::test]
async fn mark_read_skips_own_and_already_read() {
    let repo = InMemRepo::new();
    let (consumer, provider) = (Id::new_v4(), Id::new_v4());
    let b = repo.create_booking(booking(consumer, provider, Id::new_v4(), None)).await.unwrap();
    let now = Utc::now();
    let room = repo
        .create_room(ChatRoom {
            id: Id::new_v4(),
            booking_id: b.id,
            participants: vec![consumer, provider],
            last_message: None,
            unread_count: Default::default(),
            original_price: 120.0,
            is_active: true,
            created_at: now,
            updated_at: now,
            version: 0,
        })
        .await
        .unwrap();
    let mut dup = room.clone();
    dup.id = Id::new_v4();
    assert_eq!(repo.create_room(dup).await.unwrap_err(), RepoError::Conflict);

    repo.create_message(message(room.id, consumer, "hello")).await.unwrap();
    repo.create_message(message(room.id, consumer, "anyone?")).await.unwrap();
    repo.create_message(message(room.id, provider, "on my way")).await.unwrap();
    assert_eq!(repo.create_message(message(Id::new_v4(), consumer, "lost")).await.unwrap_err(), RepoError::NotFound);

    assert_eq!(repo.mark_read(room.id, provider, Utc::now()).await.unwrap(), 2);
    assert_eq!(repo.mark_read(room.id, provider, Utc::now()).await.unwrap(), 0);

    let page = repo.list_messages(room.id, Page { page: 1, limit: 2 }).await.unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.items[0].content.text.as_deref(), Some("on my way"));
    assert!(page.items[0].read_by.is_empty());
    assert_eq!(page.items[1].read_by[0].user_id, provider);
}

#[tokio::test]
async fn snapshot_keeps_users_and_bookings() {
    let dir = tempfile::tempdir().unwrap();
    let repo = InMemRepo::with_snapshot_dir(dir.path());
    let (user, _) = seed_user(&repo, Role::Provider, "Pat").await;
    let b = repo.create_booking(booking(Id::new_v4(), user.id, Id::new_v4(), None)).await.unwrap();
    drop(repo);

    let reloaded = InMemRepo::with_snapshot_dir(dir.path());
    assert_eq!(reloaded.get_user(user.id).await.unwrap().email, user.email);
    assert_eq!(reloaded.get_booking(b.id).await.unwrap().total_amount, 120.0);
}
