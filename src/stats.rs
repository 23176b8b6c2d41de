//! Dashboard numbers, computed per request from the stored bookings and issues.

use chrono::{DateTime, Datelike, Duration, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::{Actor, Role};
use crate::error::ApiResult;
use crate::models::{Booking, BookingStatus, Issue, IssueStatus, PaymentStatus};
use crate::policy::{authorize_kind, Action, ResourceKind};
use crate::repo::{BookingFilter, IssueFilter, IssueSort, Repo, UserFilter};

#[derive(Debug, Clone, Default, Serialize, ToSchema, PartialEq)]
pub struct BookingStats {
    pub total: u64,
    pub pending: u64,
    pub negotiating: u64,
    pub confirmed: u64,
    pub in_progress: u64,
    pub completed: u64,
    pub cancelled: u64,
    pub rejected: u64,
    pub today: u64,
    pub this_week: u64,
    pub this_month: u64,
}

#[derive(Debug, Clone, Default, Serialize, ToSchema, PartialEq)]
pub struct ConsumerDashboard {
    pub issues_reported: u64,
    pub open_issues: u64,
    pub resolved_issues: u64,
    pub total_bookings: u64,
    pub active_bookings: u64,
    pub completed_bookings: u64,
    pub total_spent: f64,
    pub this_month_spent: f64,
}

#[derive(Debug, Clone, Default, Serialize, ToSchema, PartialEq)]
pub struct ProviderDashboard {
    pub total_bookings: u64,
    pub pending_bookings: u64,
    pub active_bookings: u64,
    pub completed_bookings: u64,
    pub completion_rate: f64,
    pub total_earnings: f64,
    pub this_month_earnings: f64,
    pub average_rating: f64,
    pub review_count: u64,
    pub assigned_issues: u64,
    pub resolved_issues: u64,
}

#[derive(Debug, Clone, Default, Serialize, ToSchema, PartialEq)]
pub struct UserCounts {
    pub consumers: u64,
    pub providers: u64,
    pub admins: u64,
}

#[derive(Debug, Clone, Default, Serialize, ToSchema, PartialEq)]
pub struct IssueCounts {
    pub total: u64,
    pub open: u64,
    pub in_progress: u64,
    pub resolved: u64,
    pub closed: u64,
}

#[derive(Debug, Clone, Default, Serialize, ToSchema, PartialEq)]
pub struct AdminDashboard {
    pub users: UserCounts,
    pub issues: IssueCounts,
    pub bookings: BookingStats,
    pub total_revenue: f64,
    pub this_month_revenue: f64,
}

#[derive(Debug, Clone, Serialize, ToSchema, PartialEq)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Dashboard {
    Consumer(ConsumerDashboard),
    Provider(ProviderDashboard),
    Admin(AdminDashboard),
}

/// Same calendar month and year.
pub fn same_month(at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    at.year() == now.year() && at.month() == now.month()
}

fn count<T>(items: &[T], pred: impl Fn(&T) -> bool) -> u64 {
    items.iter().filter(|x| pred(x)).count() as u64
}

fn sum<T>(items: &[T], pred: impl Fn(&T) -> bool, value: impl Fn(&T) -> f64) -> f64 {
    items.iter().filter(|x| pred(x)).map(value).sum()
}

pub fn booking_stats(bookings: &[Booking], now: DateTime<Utc>) -> BookingStats {
    let midnight = now.date_naive().and_hms_opt(0, 0, 0).map(|t| t.and_utc()).unwrap_or(now);
    let week_ago = now - Duration::days(7);
    let month_ago = now - Duration::days(30);
    let by = |s: BookingStatus| count(bookings, |b| b.status == s);
    BookingStats {
        total: bookings.len() as u64,
        pending: by(BookingStatus::Pending),
        negotiating: by(BookingStatus::Negotiating),
        confirmed: by(BookingStatus::Confirmed),
        in_progress: by(BookingStatus::InProgress),
        completed: by(BookingStatus::Completed),
        cancelled: by(BookingStatus::Cancelled),
        rejected: by(BookingStatus::Rejected),
        today: count(bookings, |b| b.created_at >= midnight),
        this_week: count(bookings, |b| b.created_at >= week_ago),
        this_month: count(bookings, |b| b.created_at >= month_ago),
    }
}

fn is_paid(b: &Booking) -> bool {
    b.payment_status == PaymentStatus::Paid
}

pub fn consumer_dashboard(issues: &[Issue], bookings: &[Booking], now: DateTime<Utc>) -> ConsumerDashboard {
    ConsumerDashboard {
        issues_reported: issues.len() as u64,
        open_issues: count(issues, |i| i.status == IssueStatus::Open),
        resolved_issues: count(issues, |i| matches!(i.status, IssueStatus::Resolved | IssueStatus::Closed)),
        total_bookings: bookings.len() as u64,
        active_bookings: count(bookings, |b| b.status.is_active()),
        completed_bookings: count(bookings, |b| b.status == BookingStatus::Completed),
        total_spent: sum(bookings, is_paid, |b| b.total_amount),
        this_month_spent: sum(bookings, |b| is_paid(b) && same_month(b.updated_at, now), |b| b.total_amount),
    }
}

pub fn provider_dashboard(issues: &[Issue], bookings: &[Booking], now: DateTime<Utc>) -> ProviderDashboard {
    let completed = |b: &Booking| b.status == BookingStatus::Completed;
    let completed_bookings = count(bookings, completed);
    let ratings: Vec<u8> = bookings.iter().filter_map(|b| b.rating).collect();
    let average_rating = if ratings.is_empty() {
        0.0
    } else {
        ratings.iter().map(|r| f64::from(*r)).sum::<f64>() / ratings.len() as f64
    };
    let completion_rate = if bookings.is_empty() {
        0.0
    } else {
        completed_bookings as f64 / bookings.len() as f64 * 100.0
    };
    ProviderDashboard {
        total_bookings: bookings.len() as u64,
        pending_bookings: count(bookings, |b| b.status == BookingStatus::Pending),
        active_bookings: count(bookings, |b| {
            matches!(b.status, BookingStatus::Negotiating | BookingStatus::Confirmed | BookingStatus::InProgress)
        }),
        completed_bookings,
        completion_rate,
        total_earnings: sum(bookings, completed, |b| b.total_amount),
        this_month_earnings: sum(bookings, |b| completed(b) && same_month(b.updated_at, now), |b| b.total_amount),
        average_rating,
        review_count: ratings.len() as u64,
        assigned_issues: issues.len() as u64,
        resolved_issues: count(issues, |i| matches!(i.status, IssueStatus::Resolved | IssueStatus::Closed)),
    }
}

pub fn issue_counts(issues: &[Issue]) -> IssueCounts {
    IssueCounts {
        total: issues.len() as u64,
        open: count(issues, |i| i.status == IssueStatus::Open),
        in_progress: count(issues, |i| i.status == IssueStatus::InProgress),
        resolved: count(issues, |i| i.status == IssueStatus::Resolved),
        closed: count(issues, |i| i.status == IssueStatus::Closed),
    }
}

async fn all_bookings(repo: &dyn Repo, filter: BookingFilter) -> ApiResult<Vec<Booking>> {
    Ok(repo.list_bookings(&filter, None).await?.items)
}

async fn all_issues(repo: &dyn Repo, filter: IssueFilter) -> ApiResult<Vec<Issue>> {
    Ok(repo.list_issues(&filter, IssueSort::default(), None).await?.items)
}

/// Platform-wide booking counters for the admin views.
pub async fn platform_booking_stats(repo: &dyn Repo, actor: &Actor, now: DateTime<Utc>) -> ApiResult<BookingStats> {
    authorize_kind(actor, ResourceKind::Stats, Action::List)?;
    Ok(booking_stats(&all_bookings(repo, BookingFilter::default()).await?, now))
}

async fn admin_dashboard(repo: &dyn Repo, now: DateTime<Utc>) -> ApiResult<AdminDashboard> {
    let users = repo.list_users(&UserFilter::default(), None).await?.items;
    let issues = all_issues(repo, IssueFilter::default()).await?;
    let bookings = all_bookings(repo, BookingFilter::default()).await?;
    Ok(AdminDashboard {
        users: UserCounts {
            consumers: count(&users, |u| u.role == Role::Consumer),
            providers: count(&users, |u| u.role == Role::Provider),
            admins: count(&users, |u| u.role == Role::Admin),
        },
        issues: issue_counts(&issues),
        bookings: booking_stats(&bookings, now),
        total_revenue: sum(&bookings, is_paid, |b| b.total_amount),
        this_month_revenue: sum(&bookings, |b| is_paid(b) && same_month(b.updated_at, now), |b| b.total_amount),
    })
}

/// The dashboard matching the caller's role.
pub async fn dashboard(repo: &dyn Repo, actor: &Actor, now: DateTime<Utc>) -> ApiResult<Dashboard> {
    authorize_kind(actor, ResourceKind::Stats, Action::Read)?;
    let me = Some(actor.id);
    Ok(match actor.role {
        Role::Consumer => {
            let issues = all_issues(repo, IssueFilter { consumer: me, ..Default::default() }).await?;
            let bookings = all_bookings(repo, BookingFilter { consumer: me, ..Default::default() }).await?;
            Dashboard::Consumer(consumer_dashboard(&issues, &bookings, now))
        }
        Role::Provider => {
            let issues = all_issues(repo, IssueFilter { assigned_provider: me, ..Default::default() }).await?;
            let bookings = all_bookings(repo, BookingFilter { provider: me, ..Default::default() }).await?;
            Dashboard::Provider(provider_dashboard(&issues, &bookings, now))
        }
        Role::Admin => {
            authorize_kind(actor, ResourceKind::Stats, Action::List)?;
            Dashboard::Admin(admin_dashboard(repo, now).await?)
        }
    })
}
