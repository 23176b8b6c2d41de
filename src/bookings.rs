//! Booking lifecycle: creation, the status transition table, cancellation,
//! mock payments and reviews.

use chrono::{DateTime, Utc};
use tracing::info;

use crate::auth::{Actor, Role};
use crate::error::{retry_on_conflict, ApiError, ApiResult, RepoResultExt};
use crate::models::*;
use crate::policy::{authorize, authorize_kind, Action, ResourceKind};
use crate::repo::{BookingFilter, Page, Paged, Repo, RepoError};

impl BookingStatus {
    /// Statuses reachable from `self` in one step.
    pub fn allowed_next(self) -> &'static [BookingStatus] {
        use BookingStatus::*;
        match self {
            Pending => &[Negotiating, Confirmed, Cancelled, Rejected],
            Negotiating => &[Confirmed, Cancelled, Rejected],
            Confirmed => &[InProgress, Cancelled],
            InProgress => &[Completed, Cancelled],
            Completed | Cancelled | Rejected => &[],
        }
    }

    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        self.allowed_next().contains(&next)
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_next().is_empty()
    }

    /// Counts against the one-booking-per-issue rule.
    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }

    pub fn as_str(self) -> &'static str {
        use BookingStatus::*;
        match self {
            Pending => "pending",
            Negotiating => "negotiating",
            Confirmed => "confirmed",
            InProgress => "in_progress",
            Completed => "completed",
            Cancelled => "cancelled",
            Rejected => "rejected",
        }
    }
}

pub const DEFAULT_CANCEL_REASON: &str = "No reason provided";

/// Applies a status change in place, enforcing the transition table.
pub fn transition(
    booking: &mut Booking,
    next: BookingStatus,
    reason: Option<String>,
    now: DateTime<Utc>,
) -> ApiResult<()> {
    if !booking.status.can_transition_to(next) {
        return Err(ApiError::bad_request(format!(
            "Cannot change booking status from {} to {}",
            booking.status.as_str(),
            next.as_str()
        )));
    }
    booking.status = next;
    match next {
        BookingStatus::Cancelled => {
            let reason = reason.filter(|r| !r.trim().is_empty());
            booking.cancellation_reason = Some(reason.unwrap_or_else(|| DEFAULT_CANCEL_REASON.to_string()));
        }
        BookingStatus::Completed => booking.completed_at = Some(now),
        _ => {}
    }
    booking.updated_at = now;
    Ok(())
}

/// Mocked payment reference, there is no gateway behind it.
pub fn mock_transaction_id() -> String {
    let bytes: [u8; 8] = rand::random();
    format!("TXN-{}", hex::encode_upper(bytes))
}

async fn load(repo: &dyn Repo, id: Id) -> ApiResult<Booking> {
    repo.get_booking(id).await.or_not_found("Booking")
}

pub async fn create_booking(repo: &dyn Repo, actor: &Actor, new: NewBooking) -> ApiResult<Booking> {
    authorize_kind(actor, ResourceKind::Booking, Action::Create)?;

    let service = repo.get_service(new.service_id).await.or_not_found("Service")?;
    if !service.is_active {
        return Err(ApiError::bad_request("Service is not available"));
    }
    let provider = repo.get_user(new.provider_id).await.or_not_found("Provider")?;
    if provider.role != Role::Provider || !provider.is_active {
        return Err(ApiError::not_found("Provider"));
    }
    if service.provider != provider.id {
        return Err(ApiError::bad_request("Service is not offered by this provider"));
    }

    if let Some(issue_id) = new.issue_id {
        let issue = repo.get_issue(issue_id).await.or_not_found("Issue")?;
        if issue.consumer != actor.id {
            return Err(ApiError::forbidden());
        }
        if issue.status == IssueStatus::Closed {
            return Err(ApiError::bad_request("Cannot book a service for a closed issue"));
        }
        let existing = repo
            .list_bookings(&BookingFilter { issue: Some(issue_id), ..Default::default() }, None)
            .await?;
        if existing.items.iter().any(|b| b.status.is_active()) {
            return Err(ApiError::bad_request("An active booking already exists for this issue"));
        }
    }

    let now = Utc::now();
    let mut negotiation = BookingNegotiation {
        price_history: vec![PriceEntry {
            amount: service.base_price,
            proposed_by: actor.id,
            at: now,
            message: Some("Initial booking price".into()),
        }],
        schedule_history: vec![ScheduleEntry {
            date: new.scheduled_date,
            proposed_by: actor.id,
            at: now,
            message: Some("Initial booking date".into()),
        }],
        ..Default::default()
    };
    if !new.notes.trim().is_empty() {
        negotiation.requirement_history.push(RequirementEntry {
            requirement: new.notes.clone(),
            proposed_by: actor.id,
            at: now,
            message: Some("Initial requirements".into()),
        });
    }

    let booking = Booking {
        id: Id::new_v4(),
        consumer: actor.id,
        provider: provider.id,
        service: service.id,
        issue: new.issue_id,
        scheduled_date: new.scheduled_date,
        scheduled_time: new.scheduled_time,
        status: BookingStatus::Pending,
        total_amount: service.base_price,
        original_amount: service.base_price,
        negotiated_amount: None,
        payment_status: PaymentStatus::Pending,
        transaction_id: None,
        paid_at: None,
        notes: new.notes,
        cancellation_reason: None,
        negotiation_data: negotiation,
        chat_room_id: None,
        rating: None,
        review: None,
        completed_at: None,
        created_at: now,
        updated_at: now,
        version: 0,
    };
    let booking = repo.create_booking(booking).await.map_err(|e| match e {
        RepoError::Conflict => ApiError::bad_request("An active booking already exists for this issue"),
        other => other.into(),
    })?;
    info!(booking = %booking.id, consumer = %booking.consumer, provider = %booking.provider, "booking created");
    Ok(booking)
}

pub async fn list_bookings(
    repo: &dyn Repo,
    actor: &Actor,
    status: Option<BookingStatus>,
    page: Page,
) -> ApiResult<Paged<Booking>> {
    authorize_kind(actor, ResourceKind::Booking, Action::List)?;
    let mut filter = BookingFilter { status, ..Default::default() };
    match actor.role {
        Role::Consumer => filter.consumer = Some(actor.id),
        Role::Provider => filter.provider = Some(actor.id),
        Role::Admin => {}
    }
    Ok(repo.list_bookings(&filter, Some(page)).await?)
}

pub async fn get_booking(repo: &dyn Repo, actor: &Actor, id: Id) -> ApiResult<Booking> {
    let booking = load(repo, id).await?;
    authorize(actor, Action::Read, &booking)?;
    Ok(booking)
}

pub async fn update_status(repo: &dyn Repo, actor: &Actor, id: Id, upd: BookingStatusUpdate) -> ApiResult<Booking> {
    let mut booking = load(repo, id).await?;
    let action = if upd.status == BookingStatus::Cancelled { Action::Cancel } else { Action::ChangeStatus };
    authorize(actor, action, &booking)?;
    let from = booking.status;
    transition(&mut booking, upd.status, upd.cancellation_reason, Utc::now())?;
    let booking = repo.update_booking(booking).await?;
    info!(booking = %booking.id, from = from.as_str(), to = booking.status.as_str(), by = %actor.id, "booking status changed");
    Ok(booking)
}

pub async fn cancel_booking(repo: &dyn Repo, actor: &Actor, id: Id, reason: Option<String>) -> ApiResult<Booking> {
    let mut booking = load(repo, id).await?;
    authorize(actor, Action::Cancel, &booking)?;
    match booking.status {
        BookingStatus::Cancelled => return Err(ApiError::bad_request("Booking is already cancelled")),
        BookingStatus::Completed => return Err(ApiError::bad_request("Cannot cancel completed booking")),
        _ => {}
    }
    transition(&mut booking, BookingStatus::Cancelled, reason, Utc::now())?;
    let booking = repo.update_booking(booking).await?;
    info!(booking = %booking.id, by = %actor.id, "booking cancelled");
    Ok(booking)
}

pub async fn delete_booking(repo: &dyn Repo, actor: &Actor, id: Id) -> ApiResult<()> {
    let booking = load(repo, id).await?;
    authorize(actor, Action::Delete, &booking)?;
    if booking.status != BookingStatus::Pending {
        return Err(ApiError::bad_request("Only pending bookings can be deleted"));
    }
    repo.delete_booking(id).await.or_not_found("Booking")?;
    info!(booking = %id, by = %actor.id, "booking deleted");
    Ok(())
}

pub async fn pay_booking(repo: &dyn Repo, actor: &Actor, id: Id) -> ApiResult<Booking> {
    let mut booking = load(repo, id).await?;
    authorize(actor, Action::Pay, &booking)?;
    if !matches!(booking.status, BookingStatus::Confirmed | BookingStatus::InProgress | BookingStatus::Completed) {
        return Err(ApiError::bad_request("Booking must be confirmed before payment"));
    }
    match booking.payment_status {
        PaymentStatus::Pending | PaymentStatus::Failed => {}
        PaymentStatus::Paid => return Err(ApiError::bad_request("Booking is already paid")),
        PaymentStatus::Refunded => return Err(ApiError::bad_request("Booking payment was refunded")),
    }
    let now = Utc::now();
    booking.payment_status = PaymentStatus::Paid;
    booking.transaction_id = Some(mock_transaction_id());
    booking.paid_at = Some(now);
    booking.updated_at = now;
    let booking = repo.update_booking(booking).await?;
    info!(booking = %booking.id, amount = booking.total_amount, "booking paid");
    Ok(booking)
}

pub async fn refund_booking(repo: &dyn Repo, actor: &Actor, id: Id) -> ApiResult<Booking> {
    let mut booking = load(repo, id).await?;
    authorize(actor, Action::Refund, &booking)?;
    if booking.payment_status != PaymentStatus::Paid {
        return Err(ApiError::bad_request("Only paid bookings can be refunded"));
    }
    booking.payment_status = PaymentStatus::Refunded;
    booking.updated_at = Utc::now();
    let booking = repo.update_booking(booking).await?;
    info!(booking = %booking.id, "booking refunded");
    Ok(booking)
}

pub async fn review_booking(repo: &dyn Repo, actor: &Actor, id: Id, review: NewReview) -> ApiResult<Booking> {
    if !(1..=5).contains(&review.rating) {
        return Err(ApiError::bad_request("Rating must be between 1 and 5"));
    }
    retry_on_conflict(|| {
        let review = review.clone();
        async move {
            let mut booking = load(repo, id).await?;
            authorize(actor, Action::Review, &booking)?;
            if booking.status != BookingStatus::Completed {
                return Err(ApiError::bad_request("Only completed bookings can be reviewed"));
            }
            if booking.rating.is_some() {
                return Err(ApiError::bad_request("Booking has already been reviewed"));
            }
            booking.rating = Some(review.rating);
            booking.review = review.review.filter(|r| !r.trim().is_empty());
            booking.updated_at = Utc::now();
            Ok(repo.update_booking(booking).await?)
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use BookingStatus::*;

    const ALL: [BookingStatus; 7] = [Pending, Negotiating, Confirmed, InProgress, Completed, Cancelled, Rejected];

    #[test]
    fn transition_table_matches_lifecycle() {
        let allowed = [
            (Pending, Negotiating),
            (Pending, Confirmed),
            (Pending, Cancelled),
            (Pending, Rejected),
            (Negotiating, Confirmed),
            (Negotiating, Cancelled),
            (Negotiating, Rejected),
            (Confirmed, InProgress),
            (Confirmed, Cancelled),
            (InProgress, Completed),
            (InProgress, Cancelled),
        ];
        for from in ALL {
            for to in ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{} -> {}",
                    from.as_str(),
                    to.as_str()
                );
            }
        }
    }

    #[test]
    fn terminal_states() {
        let terminal: Vec<_> = ALL.into_iter().filter(|s| s.is_terminal()).collect();
        assert_eq!(terminal, vec![Completed, Cancelled, Rejected]);
        assert!(InProgress.is_active());
    }

    #[test]
    fn transaction_ids_look_mocked() {
        let id = mock_transaction_id();
        assert!(id.starts_with("TXN-"));
        assert_eq!(id.len(), 4 + 16);
        assert_ne!(id, mock_transaction_id());
    }
}
