//! Proposals: the single pending-offer object for a booking. Both the REST
//! proposal endpoints and chat offers go through [`propose`] and [`respond`].

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use utoipa::ToSchema;

use crate::auth::Actor;
use crate::chat;
use crate::error::{retry_on_conflict, ApiError, ApiResult, RepoResultExt};
use crate::models::*;
use crate::policy::{authorize, authorize_kind, Action, ResourceKind};
use crate::repo::{ProposalFilter, Repo};

pub const MAX_EXPIRATION_HOURS: i64 = 168;

impl ProposalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProposalStatus::Pending => "pending",
            ProposalStatus::Accepted => "accepted",
            ProposalStatus::Rejected => "rejected",
            ProposalStatus::Countered => "countered",
            ProposalStatus::Cancelled => "cancelled",
            ProposalStatus::Expired => "expired",
        }
    }
}

/// Bookings whose terms can still be renegotiated.
pub fn is_negotiable(status: BookingStatus) -> bool {
    matches!(status, BookingStatus::Pending | BookingStatus::Negotiating | BookingStatus::Confirmed)
}

fn validate_changes(changes: &ProposedChanges) -> ApiResult<()> {
    if changes.is_empty() {
        return Err(ApiError::bad_request("Proposed changes cannot be empty"));
    }
    if let Some(price) = changes.price {
        if !(price > 0.0) || !price.is_finite() {
            return Err(ApiError::bad_request("Proposed price must be greater than zero"));
        }
    }
    Ok(())
}

/// Expiry for a REST-created proposal.
pub fn expiry_from_hours(hours: Option<i64>, default_hours: i64, now: DateTime<Utc>) -> ApiResult<DateTime<Utc>> {
    let hours = hours.unwrap_or(default_hours);
    if !(1..=MAX_EXPIRATION_HOURS).contains(&hours) {
        return Err(ApiError::bad_request(format!(
            "Expiration must be between 1 and {MAX_EXPIRATION_HOURS} hours"
        )));
    }
    Ok(now + Duration::hours(hours))
}

fn event(action: NegotiationAction, by: Option<Id>, message: Option<String>, snapshot: Option<ProposedChanges>, at: DateTime<Utc>) -> NegotiationEvent {
    NegotiationEvent { action, performed_by: by, message, snapshot, at }
}

fn snapshot_of(booking: &Booking) -> BookingSnapshot {
    BookingSnapshot {
        price: booking.original_amount,
        scheduled_date: booking.scheduled_date,
        requirements: booking.notes.clone(),
        total_amount: booking.total_amount,
    }
}

/// Changes filled in with the booking's current terms, as recorded in the audit log.
fn effective_terms(changes: &ProposedChanges, booking: &Booking) -> ProposedChanges {
    ProposedChanges {
        price: changes.price.or(Some(booking.total_amount)),
        scheduled_date: changes.scheduled_date.or(Some(booking.scheduled_date)),
        requirements: changes.requirements.clone().or_else(|| Some(booking.notes.clone())),
    }
}

/// Terms for a new proposal.
#[derive(Debug, Clone)]
pub struct Terms {
    pub proposal_type: ProposalType,
    pub changes: ProposedChanges,
    pub justification: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// Creates a pending proposal from one booking party to the other and moves a
/// pending booking to `negotiating`.
pub async fn propose(repo: &dyn Repo, actor: &Actor, booking: &Booking, terms: Terms) -> ApiResult<Proposal> {
    authorize(actor, Action::Propose, booking)?;
    if !is_negotiable(booking.status) {
        return Err(ApiError::bad_request("Booking can no longer be negotiated"));
    }
    validate_changes(&terms.changes)?;
    let now = Utc::now();
    if terms.expires_at <= now {
        return Err(ApiError::bad_request("Expiry must be in the future"));
    }

    let proposed_to = if actor.id == booking.consumer { booking.provider } else { booking.consumer };
    let proposal = Proposal {
        id: Id::new_v4(),
        booking_id: booking.id,
        proposed_by: actor.id,
        proposed_to,
        proposal_type: terms.proposal_type,
        original_data: snapshot_of(booking),
        negotiation_history: vec![event(
            NegotiationAction::Created,
            Some(actor.id),
            terms.justification.clone(),
            Some(effective_terms(&terms.changes, booking)),
            now,
        )],
        proposed_changes: terms.changes,
        justification: terms.justification,
        status: ProposalStatus::Pending,
        response_message: None,
        countered_by: None,
        expires_at: terms.expires_at,
        created_at: now,
        updated_at: now,
        version: 0,
    };
    let proposal = repo.create_proposal(proposal).await?;

    let booking_id = booking.id;
    retry_on_conflict(|| async move {
        let mut b = repo.get_booking(booking_id).await.or_not_found("Booking")?;
        if b.status == BookingStatus::Pending {
            b.status = BookingStatus::Negotiating;
            b.updated_at = Utc::now();
            repo.update_booking(b).await?;
        }
        Ok(())
    })
    .await?;

    info!(proposal = %proposal.id, booking = %booking_id, by = %actor.id, "proposal created");
    Ok(proposal)
}

/// Marks a pending proposal past its expiry as `expired` and persists it.
pub async fn expire_if_due(repo: &dyn Repo, proposal: Proposal, now: DateTime<Utc>) -> ApiResult<Proposal> {
    if proposal.status != ProposalStatus::Pending || proposal.expires_at > now {
        return Ok(proposal);
    }
    let id = proposal.id;
    let mut p = proposal;
    p.status = ProposalStatus::Expired;
    p.negotiation_history.push(event(NegotiationAction::Expired, None, Some("Proposal expired".into()), None, now));
    p.updated_at = now;
    match repo.update_proposal(p).await {
        Ok(p) => {
            info!(proposal = %p.id, "proposal expired");
            Ok(p)
        }
        // someone else touched it first, their version wins
        Err(crate::repo::RepoError::Conflict) => Ok(repo.get_proposal(id).await?),
        Err(e) => Err(e.into()),
    }
}

/// Writes accepted terms into the booking and its negotiation histories.
/// `proposer` is who put the terms forward.
pub fn apply_acceptance(
    booking: &mut Booking,
    changes: &ProposedChanges,
    proposer: Id,
    message: Option<String>,
    now: DateTime<Utc>,
) {
    let data = &mut booking.negotiation_data;
    if let Some(price) = changes.price {
        if price != booking.total_amount {
            data.is_negotiated = true;
        }
        booking.negotiated_amount = Some(price);
        booking.total_amount = price;
        data.price_history.push(PriceEntry { amount: price, proposed_by: proposer, at: now, message: message.clone() });
    }
    if let Some(date) = changes.scheduled_date {
        booking.scheduled_date = date;
        data.schedule_history.push(ScheduleEntry { date, proposed_by: proposer, at: now, message: message.clone() });
    }
    if let Some(req) = &changes.requirements {
        booking.notes = req.clone();
        data.requirement_history.push(RequirementEntry {
            requirement: req.clone(),
            proposed_by: proposer,
            at: now,
            message,
        });
    }
    if booking.status.can_transition_to(BookingStatus::Confirmed) {
        booking.status = BookingStatus::Confirmed;
    }
    booking.updated_at = now;
}

/// What a response produced.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Responded {
    pub proposal: Proposal,
    /// Set for `counter`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counter: Option<Proposal>,
    /// Set for `accept`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking: Option<Booking>,
}

async fn load(repo: &dyn Repo, id: Id) -> ApiResult<Proposal> {
    repo.get_proposal(id).await.or_not_found("Proposal")
}

async fn load_negotiable_booking(repo: &dyn Repo, id: Id) -> ApiResult<Booking> {
    let booking = repo.get_booking(id).await.or_not_found("Booking")?;
    if !is_negotiable(booking.status) {
        return Err(ApiError::bad_request("Booking can no longer be negotiated"));
    }
    Ok(booking)
}

/// Puts an accepted proposal back to pending after its booking could not be updated.
async fn release_claim(repo: &dyn Repo, mut proposal: Proposal) {
    let id = proposal.id;
    proposal.status = ProposalStatus::Pending;
    proposal.response_message = None;
    proposal.negotiation_history.pop();
    match repo.update_proposal(proposal).await {
        Ok(_) => warn!(proposal = %id, "acceptance rolled back, booking update failed"),
        Err(e) => error!(proposal = %id, "could not reopen proposal after failed acceptance: {e}"),
    }
}

/// The one place where a pending offer is accepted, rejected or countered.
pub async fn respond(
    repo: &dyn Repo,
    actor: &Actor,
    proposal_id: Id,
    response: ProposalResponse,
    counter_ttl_hours: i64,
) -> ApiResult<Responded> {
    let mut proposal = load(repo, proposal_id).await?;
    authorize(actor, Action::Respond, &proposal)?;
    if proposal.status != ProposalStatus::Pending {
        return Err(ApiError::bad_request("Proposal is no longer active"));
    }
    let now = Utc::now();
    if proposal.expires_at <= now {
        expire_if_due(repo, proposal, now).await?;
        return Err(ApiError::bad_request("Proposal has expired"));
    }
    let message = response.response_message.filter(|m| !m.trim().is_empty());
    proposal.response_message = message.clone();
    proposal.updated_at = now;

    match response.action {
        ResponseAction::Accept => {
            load_negotiable_booking(repo, proposal.booking_id).await?;
            proposal.status = ProposalStatus::Accepted;
            proposal.negotiation_history.push(event(
                NegotiationAction::Accepted,
                Some(actor.id),
                Some(message.clone().unwrap_or_else(|| "Proposal accepted".into())),
                Some(proposal.proposed_changes.clone()),
                now,
            ));
            // the accepted status claims the proposal; released again if the booking write fails
            let proposal = repo.update_proposal(proposal).await?;

            let changes = proposal.proposed_changes.clone();
            let proposer = proposal.proposed_by;
            let booking_id = proposal.booking_id;
            let written = retry_on_conflict(|| {
                let changes = changes.clone();
                let message = message.clone();
                async move {
                    let mut booking = load_negotiable_booking(repo, booking_id).await?;
                    apply_acceptance(&mut booking, &changes, proposer, message, Utc::now());
                    Ok(repo.update_booking(booking).await?)
                }
            })
            .await;
            let booking = match written {
                Ok(booking) => booking,
                Err(e) => {
                    release_claim(repo, proposal).await;
                    return Err(e);
                }
            };
            info!(proposal = %proposal.id, booking = %booking.id, total = booking.total_amount, "proposal accepted");
            Ok(Responded { proposal, counter: None, booking: Some(booking) })
        }
        ResponseAction::Reject => {
            proposal.status = ProposalStatus::Rejected;
            proposal.negotiation_history.push(event(
                NegotiationAction::Rejected,
                Some(actor.id),
                Some(message.unwrap_or_else(|| "Proposal rejected".into())),
                None,
                now,
            ));
            let proposal = repo.update_proposal(proposal).await?;
            info!(proposal = %proposal.id, by = %actor.id, "proposal rejected");
            Ok(Responded { proposal, counter: None, booking: None })
        }
        ResponseAction::Counter => {
            let changes = response
                .counter_proposal
                .ok_or_else(|| ApiError::bad_request("Counter proposal details are required"))?;
            validate_changes(&changes)?;
            let booking = load_negotiable_booking(repo, proposal.booking_id).await?;

            let counter_id = Id::new_v4();
            proposal.status = ProposalStatus::Countered;
            proposal.countered_by = Some(counter_id);
            proposal.negotiation_history.push(event(
                NegotiationAction::Countered,
                Some(actor.id),
                Some(message.clone().unwrap_or_else(|| "Proposal countered".into())),
                None,
                now,
            ));
            let proposal = repo.update_proposal(proposal).await?;

            let counter = Proposal {
                id: counter_id,
                booking_id: proposal.booking_id,
                proposed_by: actor.id,
                proposed_to: proposal.proposed_by,
                proposal_type: proposal.proposal_type,
                original_data: proposal.original_data.clone(),
                negotiation_history: vec![event(
                    NegotiationAction::Created,
                    Some(actor.id),
                    Some(message.clone().unwrap_or_else(|| "Counter proposal created".into())),
                    Some(effective_terms(&changes, &booking)),
                    now,
                )],
                proposed_changes: changes,
                justification: Some(message.unwrap_or_else(|| "Counter proposal".into())),
                status: ProposalStatus::Pending,
                response_message: None,
                countered_by: None,
                expires_at: now + Duration::hours(counter_ttl_hours),
                created_at: now,
                updated_at: now,
                version: 0,
            };
            let counter = repo.create_proposal(counter).await?;
            info!(proposal = %proposal.id, counter = %counter.id, by = %actor.id, "proposal countered");
            Ok(Responded { proposal, counter: Some(counter), booking: None })
        }
    }
}

pub async fn cancel_proposal(repo: &dyn Repo, actor: &Actor, id: Id) -> ApiResult<Proposal> {
    let proposal = load(repo, id).await?;
    authorize(actor, Action::Cancel, &proposal).map_err(|_| ApiError::Forbidden("Only the creator can cancel a proposal".into()))?;
    let now = Utc::now();
    let mut proposal = expire_if_due(repo, proposal, now).await?;
    if proposal.status != ProposalStatus::Pending {
        return Err(ApiError::bad_request("Can only cancel pending proposals"));
    }
    proposal.status = ProposalStatus::Cancelled;
    proposal.negotiation_history.push(event(
        NegotiationAction::Cancelled,
        Some(actor.id),
        Some("Proposal cancelled by creator".into()),
        None,
        now,
    ));
    proposal.updated_at = now;
    let proposal = repo.update_proposal(proposal).await?;
    info!(proposal = %proposal.id, "proposal cancelled");
    Ok(proposal)
}

pub async fn get_proposal(repo: &dyn Repo, actor: &Actor, id: Id) -> ApiResult<Proposal> {
    let proposal = load(repo, id).await?;
    authorize(actor, Action::Read, &proposal)?;
    expire_if_due(repo, proposal, Utc::now()).await
}

async fn expire_all(repo: &dyn Repo, proposals: Vec<Proposal>) -> ApiResult<Vec<Proposal>> {
    let now = Utc::now();
    let mut out = Vec::with_capacity(proposals.len());
    for p in proposals {
        out.push(expire_if_due(repo, p, now).await?);
    }
    Ok(out)
}

/// Newest first.
pub async fn list_for_booking(repo: &dyn Repo, actor: &Actor, booking_id: Id) -> ApiResult<Vec<Proposal>> {
    let booking = repo.get_booking(booking_id).await.or_not_found("Booking")?;
    authorize(actor, Action::Read, &booking)?;
    let proposals = repo
        .list_proposals(&ProposalFilter { booking_id: Some(booking_id), ..Default::default() })
        .await?;
    expire_all(repo, proposals).await
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Sent,
    Received,
    #[default]
    All,
}

/// The caller's own proposals, newest first.
pub async fn list_mine(
    repo: &dyn Repo,
    actor: &Actor,
    direction: Direction,
    status: Option<ProposalStatus>,
) -> ApiResult<Vec<Proposal>> {
    authorize_kind(actor, ResourceKind::Proposal, Action::List)?;
    let mut filter = ProposalFilter { status, ..Default::default() };
    match direction {
        Direction::Sent => filter.proposed_by = Some(actor.id),
        Direction::Received => filter.proposed_to = Some(actor.id),
        Direction::All => filter.party = Some(actor.id),
    }
    let proposals = expire_all(repo, repo.list_proposals(&filter).await?).await?;
    // lazily expired proposals may no longer match a status filter
    Ok(proposals.into_iter().filter(|p| status.map_or(true, |s| p.status == s)).collect())
}

/// REST entry point: creates the proposal and mirrors it into the booking's chat room.
pub async fn create_proposal(
    repo: &dyn Repo,
    actor: &Actor,
    booking_id: Id,
    new: NewProposal,
    default_ttl_hours: i64,
) -> ApiResult<Proposal> {
    let booking = repo.get_booking(booking_id).await.or_not_found("Booking")?;
    let expires_at = expiry_from_hours(new.expiration_hours, default_ttl_hours, Utc::now())?;
    let terms = Terms {
        proposal_type: new.proposal_type,
        changes: new.proposed_changes,
        justification: new.justification.filter(|j| !j.trim().is_empty()),
        expires_at,
    };
    let proposal = propose(repo, actor, &booking, terms).await?;
    chat::announce_proposal(repo, &proposal, None).await?;
    Ok(proposal)
}

/// REST entry point: responds and posts the outcome into the booking's chat room.
pub async fn respond_to_proposal(
    repo: &dyn Repo,
    actor: &Actor,
    proposal_id: Id,
    response: ProposalResponse,
    default_ttl_hours: i64,
) -> ApiResult<Responded> {
    let action = response.action;
    let out = respond(repo, actor, proposal_id, response, default_ttl_hours).await?;
    chat::announce_response(repo, actor, &out, action).await?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn booking(status: BookingStatus) -> Booking {
        let now = Utc::now();
        Booking {
            id: Id::new_v4(),
            consumer: Id::new_v4(),
            provider: Id::new_v4(),
            service: Id::new_v4(),
            issue: None,
            scheduled_date: now,
            scheduled_time: None,
            status,
            total_amount: 400.0,
            original_amount: 400.0,
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

    #[test]
    fn accepted_price_confirms_and_records_history() {
        let mut b = booking(BookingStatus::Negotiating);
        let proposer = b.provider;
        let changes = ProposedChanges { price: Some(500.0), ..Default::default() };
        apply_acceptance(&mut b, &changes, proposer, None, Utc::now());
        assert_eq!(b.status, BookingStatus::Confirmed);
        assert_eq!(b.negotiated_amount, Some(500.0));
        assert_eq!(b.total_amount, 500.0);
        assert!(b.negotiation_data.is_negotiated);
        assert_eq!(b.negotiation_data.price_history.len(), 1);
        assert_eq!(b.negotiation_data.price_history[0].proposed_by, proposer);
    }

    #[test]
    fn schedule_only_change_keeps_price_flag_off() {
        let mut b = booking(BookingStatus::Confirmed);
        let date = Utc::now() + Duration::days(3);
        let changes = ProposedChanges { scheduled_date: Some(date), ..Default::default() };
        let consumer = b.consumer;
        apply_acceptance(&mut b, &changes, consumer, Some("later".into()), Utc::now());
        assert_eq!(b.status, BookingStatus::Confirmed);
        assert_eq!(b.scheduled_date, date);
        assert!(!b.negotiation_data.is_negotiated);
        assert_eq!(b.negotiation_data.schedule_history.len(), 1);
    }

    #[test]
    fn expiry_window_is_bounded() {
        let now = Utc::now();
        assert_eq!(expiry_from_hours(None, 24, now).unwrap(), now + Duration::hours(24));
        assert!(expiry_from_hours(Some(0), 24, now).is_err());
        assert!(expiry_from_hours(Some(169), 24, now).is_err());
        assert!(expiry_from_hours(Some(168), 24, now).is_ok());
    }

    #[test]
    fn empty_or_free_changes_are_invalid() {
        assert!(validate_changes(&ProposedChanges::default()).is_err());
        assert!(validate_changes(&ProposedChanges { price: Some(0.0), ..Default::default() }).is_err());
        assert!(validate_changes(&ProposedChanges { requirements: Some("bring a ladder".into()), ..Default::default() }).is_ok());
    }

    #[test]
    fn only_open_bookings_are_negotiable() {
        assert!(is_negotiable(BookingStatus::Confirmed));
        assert!(!is_negotiable(BookingStatus::InProgress));
        assert!(!is_negotiable(BookingStatus::Cancelled));
    }
}
