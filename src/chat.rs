//! Per-booking chat rooms. Offers posted here are ordinary proposals; the
//! messages only point at them, and the room's negotiation summary is read
//! back from the proposals.

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use crate::auth::Actor;
use crate::error::{retry_on_conflict, ApiError, ApiResult, RepoResultExt};
use crate::models::*;
use crate::negotiation::{self, Responded, Terms};
use crate::policy::{authorize, authorize_kind, Action, ResourceKind};
use crate::repo::{Page, Paged, ProposalFilter, Repo, RepoError};
use crate::storage::{inspect_upload, AttachmentStore};

pub const DEFAULT_MESSAGE_PAGE: u32 = 50;
pub const UPLOAD_URL_PREFIX: &str = "/uploads/chat";

/// Folds a booking's proposals into the room's negotiation summary.
pub fn summarize(
    original_price: f64,
    current_total: f64,
    proposals: &[Proposal],
    now: DateTime<Utc>,
) -> NegotiationSummary {
    let mut offers: Vec<OfferSummary> = proposals
        .iter()
        .filter_map(|p| {
            p.proposed_changes.price.map(|amount| OfferSummary {
                proposal_id: p.id,
                offered_by: p.proposed_by,
                amount,
                status: if p.status == ProposalStatus::Pending && p.expires_at <= now {
                    ProposalStatus::Expired
                } else {
                    p.status
                },
                at: p.created_at,
            })
        })
        .collect();
    offers.sort_by_key(|o| o.at);

    let agreed_price = offers.iter().rev().find(|o| o.status == ProposalStatus::Accepted).map(|o| o.amount);
    let current_offer = offers
        .iter()
        .rev()
        .find(|o| o.status == ProposalStatus::Pending)
        .map(|o| o.amount)
        .or(agreed_price)
        .unwrap_or(current_total);
    NegotiationSummary { original_price, current_offer, agreed_price, counter_offers: offers }
}

pub async fn room_view(repo: &dyn Repo, room: ChatRoom) -> ApiResult<ChatRoomView> {
    let current_total = match repo.get_booking(room.booking_id).await {
        Ok(b) => b.total_amount,
        Err(RepoError::NotFound) => room.original_price,
        Err(e) => return Err(e.into()),
    };
    let proposals = repo
        .list_proposals(&ProposalFilter { booking_id: Some(room.booking_id), ..Default::default() })
        .await?;
    let negotiation_data = summarize(room.original_price, current_total, &proposals, Utc::now());
    Ok(ChatRoomView { room, negotiation_data })
}

/// Returns the booking's room, creating it on first access.
pub async fn open_room(repo: &dyn Repo, actor: &Actor, booking_id: Id) -> ApiResult<ChatRoomView> {
    let booking = repo.get_booking(booking_id).await.or_not_found("Booking")?;
    authorize(actor, Action::Read, &booking)?;

    if let Some(room) = repo.find_room_by_booking(booking_id).await? {
        return room_view(repo, room).await;
    }
    let now = Utc::now();
    let room = ChatRoom {
        id: Id::new_v4(),
        booking_id,
        participants: vec![booking.consumer, booking.provider],
        last_message: None,
        unread_count: Default::default(),
        original_price: booking.original_amount,
        is_active: true,
        created_at: now,
        updated_at: now,
        version: 0,
    };
    let room = match repo.create_room(room).await {
        Ok(room) => {
            info!(room = %room.id, booking = %booking_id, "chat room created");
            room
        }
        // lost the creation race, use the winner's room
        Err(RepoError::Conflict) => repo
            .find_room_by_booking(booking_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Chat room"))?,
        Err(e) => return Err(e.into()),
    };

    let room_id = room.id;
    retry_on_conflict(|| async move {
        let mut b = repo.get_booking(booking_id).await.or_not_found("Booking")?;
        if b.chat_room_id != Some(room_id) {
            b.chat_room_id = Some(room_id);
            repo.update_booking(b).await?;
        }
        Ok(())
    })
    .await?;
    room_view(repo, room).await
}

pub async fn list_rooms(repo: &dyn Repo, actor: &Actor) -> ApiResult<Vec<ChatRoomView>> {
    authorize_kind(actor, ResourceKind::ChatRoom, Action::List)?;
    let rooms = repo.list_rooms_for(actor.id).await?;
    let mut out = Vec::with_capacity(rooms.len());
    for room in rooms.into_iter().filter(|r| r.is_active) {
        out.push(room_view(repo, room).await?);
    }
    Ok(out)
}

async fn load_room(repo: &dyn Repo, id: Id) -> ApiResult<ChatRoom> {
    repo.get_room(id).await.or_not_found("Chat room")
}

/// Stores a message and updates the room's last message and unread counters.
async fn post(repo: &dyn Repo, message: Message) -> ApiResult<Message> {
    let message = repo.create_message(message).await.or_not_found("Chat room")?;
    let (room_id, sender, message_id) = (message.chat_room_id, message.sender_id, message.id);
    retry_on_conflict(|| async move {
        let mut room = load_room(repo, room_id).await?;
        for p in room.participants.clone() {
            if p != sender {
                *room.unread_count.entry(p).or_insert(0) += 1;
            }
        }
        room.last_message = Some(message_id);
        room.updated_at = Utc::now();
        repo.update_room(room).await?;
        Ok(())
    })
    .await?;
    Ok(message)
}

fn new_message(room_id: Id, sender: Id, message_type: MessageType, content: MessageContent, reply_to: Option<Id>) -> Message {
    Message {
        id: Id::new_v4(),
        chat_room_id: room_id,
        sender_id: sender,
        message_type,
        content,
        read_by: Vec::new(),
        reply_to,
        created_at: Utc::now(),
    }
}

/// Chronological page of messages. Reading marks the other side's messages as
/// read by the caller and clears the caller's unread counter.
pub async fn list_messages(repo: &dyn Repo, actor: &Actor, room_id: Id, page: Page) -> ApiResult<Paged<Message>> {
    let room = load_room(repo, room_id).await?;
    authorize(actor, Action::Read, &room)?;
    let mut messages = repo.list_messages(room_id, page).await?;
    messages.items.reverse();

    if room.participants.contains(&actor.id) {
        repo.mark_read(room_id, actor.id, Utc::now()).await?;
        let me = actor.id;
        retry_on_conflict(|| async move {
            let mut room = load_room(repo, room_id).await?;
            if room.unread_count.get(&me).copied().unwrap_or(0) == 0 {
                return Ok(());
            }
            room.unread_count.insert(me, 0);
            repo.update_room(room).await?;
            Ok(())
        })
        .await?;
    }
    Ok(messages)
}

pub async fn send_text(repo: &dyn Repo, actor: &Actor, room_id: Id, new: NewMessage) -> ApiResult<Message> {
    let room = load_room(repo, room_id).await?;
    authorize(actor, Action::Send, &room)?;
    let text = new.content.text.trim();
    if text.is_empty() {
        return Err(ApiError::bad_request("Message text is required"));
    }
    if let Some(target) = new.reply_to {
        match repo.get_message(target).await {
            Ok(m) if m.chat_room_id == room_id => {}
            Ok(_) | Err(RepoError::NotFound) => return Err(ApiError::bad_request("Reply target not found")),
            Err(e) => return Err(e.into()),
        }
    }
    let content = MessageContent { text: Some(text.to_string()), ..Default::default() };
    post(repo, new_message(room_id, actor.id, MessageType::Text, content, new.reply_to)).await
}

/// The chat message that stands for a proposal.
fn proposal_message(room_id: Id, p: &Proposal, proposed_time: Option<String>) -> Message {
    let c = &p.proposed_changes;
    let justification = p.justification.clone().unwrap_or_default();
    let (message_type, content) = if let Some(amount) = c.price {
        let offer = PriceOffer { proposal_id: p.id, amount, description: justification, valid_until: p.expires_at };
        (MessageType::PriceOffer, MessageContent { price_offer: Some(offer), ..Default::default() })
    } else if let Some(date) = c.scheduled_date {
        let change = ScheduleModification { proposal_id: p.id, proposed_date: date, proposed_time, reason: justification };
        (MessageType::ScheduleModification, MessageContent { schedule_modification: Some(change), ..Default::default() })
    } else {
        let text = format!("Proposed requirements: {}", c.requirements.clone().unwrap_or_default());
        (MessageType::System, MessageContent { text: Some(text), ..Default::default() })
    };
    new_message(room_id, p.proposed_by, message_type, content, None)
}

/// Posts a proposal into the booking's room, if the booking has one.
pub async fn announce_proposal(repo: &dyn Repo, proposal: &Proposal, proposed_time: Option<String>) -> ApiResult<()> {
    if let Some(room) = repo.find_room_by_booking(proposal.booking_id).await? {
        post(repo, proposal_message(room.id, proposal, proposed_time)).await?;
    }
    Ok(())
}

fn outcome_text(subject: &str, action: ResponseAction, message: Option<&str>) -> String {
    let verb = match action {
        ResponseAction::Accept => "accepted",
        ResponseAction::Reject => "rejected",
        ResponseAction::Counter => "countered",
    };
    match message {
        Some(m) if !m.trim().is_empty() => format!("{subject} {verb}. {}", m.trim()),
        _ => format!("{subject} {verb}."),
    }
}

/// Posts the outcome of a proposal response into the booking's room, if any.
pub async fn announce_response(repo: &dyn Repo, actor: &Actor, out: &Responded, action: ResponseAction) -> ApiResult<()> {
    let Some(room) = repo.find_room_by_booking(out.proposal.booking_id).await? else {
        return Ok(());
    };
    let text = outcome_text("Proposal", action, out.proposal.response_message.as_deref());
    let content = MessageContent { text: Some(text), ..Default::default() };
    post(repo, new_message(room.id, actor.id, MessageType::System, content, None)).await?;
    if let Some(counter) = &out.counter {
        post(repo, proposal_message(room.id, counter, None)).await?;
    }
    Ok(())
}

async fn room_and_booking(repo: &dyn Repo, actor: &Actor, room_id: Id) -> ApiResult<(ChatRoom, Booking)> {
    let room = load_room(repo, room_id).await?;
    authorize(actor, Action::Send, &room)?;
    let booking = repo.get_booking(room.booking_id).await.or_not_found("Booking")?;
    Ok((room, booking))
}

fn offer_expiry(valid_until: Option<DateTime<Utc>>, default_hours: i64, now: DateTime<Utc>) -> ApiResult<DateTime<Utc>> {
    let at = valid_until.unwrap_or(now + Duration::hours(default_hours));
    if at <= now {
        return Err(ApiError::bad_request("Offer must be valid until a future time"));
    }
    Ok(at)
}

pub async fn send_price_offer(
    repo: &dyn Repo,
    actor: &Actor,
    room_id: Id,
    offer: NewPriceOffer,
    default_ttl_hours: i64,
) -> ApiResult<Message> {
    let (room, booking) = room_and_booking(repo, actor, room_id).await?;
    let terms = Terms {
        proposal_type: ProposalType::Price,
        changes: ProposedChanges { price: Some(offer.amount), ..Default::default() },
        justification: offer.description.filter(|d| !d.trim().is_empty()),
        expires_at: offer_expiry(offer.valid_until, default_ttl_hours, Utc::now())?,
    };
    let proposal = negotiation::propose(repo, actor, &booking, terms).await?;
    post(repo, proposal_message(room.id, &proposal, None)).await
}

pub async fn send_schedule_modification(
    repo: &dyn Repo,
    actor: &Actor,
    room_id: Id,
    change: NewScheduleModification,
    default_ttl_hours: i64,
) -> ApiResult<Message> {
    let (room, booking) = room_and_booking(repo, actor, room_id).await?;
    let now = Utc::now();
    if change.proposed_date <= now {
        return Err(ApiError::bad_request("Proposed date must be in the future"));
    }
    let terms = Terms {
        proposal_type: ProposalType::Schedule,
        changes: ProposedChanges { scheduled_date: Some(change.proposed_date), ..Default::default() },
        justification: change.reason.filter(|r| !r.trim().is_empty()),
        expires_at: now + Duration::hours(default_ttl_hours),
    };
    let proposal = negotiation::propose(repo, actor, &booking, terms).await?;
    post(repo, proposal_message(room.id, &proposal, change.proposed_time)).await
}

/// Answers a price offer message through the proposal it references and posts
/// a system reply.
pub async fn respond_to_offer(
    repo: &dyn Repo,
    actor: &Actor,
    room_id: Id,
    message_id: Id,
    response: OfferResponse,
    default_ttl_hours: i64,
) -> ApiResult<Message> {
    let room = load_room(repo, room_id).await?;
    authorize(actor, Action::Send, &room)?;
    let offer = match repo.get_message(message_id).await {
        Ok(m) if m.chat_room_id == room_id => m.content.price_offer,
        Ok(_) | Err(RepoError::NotFound) => None,
        Err(e) => return Err(e.into()),
    };
    let offer = offer.ok_or_else(|| ApiError::not_found("Price offer"))?;

    let action = match response.action {
        OfferAction::Accept => ResponseAction::Accept,
        OfferAction::Reject => ResponseAction::Reject,
    };
    let reply = ProposalResponse { action, response_message: response.message.clone(), counter_proposal: None };
    negotiation::respond(repo, actor, offer.proposal_id, reply, default_ttl_hours).await?;

    let text = outcome_text("Price offer", action, response.message.as_deref());
    let content = MessageContent { text: Some(text), ..Default::default() };
    post(repo, new_message(room_id, actor.id, MessageType::System, content, Some(message_id))).await
}

/// A file received from a multipart upload.
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub description: Option<String>,
}

pub async fn upload_file(
    repo: &dyn Repo,
    store: &dyn AttachmentStore,
    actor: &Actor,
    room_id: Id,
    upload: Upload,
) -> ApiResult<Message> {
    let room = load_room(repo, room_id).await?;
    authorize(actor, Action::Send, &room)?;
    let inspected = inspect_upload(&upload.filename, &upload.bytes).ok_or(ApiError::UnsupportedMediaType)?;
    store.save(&inspected.stored_name, &upload.bytes).await?;

    let message_type = match inspected.kind {
        AttachmentKind::Image => MessageType::Image,
        AttachmentKind::Document => MessageType::Document,
    };
    let attachment = Attachment {
        kind: inspected.kind,
        url: format!("{UPLOAD_URL_PREFIX}/{}", inspected.stored_name),
        filename: upload.filename,
        mime: inspected.mime,
        size: upload.bytes.len() as u64,
    };
    let content = MessageContent {
        text: upload.description.filter(|d| !d.trim().is_empty()),
        attachments: vec![attachment],
        ..Default::default()
    };
    let message = post(repo, new_message(room_id, actor.id, message_type, content, None)).await?;
    info!(room = %room_id, message = %message.id, file = %inspected.stored_name, "attachment uploaded");
    Ok(message)
}
