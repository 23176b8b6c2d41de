use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::Role;

pub type Id = Uuid;

// ---------------------------------------------------------------- users

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct ProviderProfile {
    pub business_name: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub is_verified: bool,
}

/// Stored account. `password_hash` never leaves the server; handlers answer with [`PublicUser`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Id,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub phone: Option<String>,
    pub is_active: bool,
    pub provider_profile: Option<ProviderProfile>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PublicUser {
    pub id: Id,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub phone: Option<String>,
    pub is_active: bool,
    pub provider_profile: Option<ProviderProfile>,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for PublicUser {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            name: u.name.clone(),
            email: u.email.clone(),
            role: u.role,
            phone: u.phone.clone(),
            is_active: u.is_active,
            provider_profile: u.provider_profile.clone(),
            created_at: u.created_at,
        }
    }
}

// ------------------------------------------------------------ catalogue

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Category {
    pub id: Id,
    pub name: String,
    pub description: String,
    pub icon: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewCategory {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub icon: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateCategory {
    pub name: Option<String>,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub is_active: Option<bool>,
}

/// A priced offering published by a provider.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Service {
    pub id: Id,
    pub provider: Id,
    pub category: Id,
    pub name: String,
    pub description: String,
    pub base_price: f64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewService {
    pub category: Id,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub base_price: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateService {
    pub category: Option<Id>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub base_price: Option<f64>,
    pub is_active: Option<bool>,
}

// --------------------------------------------------------------- issues

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, ToSchema, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, ToSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    #[default]
    Open,
    InProgress,
    Resolved,
    Closed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct Location {
    pub address: Option<String>,
    pub coordinates: Option<Coordinates>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Contribution {
    pub user: Id,
    pub amount: f64,
    pub message: Option<String>,
    pub transaction_id: String,
    pub contributed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct Crowdfunding {
    pub is_enabled: bool,
    pub target_amount: f64,
    pub raised_amount: f64,
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub contributors: Vec<Contribution>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IssueView {
    pub user: Id,
    pub viewed_at: DateTime<Utc>,
}

/// A civic problem reported by a consumer.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Issue {
    pub id: Id,
    pub title: String,
    pub description: String,
    pub category: Id,
    pub location: Location,
    pub priority: Priority,
    pub status: IssueStatus,
    pub consumer: Id,
    pub assigned_provider: Option<Id>,
    pub images: Vec<String>,
    pub upvotes: u32,
    pub upvoted_by: Vec<Id>,
    pub views_count: u32,
    pub viewed_by: Vec<IssueView>,
    pub crowdfunding: Crowdfunding,
    pub estimated_cost: Option<f64>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CrowdfundingSettings {
    pub is_enabled: bool,
    pub target_amount: Option<f64>,
    pub deadline: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewIssue {
    pub title: String,
    pub description: String,
    pub category: Id,
    #[serde(default)]
    pub location: Location,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub images: Vec<String>,
    pub estimated_cost: Option<f64>,
    pub crowdfunding: Option<CrowdfundingSettings>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateIssue {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<Id>,
    pub location: Option<Location>,
    pub priority: Option<Priority>,
    pub images: Option<Vec<String>>,
    pub estimated_cost: Option<f64>,
    pub crowdfunding: Option<CrowdfundingSettings>,
    pub status: Option<IssueStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewContribution {
    pub amount: f64,
    pub message: Option<String>,
}

// ------------------------------------------------------------- bookings

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, ToSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    #[default]
    Pending,
    Negotiating,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
    Rejected,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, ToSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
    Refunded,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PriceEntry {
    pub amount: f64,
    pub proposed_by: Id,
    pub at: DateTime<Utc>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ScheduleEntry {
    pub date: DateTime<Utc>,
    pub proposed_by: Id,
    pub at: DateTime<Utc>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RequirementEntry {
    pub requirement: String,
    pub proposed_by: Id,
    pub at: DateTime<Utc>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct BookingNegotiation {
    pub is_negotiated: bool,
    pub price_history: Vec<PriceEntry>,
    pub schedule_history: Vec<ScheduleEntry>,
    pub requirement_history: Vec<RequirementEntry>,
}

/// A scheduled, priced engagement between a consumer and a provider.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Booking {
    pub id: Id,
    pub consumer: Id,
    pub provider: Id,
    pub service: Id,
    pub issue: Option<Id>,
    pub scheduled_date: DateTime<Utc>,
    pub scheduled_time: Option<String>,
    pub status: BookingStatus,
    pub total_amount: f64,
    pub original_amount: f64,
    pub negotiated_amount: Option<f64>,
    pub payment_status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub notes: String,
    pub cancellation_reason: Option<String>,
    pub negotiation_data: BookingNegotiation,
    pub chat_room_id: Option<Id>,
    pub rating: Option<u8>,
    pub review: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewBooking {
    pub service_id: Id,
    pub provider_id: Id,
    pub issue_id: Option<Id>,
    pub scheduled_date: DateTime<Utc>,
    pub scheduled_time: Option<String>,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BookingStatusUpdate {
    pub status: BookingStatus,
    pub cancellation_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct CancelBooking {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewReview {
    pub rating: u8,
    pub review: Option<String>,
}

// ------------------------------------------------------------ proposals

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProposalType {
    Price,
    Schedule,
    Requirements,
    Combined,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, ToSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    #[default]
    Pending,
    Accepted,
    Rejected,
    Countered,
    Cancelled,
    Expired,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct ProposedChanges {
    pub price: Option<f64>,
    pub scheduled_date: Option<DateTime<Utc>>,
    pub requirements: Option<String>,
}

impl ProposedChanges {
    pub fn is_empty(&self) -> bool {
        self.price.is_none() && self.scheduled_date.is_none() && self.requirements.is_none()
    }
}

/// Booking terms at the moment a proposal was made.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BookingSnapshot {
    pub price: f64,
    pub scheduled_date: DateTime<Utc>,
    pub requirements: String,
    pub total_amount: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationAction {
    Created,
    Accepted,
    Rejected,
    Countered,
    Cancelled,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NegotiationEvent {
    pub action: NegotiationAction,
    pub performed_by: Option<Id>,
    pub message: Option<String>,
    pub snapshot: Option<ProposedChanges>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Proposal {
    pub id: Id,
    pub booking_id: Id,
    pub proposed_by: Id,
    pub proposed_to: Id,
    pub proposal_type: ProposalType,
    pub original_data: BookingSnapshot,
    pub proposed_changes: ProposedChanges,
    pub justification: Option<String>,
    pub status: ProposalStatus,
    pub response_message: Option<String>,
    pub countered_by: Option<Id>,
    pub expires_at: DateTime<Utc>,
    pub negotiation_history: Vec<NegotiationEvent>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewProposal {
    pub proposal_type: ProposalType,
    pub proposed_changes: ProposedChanges,
    pub justification: Option<String>,
    pub expiration_hours: Option<i64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResponseAction {
    Accept,
    Reject,
    Counter,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProposalResponse {
    pub action: ResponseAction,
    pub response_message: Option<String>,
    pub counter_proposal: Option<ProposedChanges>,
}

// ----------------------------------------------------------------- chat

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChatRoom {
    pub id: Id,
    pub booking_id: Id,
    /// Always `[consumer, provider]` of the booking.
    pub participants: Vec<Id>,
    pub last_message: Option<Id>,
    #[schema(value_type = Object)]
    pub unread_count: HashMap<Id, u32>,
    pub original_price: f64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    #[default]
    Text,
    PriceOffer,
    ScheduleModification,
    Image,
    Document,
    System,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Image,
    Document,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Attachment {
    pub kind: AttachmentKind,
    pub url: String,
    pub filename: String,
    pub mime: String,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PriceOffer {
    pub proposal_id: Id,
    pub amount: f64,
    pub description: String,
    pub valid_until: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ScheduleModification {
    pub proposal_id: Id,
    pub proposed_date: DateTime<Utc>,
    pub proposed_time: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct MessageContent {
    pub text: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    pub price_offer: Option<PriceOffer>,
    pub schedule_modification: Option<ScheduleModification>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReadReceipt {
    pub user_id: Id,
    pub read_at: DateTime<Utc>,
}

/// Chat messages are append-only; only `read_by` ever changes.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Message {
    pub id: Id,
    pub chat_room_id: Id,
    pub sender_id: Id,
    pub message_type: MessageType,
    pub content: MessageContent,
    pub read_by: Vec<ReadReceipt>,
    pub reply_to: Option<Id>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TextContent {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewMessage {
    pub content: TextContent,
    pub reply_to: Option<Id>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewPriceOffer {
    pub amount: f64,
    pub description: Option<String>,
    pub valid_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewScheduleModification {
    pub proposed_date: DateTime<Utc>,
    pub proposed_time: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OfferAction {
    Accept,
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OfferResponse {
    pub action: OfferAction,
    pub message: Option<String>,
}

/// One price-bearing proposal as seen from the chat room.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OfferSummary {
    pub proposal_id: Id,
    pub offered_by: Id,
    pub amount: f64,
    pub status: ProposalStatus,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NegotiationSummary {
    pub original_price: f64,
    pub current_offer: f64,
    pub agreed_price: Option<f64>,
    pub counter_offers: Vec<OfferSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChatRoomView {
    #[serde(flatten)]
    pub room: ChatRoom,
    pub negotiation_data: NegotiationSummary,
}
