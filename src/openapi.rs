use utoipa::OpenApi;

use crate::auth::Role;
use crate::error::ApiErrorBody;
use crate::models::*;
use crate::negotiation::Responded;
use crate::response::Pagination;
use crate::routes::{admin, auth, bookings, catalog, chat, issues, proposals, stats};
use crate::stats::{
    AdminDashboard, BookingStats, ConsumerDashboard, Dashboard, IssueCounts, ProviderDashboard, UserCounts,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::register,
        auth::login,
        auth::me,
        catalog::list_categories,
        catalog::list_services,
        catalog::get_service,
        catalog::create_service,
        catalog::update_service,
        catalog::delete_service,
        issues::list_issues,
        issues::create_issue,
        issues::get_issue,
        issues::update_issue,
        issues::delete_issue,
        issues::upvote_issue,
        issues::accept_issue,
        issues::resolve_issue,
        issues::contribute,
        bookings::list_bookings,
        bookings::create_booking,
        bookings::booking_stats,
        bookings::get_booking,
        bookings::update_booking_status,
        bookings::delete_booking,
        bookings::cancel_booking,
        bookings::pay_booking,
        bookings::review_booking,
        proposals::create_proposal,
        proposals::list_booking_proposals,
        proposals::list_my_proposals,
        proposals::get_proposal,
        proposals::respond_to_proposal,
        proposals::cancel_proposal,
        chat::list_rooms,
        chat::open_room,
        chat::list_messages,
        chat::send_message,
        chat::send_price_offer,
        chat::respond_to_price_offer,
        chat::send_schedule_modification,
        chat::upload_file,
        stats::dashboard,
        admin::create_category,
        admin::update_category,
        admin::list_users,
        admin::set_user_status,
        admin::verify_provider,
        admin::refund_booking,
        admin::admin_stats,
    ),
    components(schemas(
        ApiErrorBody, Pagination, Role,
        auth::RegisterRequest, auth::LoginRequest, auth::AuthResponse,
        PublicUser, ProviderProfile,
        Category, NewCategory, UpdateCategory,
        Service, NewService, UpdateService,
        Issue, NewIssue, UpdateIssue, Priority, IssueStatus, Location, Coordinates,
        Crowdfunding, CrowdfundingSettings, Contribution, NewContribution, IssueView,
        issues::UpvoteResponse,
        Booking, NewBooking, BookingStatus, PaymentStatus, BookingStatusUpdate, CancelBooking, NewReview,
        BookingNegotiation, PriceEntry, ScheduleEntry, RequirementEntry,
        Proposal, NewProposal, ProposalType, ProposalStatus, ProposedChanges, BookingSnapshot,
        NegotiationAction, NegotiationEvent, ResponseAction, ProposalResponse, Responded,
        ChatRoom, ChatRoomView, NegotiationSummary, OfferSummary,
        Message, MessageType, MessageContent, Attachment, AttachmentKind, PriceOffer, ScheduleModification,
        ReadReceipt, TextContent, NewMessage, NewPriceOffer, NewScheduleModification, OfferAction, OfferResponse,
        admin::UserStatusUpdate, admin::VerifyProvider,
        Dashboard, ConsumerDashboard, ProviderDashboard, AdminDashboard, BookingStats, UserCounts, IssueCounts,
    )),
    tags(
        (name = "urbifix", description = "Civic issue reporting and service marketplace API"),
    )
)]
pub struct ApiDoc;
