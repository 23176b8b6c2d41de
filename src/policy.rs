//! Declarative authorization. Every handler asks the table below whether the
//! caller's role may perform an action on a kind of resource, and the grant
//! says which relationship to the concrete resource (if any) is required.

use crate::auth::{Actor, Role};
use crate::error::{ApiError, ApiResult};
use crate::models::{Booking, ChatRoom, Id, Issue, Proposal, Service};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Issue,
    Booking,
    Proposal,
    ChatRoom,
    Service,
    Category,
    User,
    Stats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Read,
    List,
    Create,
    Update,
    Delete,
    Upvote,
    Accept,
    Resolve,
    Contribute,
    ChangeStatus,
    Cancel,
    Pay,
    Review,
    Refund,
    Propose,
    Respond,
    Send,
}

/// What a role needs, relative to the resource, for an action to be allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grant {
    Always,
    Never,
    /// Caller is the resource's consumer (issue reporter, booking consumer).
    IfConsumer,
    /// Caller is the resource's provider (assigned provider, booking provider, service owner).
    IfProvider,
    /// Caller is on either side of the resource.
    IfParty,
    IfProposedTo,
    IfProposedBy,
    IfParticipant,
}

pub fn grant(kind: ResourceKind, action: Action, role: Role) -> Grant {
    use Action::*;
    use Grant::*;
    use ResourceKind as K;
    use Role::{Admin as A, Consumer as C, Provider as P};

    match (kind, action, role) {
        (K::Issue, Read, C) => IfConsumer,
        (K::Issue, Read | List | Upvote | Contribute, _) => Always,
        (K::Issue, Create, C | A) => Always,
        (K::Issue, Update, C) => IfConsumer,
        (K::Issue, Update, P) => IfProvider,
        (K::Issue, Update | Delete | Resolve, A) => Always,
        (K::Issue, Delete, C) => IfConsumer,
        (K::Issue, Accept, P) => Always,
        (K::Issue, Resolve, P) => IfProvider,

        (K::Booking, List, _) => Always,
        (K::Booking, Create, C) => Always,
        (K::Booking, Read | Cancel | Delete | Pay | Review | Propose, C) => IfConsumer,
        (K::Booking, Read | Cancel | ChangeStatus | Propose, P) => IfProvider,
        (K::Booking, Read | Cancel | ChangeStatus | Delete | Refund, A) => Always,

        (K::Proposal, List, _) => Always,
        (K::Proposal, Read, C | P) => IfParty,
        (K::Proposal, Read, A) => Always,
        (K::Proposal, Respond, C | P) => IfProposedTo,
        (K::Proposal, Cancel, C | P) => IfProposedBy,

        (K::ChatRoom, List, _) => Always,
        (K::ChatRoom, Read | Send, C | P) => IfParticipant,
        (K::ChatRoom, Read, A) => Always,

        (K::Service, Read | List, _) => Always,
        (K::Service, Create, P) => Always,
        (K::Service, Update | Delete, P) => IfProvider,
        (K::Service, Update | Delete, A) => Always,

        (K::Category, Read | List, _) => Always,
        (K::Category, Create | Update, A) => Always,

        (K::User, List | Update, A) => Always,

        (K::Stats, Read, _) => Always,
        (K::Stats, List, A) => Always,

        _ => Never,
    }
}

/// The people a concrete resource relates to.
#[derive(Debug, Clone, Default)]
pub struct Parties {
    pub consumer: Option<Id>,
    pub provider: Option<Id>,
    pub proposed_by: Option<Id>,
    pub proposed_to: Option<Id>,
    pub participants: Vec<Id>,
}

impl Parties {
    fn is_party(&self, id: Id) -> bool {
        [self.consumer, self.provider, self.proposed_by, self.proposed_to].contains(&Some(id))
            || self.participants.contains(&id)
    }
}

pub trait Guarded {
    const KIND: ResourceKind;
    fn parties(&self) -> Parties;
}

impl Guarded for Issue {
    const KIND: ResourceKind = ResourceKind::Issue;
    fn parties(&self) -> Parties {
        Parties { consumer: Some(self.consumer), provider: self.assigned_provider, ..Default::default() }
    }
}

impl Guarded for Booking {
    const KIND: ResourceKind = ResourceKind::Booking;
    fn parties(&self) -> Parties {
        Parties { consumer: Some(self.consumer), provider: Some(self.provider), ..Default::default() }
    }
}

impl Guarded for Proposal {
    const KIND: ResourceKind = ResourceKind::Proposal;
    fn parties(&self) -> Parties {
        Parties { proposed_by: Some(self.proposed_by), proposed_to: Some(self.proposed_to), ..Default::default() }
    }
}

impl Guarded for ChatRoom {
    const KIND: ResourceKind = ResourceKind::ChatRoom;
    fn parties(&self) -> Parties {
        Parties { participants: self.participants.clone(), ..Default::default() }
    }
}

impl Guarded for Service {
    const KIND: ResourceKind = ResourceKind::Service;
    fn parties(&self) -> Parties {
        Parties { provider: Some(self.provider), ..Default::default() }
    }
}

pub fn allows(grant: Grant, actor: &Actor, parties: &Parties) -> bool {
    let me = Some(actor.id);
    match grant {
        Grant::Always => true,
        Grant::Never => false,
        Grant::IfConsumer => parties.consumer == me,
        Grant::IfProvider => parties.provider == me,
        Grant::IfParty => parties.is_party(actor.id),
        Grant::IfProposedTo => parties.proposed_to == me,
        Grant::IfProposedBy => parties.proposed_by == me,
        Grant::IfParticipant => parties.participants.contains(&actor.id),
    }
}

/// Checks `action` against an existing resource. Load the resource first so
/// a missing one yields 404 before this runs.
pub fn authorize<R: Guarded>(actor: &Actor, action: Action, resource: &R) -> ApiResult<()> {
    let g = grant(R::KIND, action, actor.role);
    if allows(g, actor, &resource.parties()) {
        return Ok(());
    }
    tracing::warn!(user = %actor.id, role = actor.role.as_str(), kind = ?R::KIND, ?action, "access denied");
    Err(ApiError::forbidden())
}

/// Checks an action that has no resource instance yet (create, list, admin pages).
/// Only unconditional grants pass.
pub fn authorize_kind(actor: &Actor, kind: ResourceKind, action: Action) -> ApiResult<()> {
    if grant(kind, action, actor.role) == Grant::Always {
        return Ok(());
    }
    tracing::warn!(user = %actor.id, role = actor.role.as_str(), ?kind, ?action, "access denied");
    Err(ApiError::forbidden())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor(role: Role) -> Actor { Actor::new(Id::new_v4(), role) }

    fn booking_parties(consumer: Id, provider: Id) -> Parties {
        Parties { consumer: Some(consumer), provider: Some(provider), ..Default::default() }
    }

    #[test]
    fn consumers_change_booking_status_only_by_cancelling() {
        let me = actor(Role::Consumer);
        let parties = booking_parties(me.id, Id::new_v4());
        assert!(!allows(grant(ResourceKind::Booking, Action::ChangeStatus, Role::Consumer), &me, &parties));
        assert!(allows(grant(ResourceKind::Booking, Action::Cancel, Role::Consumer), &me, &parties));
    }

    #[test]
    fn providers_only_touch_their_own_bookings() {
        let me = actor(Role::Provider);
        let mine = booking_parties(Id::new_v4(), me.id);
        let theirs = booking_parties(Id::new_v4(), Id::new_v4());
        let g = grant(ResourceKind::Booking, Action::ChangeStatus, Role::Provider);
        assert!(allows(g, &me, &mine));
        assert!(!allows(g, &me, &theirs));
    }

    #[test]
    fn admin_moderates_but_does_not_negotiate() {
        assert_eq!(grant(ResourceKind::Booking, Action::ChangeStatus, Role::Admin), Grant::Always);
        assert_eq!(grant(ResourceKind::Issue, Action::Delete, Role::Admin), Grant::Always);
        assert_eq!(grant(ResourceKind::Proposal, Action::Respond, Role::Admin), Grant::Never);
        assert_eq!(grant(ResourceKind::Proposal, Action::Cancel, Role::Admin), Grant::Never);
        assert_eq!(grant(ResourceKind::ChatRoom, Action::Send, Role::Admin), Grant::Never);
    }

    #[test]
    fn only_recipient_may_respond_to_a_proposal() {
        let by = actor(Role::Provider);
        let to = actor(Role::Consumer);
        let parties = Parties { proposed_by: Some(by.id), proposed_to: Some(to.id), ..Default::default() };
        let g = grant(ResourceKind::Proposal, Action::Respond, Role::Consumer);
        assert!(allows(g, &to, &parties));
        let g = grant(ResourceKind::Proposal, Action::Respond, Role::Provider);
        assert!(!allows(g, &by, &parties));
        assert!(allows(grant(ResourceKind::Proposal, Action::Read, Role::Provider), &by, &parties));
    }

    #[test]
    fn conditional_grants_do_not_pass_without_a_resource() {
        let c = actor(Role::Consumer);
        assert!(authorize_kind(&c, ResourceKind::Issue, Action::Create).is_ok());
        assert!(authorize_kind(&c, ResourceKind::Issue, Action::Delete).is_err());
        assert!(authorize_kind(&c, ResourceKind::Category, Action::Create).is_err());
        assert!(authorize_kind(&actor(Role::Provider), ResourceKind::Issue, Action::Create).is_err());
    }
}
