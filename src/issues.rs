//! Issue lifecycle: reporting, the strict status rules, upvotes, views,
//! provider accept/resolve and crowdfunding.

use chrono::Utc;
use tracing::{info, warn};

use crate::auth::{Actor, Role};
use crate::bookings::mock_transaction_id;
use crate::error::{retry_on_conflict, ApiError, ApiResult, RepoResultExt};
use crate::models::*;
use crate::policy::{authorize, authorize_kind, Action, ResourceKind};
use crate::repo::{IssueFilter, IssueSort, Page, Paged, Repo};

impl IssueStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            IssueStatus::Open => "open",
            IssueStatus::InProgress => "in_progress",
            IssueStatus::Resolved => "resolved",
            IssueStatus::Closed => "closed",
        }
    }
}

async fn load(repo: &dyn Repo, id: Id) -> ApiResult<Issue> {
    repo.get_issue(id).await.or_not_found("Issue")
}

pub(crate) async fn require_active_category(repo: &dyn Repo, id: Id) -> ApiResult<()> {
    match repo.get_category(id).await {
        Ok(c) if c.is_active => Ok(()),
        Ok(_) | Err(crate::repo::RepoError::NotFound) => Err(ApiError::bad_request("Invalid or inactive category")),
        Err(e) => Err(e.into()),
    }
}

fn crowdfunding_from(settings: CrowdfundingSettings, current: Crowdfunding) -> ApiResult<Crowdfunding> {
    let target = settings.target_amount.unwrap_or(current.target_amount);
    if settings.is_enabled && target <= 0.0 {
        return Err(ApiError::bad_request("Crowdfunding target must be greater than zero"));
    }
    Ok(Crowdfunding {
        is_enabled: settings.is_enabled,
        target_amount: target,
        deadline: settings.deadline.or(current.deadline),
        ..current
    })
}

fn validate_cost(cost: Option<f64>) -> ApiResult<()> {
    match cost {
        Some(c) if c < 0.0 || !c.is_finite() => Err(ApiError::bad_request("Estimated cost cannot be negative")),
        _ => Ok(()),
    }
}

pub async fn create_issue(repo: &dyn Repo, actor: &Actor, new: NewIssue) -> ApiResult<Issue> {
    authorize_kind(actor, ResourceKind::Issue, Action::Create)?;
    if new.title.trim().is_empty() || new.description.trim().is_empty() {
        return Err(ApiError::bad_request("Title and description are required"));
    }
    validate_cost(new.estimated_cost)?;
    require_active_category(repo, new.category).await?;
    let crowdfunding = match new.crowdfunding {
        Some(settings) => crowdfunding_from(settings, Crowdfunding::default())?,
        None => Crowdfunding::default(),
    };

    let now = Utc::now();
    let issue = Issue {
        id: Id::new_v4(),
        title: new.title.trim().to_string(),
        description: new.description,
        category: new.category,
        location: new.location,
        priority: new.priority,
        status: IssueStatus::Open,
        consumer: actor.id,
        assigned_provider: None,
        images: new.images,
        upvotes: 0,
        upvoted_by: Vec::new(),
        views_count: 0,
        viewed_by: Vec::new(),
        crowdfunding,
        estimated_cost: new.estimated_cost,
        resolved_at: None,
        created_at: now,
        updated_at: now,
        version: 0,
    };
    let issue = repo.create_issue(issue).await?;
    info!(issue = %issue.id, consumer = %actor.id, "issue reported");
    Ok(issue)
}

#[derive(Debug, Clone, Default)]
pub struct IssueQuery {
    pub status: Option<IssueStatus>,
    pub category: Option<Id>,
    pub priority: Option<Priority>,
    pub sort: IssueSort,
}

pub async fn list_issues(repo: &dyn Repo, actor: &Actor, q: IssueQuery, page: Page) -> ApiResult<Paged<Issue>> {
    authorize_kind(actor, ResourceKind::Issue, Action::List)?;
    let filter = IssueFilter {
        consumer: (actor.role == Role::Consumer).then_some(actor.id),
        status: q.status,
        category: q.category,
        priority: q.priority,
        ..Default::default()
    };
    Ok(repo.list_issues(&filter, q.sort, Some(page)).await?)
}

/// Returns the issue, recording the caller's first view unless they reported it.
pub async fn view_issue(repo: &dyn Repo, actor: &Actor, id: Id) -> ApiResult<Issue> {
    retry_on_conflict(|| async move {
        let mut issue = load(repo, id).await?;
        authorize(actor, Action::Read, &issue)?;
        if issue.consumer == actor.id || issue.viewed_by.iter().any(|v| v.user == actor.id) {
            return Ok(issue);
        }
        issue.viewed_by.push(IssueView { user: actor.id, viewed_at: Utc::now() });
        issue.views_count = issue.viewed_by.len() as u32;
        Ok(repo.update_issue(issue).await?)
    })
    .await
}

/// Status change requested through a plain update. `in_progress` and
/// `resolved` are only entered through accept/resolve.
fn apply_status_change(issue: &mut Issue, actor: &Actor, next: IssueStatus) -> ApiResult<()> {
    use IssueStatus::*;
    let current = issue.status;
    if current == next {
        return Ok(());
    }
    if actor.role == Role::Provider {
        return Err(ApiError::forbidden());
    }
    match (current, next) {
        (Open | Resolved, Closed) => {}
        (InProgress, Open) if actor.is_admin() => issue.assigned_provider = None,
        (InProgress, Open) => return Err(ApiError::forbidden()),
        (_, InProgress | Resolved) => {
            return Err(ApiError::bad_request(format!(
                "Issues move to {} only through the accept and resolve actions",
                next.as_str()
            )))
        }
        _ => {
            return Err(ApiError::bad_request(format!(
                "Cannot change issue status from {} to {}",
                current.as_str(),
                next.as_str()
            )))
        }
    }
    issue.status = next;
    Ok(())
}

pub async fn update_issue(repo: &dyn Repo, actor: &Actor, id: Id, upd: UpdateIssue) -> ApiResult<Issue> {
    let mut issue = load(repo, id).await?;
    authorize(actor, Action::Update, &issue)?;

    if let Some(title) = upd.title {
        if title.trim().is_empty() {
            return Err(ApiError::bad_request("Title cannot be empty"));
        }
        issue.title = title.trim().to_string();
    }
    if let Some(description) = upd.description {
        if description.trim().is_empty() {
            return Err(ApiError::bad_request("Description cannot be empty"));
        }
        issue.description = description;
    }
    if let Some(category) = upd.category {
        require_active_category(repo, category).await?;
        issue.category = category;
    }
    if let Some(location) = upd.location { issue.location = location; }
    if let Some(priority) = upd.priority { issue.priority = priority; }
    if let Some(images) = upd.images { issue.images = images; }
    if upd.estimated_cost.is_some() {
        validate_cost(upd.estimated_cost)?;
        issue.estimated_cost = upd.estimated_cost;
    }
    if let Some(settings) = upd.crowdfunding {
        issue.crowdfunding = crowdfunding_from(settings, std::mem::take(&mut issue.crowdfunding))?;
    }
    let from = issue.status;
    if let Some(next) = upd.status {
        apply_status_change(&mut issue, actor, next)?;
    }
    issue.updated_at = Utc::now();
    let issue = repo.update_issue(issue).await?;
    if from != issue.status {
        info!(issue = %issue.id, from = from.as_str(), to = issue.status.as_str(), by = %actor.id, "issue status changed");
    }
    Ok(issue)
}

pub async fn delete_issue(repo: &dyn Repo, actor: &Actor, id: Id) -> ApiResult<()> {
    let issue = load(repo, id).await?;
    authorize(actor, Action::Delete, &issue)?;
    repo.delete_issue(id).await.or_not_found("Issue")?;
    info!(issue = %id, by = %actor.id, "issue deleted");
    Ok(())
}

/// Toggles the caller's vote. Returns the issue and whether the caller now upvotes it.
pub async fn toggle_upvote(repo: &dyn Repo, actor: &Actor, id: Id) -> ApiResult<(Issue, bool)> {
    retry_on_conflict(|| async move {
        let mut issue = load(repo, id).await?;
        authorize(actor, Action::Upvote, &issue)?;
        let had = issue.upvoted_by.contains(&actor.id);
        if had {
            issue.upvoted_by.retain(|u| *u != actor.id);
        } else {
            issue.upvoted_by.push(actor.id);
        }
        issue.upvotes = issue.upvoted_by.len() as u32;
        issue.updated_at = Utc::now();
        let issue = repo.update_issue(issue).await?;
        Ok((issue, !had))
    })
    .await
}

/// Claims an open, unassigned issue for the calling provider. A lost race is
/// reported as a conflict, never retried.
pub async fn accept_issue(repo: &dyn Repo, actor: &Actor, id: Id) -> ApiResult<Issue> {
    let mut issue = load(repo, id).await?;
    if issue.assigned_provider.is_some() || issue.status != IssueStatus::Open {
        warn!(issue = %id, by = %actor.id, "accept rejected, issue not open");
        return Err(ApiError::bad_request("Issue is no longer open for acceptance"));
    }
    authorize(actor, Action::Accept, &issue)?;
    let now = Utc::now();
    issue.assigned_provider = Some(actor.id);
    issue.status = IssueStatus::InProgress;
    issue.updated_at = now;
    let issue = repo.update_issue(issue).await?;
    info!(issue = %issue.id, provider = %actor.id, "issue accepted");
    Ok(issue)
}

pub async fn resolve_issue(repo: &dyn Repo, actor: &Actor, id: Id) -> ApiResult<Issue> {
    let mut issue = load(repo, id).await?;
    authorize(actor, Action::Resolve, &issue)?;
    if issue.status != IssueStatus::InProgress {
        return Err(ApiError::bad_request("Only issues in progress can be resolved"));
    }
    let now = Utc::now();
    issue.status = IssueStatus::Resolved;
    issue.resolved_at = Some(now);
    issue.updated_at = now;
    let issue = repo.update_issue(issue).await?;
    info!(issue = %issue.id, by = %actor.id, "issue resolved");
    Ok(issue)
}

pub async fn contribute(repo: &dyn Repo, actor: &Actor, id: Id, c: NewContribution) -> ApiResult<Issue> {
    if !(c.amount > 0.0) || !c.amount.is_finite() {
        return Err(ApiError::bad_request("Contribution amount must be greater than zero"));
    }
    let amount = c.amount;
    retry_on_conflict(|| {
        let message = c.message.clone();
        async move {
            let mut issue = load(repo, id).await?;
            authorize(actor, Action::Contribute, &issue)?;
            let now = Utc::now();
            if !issue.crowdfunding.is_enabled {
                return Err(ApiError::bad_request("Crowdfunding is not enabled for this issue"));
            }
            if issue.crowdfunding.deadline.is_some_and(|d| d < now) {
                return Err(ApiError::bad_request("Crowdfunding deadline has passed"));
            }
            if issue.status == IssueStatus::Closed {
                return Err(ApiError::bad_request("Cannot contribute to a closed issue"));
            }
            issue.crowdfunding.contributors.push(Contribution {
                user: actor.id,
                amount,
                message,
                transaction_id: mock_transaction_id(),
                contributed_at: now,
            });
            issue.crowdfunding.raised_amount += amount;
            issue.updated_at = now;
            Ok(repo.update_issue(issue).await?)
        }
    })
    .await
}
