//! Ticket operations: create, list, detail, state machine commands, history, export.

use super::thread::Upload;
use super::AppealsService;
use crate::cache::TicketCache;
use crate::emitter::{snippet, RealtimeEvent};
use crate::metrics::{record_status_transition, record_ticket_created};
use crate::views::{CreatedTicket, MessageView, MutationResult, TicketDetail, TicketDetailView, UserView};
use appeals_core::events::audience;
use appeals_core::machine::{
    status_transition, Actor, TicketAction, TicketCommand, TicketEffect, TicketEnvironment,
    TicketReducer,
};
use appeals_core::ports::CommitPlan;
use appeals_core::reducer::Reducer;
use appeals_core::thread::{assemble_page, Bound, Direction, WindowQuery};
use appeals_core::{
    resolve_title, AppealsError, Channel, Department, DepartmentId, ExportFilter, NewMessage,
    NewTicket, Priority, RequestContext, Result, StatusHistoryEntry, Ticket, TicketFilter,
    TicketId, TicketScope, TicketSnapshot, TicketStatus, TicketSummary, TicketViewer, UserId,
};
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, info};

/// Messages embedded in a ticket detail.
pub const DETAIL_MESSAGES: usize = 30;

/// Default and maximum list page sizes.
const LIST_DEFAULT_LIMIT: i64 = 30;
const LIST_MAX_LIMIT: i64 = 100;

/// CSV export header, in column order.
pub const EXPORT_HEADER: [&str; 10] = [
    "id",
    "number",
    "status",
    "priority",
    "createdAt",
    "deadline",
    "title",
    "fromDepartment",
    "toDepartment",
    "createdBy",
];

/// Validated input for ticket creation.
#[derive(Clone, Debug)]
pub struct CreateTicket {
    /// Target department
    pub to_department: DepartmentId,
    /// Originating department; defaults to the creator's department
    pub from_department: Option<DepartmentId>,
    /// Priority; defaults to `MEDIUM`
    pub priority: Option<Priority>,
    /// Title; blank falls back to the first message
    pub title: Option<String>,
    /// First message text
    pub text: Option<String>,
    /// Optional deadline
    pub deadline: Option<DateTime<Utc>>,
    /// Files attached to the first message
    pub attachments: Vec<Upload>,
}

/// List request.
#[derive(Clone, Debug, Default)]
pub struct ListQuery {
    /// Scope
    pub scope: TicketScope,
    /// Status filter
    pub status: Option<TicketStatus>,
    /// Priority filter
    pub priority: Option<Priority>,
    /// Page size
    pub limit: Option<i64>,
    /// Page offset
    pub offset: Option<i64>,
}

impl ListQuery {
    fn filter(&self) -> TicketFilter {
        TicketFilter {
            scope: self.scope,
            status: self.status,
            priority: self.priority,
            limit: self.limit.unwrap_or(LIST_DEFAULT_LIMIT).clamp(1, LIST_MAX_LIMIT),
            offset: self.offset.unwrap_or(0).max(0),
        }
    }
}

impl AppealsService {
    // ========================================================================
    // Create / read
    // ========================================================================

    /// Create a ticket with its first message.
    ///
    /// # Errors
    ///
    /// `VALIDATION` for an unknown department or an empty first message.
    #[tracing::instrument(skip(self, ctx, input), fields(user_id = %ctx.user_id(), to = %input.to_department))]
    pub async fn create_ticket(&self, ctx: &RequestContext, input: CreateTicket) -> Result<CreatedTicket> {
        let deps = self.deps();
        let department = deps
            .directory
            .department(input.to_department)
            .await?
            .ok_or_else(|| AppealsError::Validation(format!("unknown department {}", input.to_department)))?;

        let text = input
            .text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(ToString::to_string);
        if text.is_none() && input.attachments.is_empty() {
            return Err(AppealsError::Validation(
                "the first message needs text or attachments".into(),
            ));
        }

        let title = resolve_title(
            input.title.as_deref(),
            text.as_deref(),
            input.attachments.first().map(|a| a.file_name.as_str()),
        )?;

        let now = deps.clock.now();
        let (ticket, first) = deps
            .tickets
            .create_ticket(
                NewTicket {
                    from_department: input.from_department.or(ctx.user.department_id),
                    to_department: department.id,
                    created_by: ctx.user_id(),
                    priority: input.priority.unwrap_or_default(),
                    title,
                    deadline: input.deadline,
                    created_at: now,
                },
                NewMessage::user(TicketId(0), ctx.user_id(), text, now),
            )
            .await?;

        let stored = self.attach(ticket.id, first.id, &input.attachments).await;
        record_ticket_created();
        info!(ticket_id = %ticket.id, number = ticket.number, attachments = stored, "Ticket created");

        deps.cache.invalidate_lists().await;
        deps.emitter.emit(
            vec![
                Channel::Ticket(ticket.id),
                Channel::Department(ticket.to_department),
                Channel::User(ticket.created_by),
            ],
            RealtimeEvent::TicketCreated {
                ticket: ticket.clone(),
            },
        );

        Ok(CreatedTicket::from(&ticket))
    }

    /// List tickets in a scope, newest activity first.
    ///
    /// # Errors
    ///
    /// Store failures.
    #[tracing::instrument(skip(self, ctx), fields(user_id = %ctx.user_id()))]
    pub async fn list_tickets(&self, ctx: &RequestContext, query: &ListQuery) -> Result<Vec<TicketSummary>> {
        let deps = self.deps();
        let filter = query.filter();
        let key = TicketCache::list_key(ctx.user_id(), &filter);

        if let Some(rows) = deps.cache.get_json::<Vec<TicketSummary>>(&key).await {
            return Ok(rows);
        }

        let viewer = TicketViewer {
            user_id: ctx.user_id(),
            departments: ctx.capabilities.visible_departments(),
            admin: ctx.capabilities.is_admin(),
        };
        let rows = deps.tickets.list(&viewer, &filter).await?;
        deps.cache.put_json(&key, &rows).await;
        Ok(rows)
    }

    /// Ticket detail with up to [`DETAIL_MESSAGES`] recent messages.
    ///
    /// The shared part comes from the cache when present; the unread count is
    /// always computed for the caller.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND` for unknown tickets, `FORBIDDEN` when the caller cannot view it.
    #[tracing::instrument(skip(self, ctx), fields(user_id = %ctx.user_id()))]
    pub async fn ticket_detail(&self, ctx: &RequestContext, ticket_id: TicketId) -> Result<TicketDetailView> {
        let deps = self.deps();
        let key = TicketCache::detail_key(ticket_id);

        let detail = if let Some(detail) = deps.cache.get_json::<TicketDetail>(&key).await {
            if !ctx.authority(&detail.snapshot).can_view() {
                return Err(AppealsError::Forbidden("not allowed to view this ticket".into()));
            }
            detail
        } else {
            let snapshot = self.viewable(ctx, ticket_id).await?;
            let detail = self.build_detail(snapshot).await?;
            deps.cache.put_json(&key, &detail).await;
            detail
        };

        let unread_count = deps.messages.unread_count(ticket_id, ctx.user_id()).await?;
        Ok(TicketDetailView { detail, unread_count })
    }

    async fn build_detail(&self, snapshot: TicketSnapshot) -> Result<TicketDetail> {
        let deps = self.deps();
        let ticket_id = snapshot.ticket.id;

        let rows = deps
            .messages
            .window(&WindowQuery {
                ticket_id,
                direction: Direction::Before,
                bound: Bound::Unbounded,
                limit: DETAIL_MESSAGES + 1,
            })
            .await?;
        let page = assemble_page(Direction::Before, rows, DETAIL_MESSAGES);
        let messages = self.hydrate(page.messages).await?;

        let mut people: Vec<UserId> = snapshot
            .assignees
            .iter()
            .chain(snapshot.watchers.iter())
            .copied()
            .collect();
        people.push(snapshot.ticket.created_by);
        let users = self.user_views(&people).await?;
        let view = |id: &UserId| users.get(id).cloned().unwrap_or_else(|| UserView::unknown(*id));

        let mut departments = vec![snapshot.ticket.to_department];
        departments.extend(snapshot.ticket.from_department);
        let departments: HashMap<DepartmentId, Department> = deps
            .directory
            .departments(&departments)
            .await?
            .into_iter()
            .map(|d| (d.id, d))
            .collect();

        Ok(TicketDetail {
            creator: view(&snapshot.ticket.created_by),
            assignee_profiles: snapshot.assignees.iter().map(view).collect(),
            watcher_profiles: snapshot.watchers.iter().map(view).collect(),
            department: departments.get(&snapshot.ticket.to_department).cloned(),
            source_department: snapshot
                .ticket
                .from_department
                .and_then(|id| departments.get(&id).cloned()),
            messages,
            has_more_before: page.has_more_before,
            snapshot,
        })
    }

    // ========================================================================
    // State machine commands
    // ========================================================================

    /// Replace the assignee set.
    ///
    /// # Errors
    ///
    /// `FORBIDDEN` unless admin or manager of the target department; `VALIDATION`
    /// for unknown users.
    pub async fn assign(&self, ctx: &RequestContext, ticket_id: TicketId, assignees: Vec<UserId>) -> Result<MutationResult> {
        let assignees: BTreeSet<UserId> = assignees.into_iter().collect();
        self.apply(ctx, ticket_id, TicketCommand::Assign { assignees }).await
    }

    /// Self-assign.
    ///
    /// # Errors
    ///
    /// `FORBIDDEN` unless admin, manager or member of the target department.
    pub async fn claim(&self, ctx: &RequestContext, ticket_id: TicketId) -> Result<MutationResult> {
        self.apply(ctx, ticket_id, TicketCommand::Claim).await
    }

    /// Move to another status.
    ///
    /// # Errors
    ///
    /// `FORBIDDEN` for transitions the caller may not perform; `VALIDATION` for
    /// `IN_PROGRESS` without assignees.
    pub async fn change_status(&self, ctx: &RequestContext, ticket_id: TicketId, status: TicketStatus) -> Result<MutationResult> {
        self.apply(ctx, ticket_id, TicketCommand::ChangeStatus { status }).await
    }

    /// Move to another department.
    ///
    /// # Errors
    ///
    /// `FORBIDDEN` unless admin or manager of the current department;
    /// `VALIDATION` for unknown departments.
    pub async fn change_department(&self, ctx: &RequestContext, ticket_id: TicketId, department_id: DepartmentId) -> Result<MutationResult> {
        let department = self
            .deps()
            .directory
            .department(department_id)
            .await?
            .unwrap_or(Department {
                id: department_id,
                name: String::new(),
            });
        self.apply(ctx, ticket_id, TicketCommand::ChangeDepartment { department }).await
    }

    /// Replace the watcher set.
    ///
    /// # Errors
    ///
    /// `FORBIDDEN` unless supervisor, creator or assignee; `VALIDATION` for unknown users.
    pub async fn set_watchers(&self, ctx: &RequestContext, ticket_id: TicketId, watchers: Vec<UserId>) -> Result<MutationResult> {
        let watchers: BTreeSet<UserId> = watchers.into_iter().collect();
        self.apply(ctx, ticket_id, TicketCommand::SetWatchers { watchers }).await
    }

    /// Lock, reduce, validate references, commit, then invalidate and emit.
    #[tracing::instrument(
        skip(self, ctx, command),
        fields(user_id = %ctx.user_id(), command = command.name(), correlation_id = %ctx.correlation_id)
    )]
    async fn apply(&self, ctx: &RequestContext, ticket_id: TicketId, command: TicketCommand) -> Result<MutationResult> {
        let deps = self.deps();
        let referenced = referenced_users(&command);
        let moved_to = match &command {
            TicketCommand::ChangeDepartment { department } => Some(department.clone()),
            _ => None,
        };

        let current = deps
            .tickets
            .load(ticket_id)
            .await?
            .ok_or_else(|| AppealsError::not_found("Ticket", ticket_id))?;

        // Display names are resolved without the row lock: a locked transaction
        // pins a pooled connection and the directory needs one of its own.
        let mut names = NameBook::default();
        let mut wanted: Vec<UserId> = current.assignees.iter().copied().collect();
        wanted.extend(referenced.iter().copied());
        self.learn_names(&mut names, &wanted, &[current.ticket.to_department]).await?;

        let mut retries = 0;
        let tx = loop {
            let tx = deps.tickets.lock(ticket_id).await?;
            let snapshot = tx.snapshot();
            let users = names.unasked_users(snapshot.assignees.iter());
            let departments = names.unasked_departments([snapshot.ticket.to_department]);
            if (users.is_empty() && departments.is_empty()) || retries == NAME_RETRIES {
                break tx;
            }
            // Changed since it was read: release the lock before asking again.
            drop(tx);
            retries += 1;
            debug!(ticket_id = %ticket_id, retries, "Ticket changed before lock, refreshing names");
            self.learn_names(&mut names, &users, &departments).await?;
        };
        let before = tx.snapshot().clone();
        let env = names.env;

        let mut next = before.clone();
        let effects = TicketReducer.reduce(
            &mut next,
            TicketAction {
                actor: Actor::new(ctx.capabilities.clone()),
                command,
            },
            &env,
        )?;

        let unknown: Vec<String> = referenced
            .iter()
            .filter(|id| !env.user_names.contains_key(id))
            .map(ToString::to_string)
            .collect();
        if !unknown.is_empty() {
            return Err(AppealsError::Validation(format!("unknown users: {}", unknown.join(", "))));
        }
        if let Some(department) = moved_to.filter(|d| d.name.is_empty() && d.id != before.ticket.to_department) {
            return Err(AppealsError::Validation(format!("unknown department {}", department.id)));
        }

        if effects.is_empty() {
            debug!(ticket_id = %ticket_id, "Command is a no-op");
            return Ok(MutationResult {
                ticket: before,
                changed: false,
                system_messages: Vec::new(),
            });
        }

        let at = deps.clock.now();
        let effects = effects.into_vec();
        let written = tx
            .commit(CommitPlan {
                next: next.clone(),
                effects: effects.clone(),
                actor: ctx.user_id(),
                at,
            })
            .await?;
        next.ticket.updated_at = at;

        if let Some((_, to)) = status_transition(&effects) {
            record_status_transition(to);
        }
        info!(ticket_id = %ticket_id, effects = effects.len(), status = %next.ticket.status, "Ticket updated");

        deps.cache.invalidate_ticket(ticket_id).await;
        let system_messages = self.hydrate(written).await?;
        self.emit_mutation(ctx.user_id(), &before, &next, &effects, &system_messages);

        Ok(MutationResult {
            ticket: next,
            changed: true,
            system_messages,
        })
    }

    /// Fetch the names in `users` and `departments` that `book` has not asked for yet.
    async fn learn_names(&self, book: &mut NameBook, users: &[UserId], departments: &[DepartmentId]) -> Result<()> {
        let directory = &self.deps().directory;
        let users = book.unasked_users(users);
        if !users.is_empty() {
            for profile in directory.profiles(&users).await? {
                book.env.user_names.insert(profile.id, profile.display_name);
            }
            book.asked_users.extend(users);
        }

        let departments = book.unasked_departments(departments.iter().copied());
        if !departments.is_empty() {
            for department in directory.departments(&departments).await? {
                book.env.department_names.insert(department.id, department.name);
            }
            book.asked_departments.extend(departments);
        }
        Ok(())
    }

    fn emit_mutation(
        &self,
        actor: UserId,
        before: &TicketSnapshot,
        after: &TicketSnapshot,
        effects: &[TicketEffect],
        system_messages: &[MessageView],
    ) {
        let emitter = &self.deps().emitter;
        let channels = audience(before, after, actor);
        let ticket_id = after.ticket.id;

        for effect in effects {
            let event = match effect {
                TicketEffect::ReplaceAssignees { assignees } => RealtimeEvent::AssigneesUpdated {
                    ticket_id,
                    assignees: assignees.iter().copied().collect(),
                },
                TicketEffect::RecordStatus { from, to } => RealtimeEvent::StatusUpdated {
                    ticket_id,
                    from: *from,
                    to: *to,
                },
                TicketEffect::MoveDepartment { from, to } => RealtimeEvent::DepartmentChanged {
                    ticket_id,
                    from: *from,
                    to: *to,
                },
                TicketEffect::ReplaceWatchers { watchers } => RealtimeEvent::WatchersUpdated {
                    ticket_id,
                    watchers: watchers.iter().copied().collect(),
                },
                TicketEffect::AppendSystemMessage(_) => continue,
            };
            emitter.emit(channels.clone(), event);
        }

        for message in system_messages {
            emitter.emit(
                channels.clone(),
                RealtimeEvent::MessageAdded {
                    message: message.clone(),
                },
            );
        }

        emitter.emit(
            channels,
            ticket_updated(after, system_messages.last().and_then(|m| m.text.as_deref())),
        );
    }

    // ========================================================================
    // History / export
    // ========================================================================

    /// Status history of a ticket, oldest first.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND` / `FORBIDDEN` like [`AppealsService::ticket_detail`].
    pub async fn history(&self, ctx: &RequestContext, ticket_id: TicketId) -> Result<Vec<StatusHistoryEntry>> {
        self.viewable(ctx, ticket_id).await?;
        self.deps().tickets.status_history(ticket_id).await
    }

    /// CSV export of tickets matching `filter`.
    ///
    /// # Errors
    ///
    /// `FORBIDDEN` without admin or export permission.
    #[tracing::instrument(skip(self, ctx), fields(user_id = %ctx.user_id()))]
    pub async fn export_csv(&self, ctx: &RequestContext, filter: &ExportFilter) -> Result<String> {
        if !ctx.capabilities.can_export() {
            return Err(AppealsError::Forbidden("export permission required".into()));
        }

        let rows = self.deps().tickets.export(filter).await?;
        let csv = write_csv(&rows)?;
        info!(rows = rows.len(), "Exported tickets");
        Ok(csv)
    }
}

/// Summary event sent after every ticket change.
pub(crate) fn ticket_updated(snapshot: &TicketSnapshot, last_message: Option<&str>) -> RealtimeEvent {
    RealtimeEvent::TicketUpdated {
        ticket_id: snapshot.ticket.id,
        status: snapshot.ticket.status,
        priority: snapshot.ticket.priority,
        department_id: snapshot.ticket.to_department,
        assignees: snapshot.assignees.iter().copied().collect(),
        last_message: last_message.map(snippet),
    }
}

fn referenced_users(command: &TicketCommand) -> Vec<UserId> {
    match command {
        TicketCommand::Assign { assignees } => assignees.iter().copied().collect(),
        TicketCommand::SetWatchers { watchers } => watchers.iter().copied().collect(),
        _ => Vec::new(),
    }
}

/// Lock attempts repeated when the locked ticket names people not looked up yet.
const NAME_RETRIES: usize = 2;

/// Reducer names plus the ids already sent to the directory, found or not.
#[derive(Default)]
struct NameBook {
    env: TicketEnvironment,
    asked_users: HashSet<UserId>,
    asked_departments: HashSet<DepartmentId>,
}

impl NameBook {
    fn unasked_users<'a>(&self, ids: impl IntoIterator<Item = &'a UserId>) -> Vec<UserId> {
        let mut ids: Vec<UserId> = ids
            .into_iter()
            .filter(|id| !self.asked_users.contains(id))
            .copied()
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    fn unasked_departments(&self, ids: impl IntoIterator<Item = DepartmentId>) -> Vec<DepartmentId> {
        ids.into_iter()
            .filter(|id| !self.asked_departments.contains(id))
            .collect()
    }
}

fn write_csv(rows: &[Ticket]) -> Result<String> {
    let csv_error = |e: csv::Error| AppealsError::Internal(format!("Failed to write CSV: {e}"));
    let optional = |value: Option<String>| value.unwrap_or_default();

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(EXPORT_HEADER).map_err(csv_error)?;
    for ticket in rows {
        writer
            .write_record([
                ticket.id.to_string(),
                ticket.number.to_string(),
                ticket.status.to_string(),
                ticket.priority.to_string(),
                ticket.created_at.to_rfc3339(),
                optional(ticket.deadline.map(|d| d.to_rfc3339())),
                ticket.title.clone(),
                optional(ticket.from_department.map(|d| d.to_string())),
                ticket.to_department.to_string(),
                ticket.created_by.to_string(),
            ])
            .map_err(csv_error)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| AppealsError::Internal(format!("Failed to flush CSV: {e}")))?;
    String::from_utf8(bytes).map_err(|e| AppealsError::Internal(format!("CSV is not UTF-8: {e}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_list_filter_clamps_paging() {
        let filter = ListQuery {
            limit: Some(1_000),
            offset: Some(-5),
            ..ListQuery::default()
        }
        .filter();
        assert_eq!(filter.limit, LIST_MAX_LIMIT);
        assert_eq!(filter.offset, 0);
        assert_eq!(ListQuery::default().filter().limit, LIST_DEFAULT_LIMIT);
    }

    #[test]
    fn test_csv_has_exact_header_and_quotes_titles() {
        let now = Utc::now();
        let csv = write_csv(&[Ticket {
            id: TicketId(1),
            number: 1000,
            from_department: None,
            to_department: DepartmentId(2),
            created_by: UserId(3),
            status: TicketStatus::Open,
            priority: Priority::High,
            title: "Chair, broken".into(),
            deadline: None,
            created_at: now,
            updated_at: now,
        }])
        .unwrap();

        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("id,number,status,priority,createdAt,deadline,title,fromDepartment,toDepartment,createdBy")
        );
        let row = lines.next().unwrap();
        assert!(row.starts_with("1,1000,OPEN,HIGH,"));
        assert!(row.ends_with(",,\"Chair, broken\",,2,3"));
    }
}
