//! Full papers: submission against an abstract, manuscript and revision
//! uploads, admin review and removal.
//!
//! A paper takes its abstract's code, so the code alone identifies both and
//! a second paper for the same abstract is a conflict.

use chrono::Utc;
use confreg_core::abstracts::AbstractStatus;
use confreg_core::{
    NewPaper, Paper, PaperReview, PaperStatus, StoredDocument, SubmissionError,
    DOCUMENT_EXTENSIONS,
};

use crate::auth::{require_role, CallerIdentity, Role};
use crate::effects::SideEffect;
use crate::error::AppError;
use crate::mailer::OutgoingMail;
use crate::services::documents::{self, OpenDocument};
use crate::sheets::SheetRow;
use crate::state::AppState;

fn not_found(code: &str) -> AppError {
    AppError::NotFound(format!("paper {code} not found"))
}

fn visible(state: &AppState, caller: &CallerIdentity, code: &str) -> Result<Paper, AppError> {
    let paper = state.papers.get(&code.to_string()).ok_or_else(|| not_found(code))?;
    if !caller.can_access_user(paper.user_id) {
        return Err(AppError::Forbidden("cannot access another registrant's paper".into()));
    }
    Ok(paper)
}

fn authored(state: &AppState, caller: &CallerIdentity, code: &str) -> Result<Paper, AppError> {
    let uid = caller.registrant_id()?;
    let paper = state.papers.get(&code.to_string()).ok_or_else(|| not_found(code))?;
    if paper.user_id != uid {
        return Err(AppError::Forbidden("only the author can change a paper".into()));
    }
    Ok(paper)
}

async fn commit<R>(
    state: &AppState,
    code: &str,
    change: impl FnOnce(&mut Paper) -> Result<R, SubmissionError>,
) -> Result<(Paper, R), AppError> {
    let key = code.to_string();
    let Some(pool) = &state.db_pool else {
        let applied = state
            .papers
            .try_update(&key, |p| change(p).map(|r| (p.clone(), r)))
            .ok_or_else(|| not_found(code))?;
        return Ok(applied?);
    };

    let mut updated = state.papers.get(&key).ok_or_else(|| not_found(code))?;
    let result = change(&mut updated)?;
    match crate::db::papers::update(pool, &updated).await {
        Ok(true) => {}
        Ok(false) => return Err(not_found(code)),
        Err(e) => {
            tracing::error!(code, error = %e, "failed to persist paper to database");
            return Err(AppError::database("paper could not be persisted", e));
        }
    }
    state.papers.insert(key, updated.clone());
    Ok((updated, result))
}

fn notify_author(state: &AppState, paper: &Paper, mail: impl FnOnce(&str, &str, &Paper) -> OutgoingMail) {
    match state.users.get(&paper.user_id) {
        Some(author) => state
            .effects
            .enqueue(SideEffect::SendEmail(mail(&state.config.event_name, &author.email, paper))),
        None => tracing::warn!(code = %paper.paper_code, user_id = %paper.user_id, "paper author not found, no mail sent"),
    }
    state.effects.enqueue(SideEffect::AppendSubmissionRow {
        code: paper.paper_code.clone(),
        row: SheetRow::paper(paper),
    });
}

/// Register a paper against one of the caller's abstracts.
pub async fn submit(state: &AppState, caller: &CallerIdentity, input: NewPaper) -> Result<Paper, AppError> {
    let uid = caller.registrant_id()?;
    input.validate()?;
    let code = input.abstract_code.trim().to_string();
    let parent = state
        .abstracts
        .get(&code)
        .ok_or_else(|| AppError::NotFound(format!("abstract {code} not found")))?;
    if parent.user_id != uid {
        return Err(AppError::Forbidden("a paper must extend one of your own abstracts".into()));
    }
    if parent.status == AbstractStatus::Rejected {
        return Err(AppError::Conflict(format!("abstract {code} was rejected")));
    }

    let paper = Paper::new(&code, uid, &input, Utc::now());
    let conflict = || AppError::Conflict(format!("a paper for {code} already exists"));
    match &state.db_pool {
        None => {
            let placed = state.papers.with_entry(&code, |slot| {
                if slot.is_some() {
                    return false;
                }
                *slot = Some(paper.clone());
                true
            });
            if !placed {
                return Err(conflict());
            }
        }
        Some(pool) => {
            if state.papers.contains(&code) {
                return Err(conflict());
            }
            match crate::db::papers::insert(pool, &paper).await {
                Ok(true) => {
                    state.papers.insert(code.clone(), paper.clone());
                }
                Ok(false) => return Err(conflict()),
                Err(e) => {
                    tracing::error!(code = %code, error = %e, "failed to persist paper to database");
                    return Err(AppError::database("paper could not be persisted", e));
                }
            }
        }
    }

    tracing::info!(code = %code, user_id = %uid, "paper submitted");
    Ok(paper)
}

/// Admins get every paper; registrants get their own. Oldest first.
pub fn list(state: &AppState, caller: &CallerIdentity) -> Result<Vec<Paper>, AppError> {
    let mut papers = if caller.role == Role::Admin {
        state.papers.list()
    } else {
        let uid = caller.registrant_id()?;
        state.papers.list().into_iter().filter(|p| p.user_id == uid).collect()
    };
    papers.sort_by(|a, b| {
        a.submitted_at
            .cmp(&b.submitted_at)
            .then_with(|| a.paper_code.cmp(&b.paper_code))
    });
    Ok(papers)
}

pub fn get(state: &AppState, caller: &CallerIdentity, code: &str) -> Result<Paper, AppError> {
    visible(state, caller, code)
}

/// Which slot an upload fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upload {
    /// The manuscript, before review starts.
    Manuscript,
    /// A revision, after review.
    Revision,
}

/// Store an upload and record it on the paper.
pub async fn upload(
    state: &AppState,
    caller: &CallerIdentity,
    code: &str,
    kind: Upload,
    file_name: &str,
    bytes: &[u8],
) -> Result<Paper, AppError> {
    let current = authored(state, caller, code)?;
    let refused = match kind {
        Upload::Manuscript => current.status != PaperStatus::Submitted,
        Upload::Revision => current.status == PaperStatus::Rejected || current.paper_file.is_none(),
    };
    if refused {
        return Err(SubmissionError::WrongState {
            code: code.to_string(),
            status: current.status.as_str(),
        }
        .into());
    }

    let now = Utc::now();
    let prefix = match kind {
        Upload::Manuscript => format!("{code}-paper"),
        Upload::Revision => format!("{code}-revision"),
    };
    let document = documents::store(state, &prefix, file_name, bytes, &DOCUMENT_EXTENSIONS, now).await?;
    let stored_name = document.stored_name.clone();
    let committed = commit(state, code, |p| match kind {
        Upload::Manuscript => p.attach(document, now),
        Upload::Revision => p.submit_revision(document, now),
    })
    .await;
    let (updated, previous): (Paper, Option<StoredDocument>) = match committed {
        Ok(done) => done,
        Err(e) => {
            documents::discard(state, &stored_name).await;
            return Err(e);
        }
    };
    if let Some(previous) = previous.filter(|p| p.stored_name != stored_name) {
        documents::discard(state, &previous.stored_name).await;
    }

    tracing::info!(code, kind = ?kind, status = %updated.status, size = bytes.len(), "paper document uploaded");
    notify_author(state, &updated, OutgoingMail::paper_received);
    Ok(updated)
}

/// Record a review. The recommendation decides the new status.
pub async fn review(
    state: &AppState,
    caller: &CallerIdentity,
    code: &str,
    review: PaperReview,
) -> Result<Paper, AppError> {
    require_role(caller, Role::Admin)?;
    review.validate()?;
    let now = Utc::now();
    let (updated, ()) = commit(state, code, |p| {
        p.record_review(review, now);
        Ok(())
    })
    .await?;
    tracing::info!(code, status = %updated.status, reviewer = %caller.email, "paper reviewed");
    notify_author(state, &updated, OutgoingMail::paper_reviewed);
    Ok(updated)
}

/// Remove a paper and its stored documents.
pub async fn delete(state: &AppState, caller: &CallerIdentity, code: &str) -> Result<(), AppError> {
    require_role(caller, Role::Admin)?;
    let key = code.to_string();
    if !state.papers.contains(&key) {
        return Err(not_found(code));
    }
    if let Some(pool) = &state.db_pool {
        if let Err(e) = crate::db::papers::delete(pool, code).await {
            tracing::error!(code, error = %e, "failed to delete paper from database");
            return Err(AppError::database("paper could not be deleted", e));
        }
    }
    let removed = state.papers.remove(&key).ok_or_else(|| not_found(code))?;
    for document in [removed.paper_file, removed.revised_file].into_iter().flatten() {
        documents::discard(state, &document.stored_name).await;
    }
    tracing::info!(code, by = %caller.email, "paper deleted");
    Ok(())
}

/// Open the latest document (the revision when there is one).
pub async fn open_document(
    state: &AppState,
    caller: &CallerIdentity,
    code: &str,
) -> Result<OpenDocument, AppError> {
    let paper = visible(state, caller, code)?;
    let document = paper
        .current_document()
        .ok_or_else(|| AppError::NotFound(format!("paper {code} has no document")))?;
    documents::open(state, code, document).await
}
