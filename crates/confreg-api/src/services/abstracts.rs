//! Abstract submission, document attachment, finalization and review.
//!
//! Authors see and edit only their own abstracts; admins see all of them and
//! record the review. With a database attached every change is written
//! there first and mirrored in memory only once the write succeeded.

use chrono::{DateTime, Utc};
use confreg_core::{
    abstract_code, AbstractReview, AbstractSubmission, AbstractUpdate, NewAbstract,
    SubmissionError, DOCUMENT_EXTENSIONS,
};
use rand::Rng;
use uuid::Uuid;

use crate::auth::{require_role, CallerIdentity, Role};
use crate::effects::SideEffect;
use crate::error::AppError;
use crate::mailer::OutgoingMail;
use crate::services::documents::{self, OpenDocument};
use crate::sheets::SheetRow;
use crate::state::AppState;

const CODE_ATTEMPTS: usize = 16;

fn not_found(code: &str) -> AppError {
    AppError::NotFound(format!("abstract {code} not found"))
}

/// Load `code` if `caller` may see it: the author, or any admin.
fn visible(state: &AppState, caller: &CallerIdentity, code: &str) -> Result<AbstractSubmission, AppError> {
    let submission = state.abstracts.get(&code.to_string()).ok_or_else(|| not_found(code))?;
    if !caller.can_access_user(submission.user_id) {
        return Err(AppError::Forbidden("cannot access another registrant's abstract".into()));
    }
    Ok(submission)
}

/// Load `code` if `caller` wrote it.
fn authored(state: &AppState, caller: &CallerIdentity, code: &str) -> Result<AbstractSubmission, AppError> {
    let uid = caller.registrant_id()?;
    let submission = state.abstracts.get(&code.to_string()).ok_or_else(|| not_found(code))?;
    if submission.user_id != uid {
        return Err(AppError::Forbidden("only the author can change an abstract".into()));
    }
    Ok(submission)
}

/// Apply `change` to abstract `code` and persist it.
async fn commit<R>(
    state: &AppState,
    code: &str,
    change: impl FnOnce(&mut AbstractSubmission) -> Result<R, SubmissionError>,
) -> Result<(AbstractSubmission, R), AppError> {
    let key = code.to_string();
    let Some(pool) = &state.db_pool else {
        let applied = state
            .abstracts
            .try_update(&key, |a| change(a).map(|r| (a.clone(), r)))
            .ok_or_else(|| not_found(code))?;
        return Ok(applied?);
    };

    let mut updated = state.abstracts.get(&key).ok_or_else(|| not_found(code))?;
    let result = change(&mut updated)?;
    match crate::db::abstracts::update(pool, &updated).await {
        Ok(true) => {}
        Ok(false) => return Err(not_found(code)),
        Err(e) => {
            tracing::error!(code, error = %e, "failed to persist abstract to database");
            return Err(AppError::database("abstract could not be persisted", e));
        }
    }
    state.abstracts.insert(key, updated.clone());
    Ok((updated, result))
}

fn queue_row(state: &AppState, submission: &AbstractSubmission) {
    state.effects.enqueue(SideEffect::AppendSubmissionRow {
        code: submission.abstract_code.clone(),
        row: SheetRow::abstract_submission(submission),
    });
}

/// Submit a new abstract as the calling registrant.
pub async fn submit(
    state: &AppState,
    caller: &CallerIdentity,
    input: NewAbstract,
) -> Result<AbstractSubmission, AppError> {
    let uid = caller.registrant_id()?;
    input.validate()?;
    if !state.users.contains(&uid) {
        return Err(AppError::NotFound(format!("registrant {uid} not found")));
    }

    let now = Utc::now();
    let submission = place(state, uid, &input, now).await?;
    tracing::info!(code = %submission.abstract_code, user_id = %uid, "abstract submitted");

    state.effects.enqueue(SideEffect::SendEmail(OutgoingMail::abstract_submitted(
        &state.config.event_name,
        &caller.email,
        &submission,
    )));
    queue_row(state, &submission);
    Ok(submission)
}

/// Pick an unused code and store the abstract under it.
async fn place(
    state: &AppState,
    uid: Uuid,
    input: &NewAbstract,
    now: DateTime<Utc>,
) -> Result<AbstractSubmission, AppError> {
    for _ in 0..CODE_ATTEMPTS {
        let code = abstract_code(rand::thread_rng().gen_range(1..1_000_000));
        let submission = AbstractSubmission::new(code.clone(), uid, input, now);

        let Some(pool) = &state.db_pool else {
            let placed = state.abstracts.with_entry(&code, |slot| {
                if slot.is_some() {
                    return false;
                }
                *slot = Some(submission.clone());
                true
            });
            if placed {
                return Ok(submission);
            }
            continue;
        };

        if state.abstracts.contains(&code) {
            continue;
        }
        match crate::db::abstracts::insert(pool, &submission).await {
            Ok(true) => {
                state.abstracts.insert(code, submission.clone());
                return Ok(submission);
            }
            Ok(false) => continue,
            Err(e) => {
                tracing::error!(user_id = %uid, error = %e, "failed to persist abstract to database");
                return Err(AppError::database("abstract could not be persisted", e));
            }
        }
    }
    tracing::error!(user_id = %uid, attempts = CODE_ATTEMPTS, "no free abstract code found");
    Err(AppError::Internal("could not allocate an abstract code".into()))
}

/// Admins get every abstract; registrants get their own. Oldest first.
pub fn list(state: &AppState, caller: &CallerIdentity) -> Result<Vec<AbstractSubmission>, AppError> {
    let mut abstracts = if caller.role == Role::Admin {
        state.abstracts.list()
    } else {
        let uid = caller.registrant_id()?;
        state
            .abstracts
            .list()
            .into_iter()
            .filter(|a| a.user_id == uid)
            .collect()
    };
    abstracts.sort_by(|a, b| {
        a.submitted_at
            .cmp(&b.submitted_at)
            .then_with(|| a.abstract_code.cmp(&b.abstract_code))
    });
    Ok(abstracts)
}

pub fn get(state: &AppState, caller: &CallerIdentity, code: &str) -> Result<AbstractSubmission, AppError> {
    visible(state, caller, code)
}

/// Title of the registrant's earliest abstract.
pub fn first_title(state: &AppState, uid: Uuid) -> Option<String> {
    state
        .abstracts
        .list()
        .into_iter()
        .filter(|a| a.user_id == uid)
        .min_by(|a, b| {
            a.submitted_at
                .cmp(&b.submitted_at)
                .then_with(|| a.abstract_code.cmp(&b.abstract_code))
        })
        .map(|a| a.title)
}

/// Edit an unfinalized abstract.
pub async fn update(
    state: &AppState,
    caller: &CallerIdentity,
    code: &str,
    update: AbstractUpdate,
) -> Result<AbstractSubmission, AppError> {
    authored(state, caller, code)?;
    update.validate()?;
    if update.is_empty() {
        return Err(AppError::Validation("no updatable fields supplied".into()));
    }
    let now = Utc::now();
    let (updated, ()) = commit(state, code, |a| update.apply(a, now)).await?;
    tracing::info!(code, "abstract edited");
    Ok(updated)
}

/// Attach a document, replacing any previous one.
pub async fn attach_document(
    state: &AppState,
    caller: &CallerIdentity,
    code: &str,
    file_name: &str,
    bytes: &[u8],
) -> Result<AbstractSubmission, AppError> {
    let current = authored(state, caller, code)?;
    if current.is_finalized {
        return Err(SubmissionError::Finalized(code.to_string()).into());
    }

    let now = Utc::now();
    let document = documents::store(state, code, file_name, bytes, &DOCUMENT_EXTENSIONS, now).await?;
    let stored_name = document.stored_name.clone();
    let (updated, previous) = match commit(state, code, |a| a.attach(document, now)).await {
        Ok(done) => done,
        Err(e) => {
            documents::discard(state, &stored_name).await;
            return Err(e);
        }
    };
    if let Some(previous) = previous.filter(|p| p.stored_name != stored_name) {
        documents::discard(state, &previous.stored_name).await;
    }

    tracing::info!(code, size = bytes.len(), "abstract document attached");
    Ok(updated)
}

/// Drop the attached document of an unfinalized abstract.
pub async fn remove_document(
    state: &AppState,
    caller: &CallerIdentity,
    code: &str,
) -> Result<AbstractSubmission, AppError> {
    authored(state, caller, code)?;
    let (updated, previous) = commit(state, code, |a| a.detach(Utc::now())).await?;
    match previous {
        Some(previous) => {
            documents::discard(state, &previous.stored_name).await;
            tracing::info!(code, "abstract document removed");
        }
        None => tracing::debug!(code, "abstract had no document to remove"),
    }
    Ok(updated)
}

/// Lock the abstract against further author edits.
pub async fn finalize(
    state: &AppState,
    caller: &CallerIdentity,
    code: &str,
) -> Result<AbstractSubmission, AppError> {
    let current = authored(state, caller, code)?;
    if current.is_finalized {
        return Ok(current);
    }
    let (updated, ()) = commit(state, code, |a| a.finalize(Utc::now())).await?;
    tracing::info!(code, "abstract finalized");
    queue_row(state, &updated);
    Ok(updated)
}

/// Record an admin decision and tell the author.
pub async fn review(
    state: &AppState,
    caller: &CallerIdentity,
    code: &str,
    review: AbstractReview,
) -> Result<AbstractSubmission, AppError> {
    require_role(caller, Role::Admin)?;
    review.validate()?;
    let now = Utc::now();
    let (updated, ()) = commit(state, code, |a| {
        a.review(&review, now);
        Ok(())
    })
    .await?;
    tracing::info!(code, status = %updated.status, reviewer = %caller.email, "abstract reviewed");

    match state.users.get(&updated.user_id) {
        Some(author) => state.effects.enqueue(SideEffect::SendEmail(OutgoingMail::abstract_reviewed(
            &state.config.event_name,
            &author.email,
            &updated,
        ))),
        None => tracing::warn!(code, user_id = %updated.user_id, "abstract author not found, no mail sent"),
    }
    queue_row(state, &updated);
    Ok(updated)
}

/// Open the attached document for its author or an admin.
pub async fn open_document(
    state: &AppState,
    caller: &CallerIdentity,
    code: &str,
) -> Result<OpenDocument, AppError> {
    let submission = visible(state, caller, code)?;
    let document = submission
        .document
        .ok_or_else(|| AppError::NotFound(format!("abstract {code} has no document")))?;
    documents::open(state, code, &document).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use confreg_core::abstracts::AbstractStatus;
    use confreg_core::NewRegistrant;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;

    fn state_in(dir: &std::path::Path) -> AppState {
        AppState::with_config(AppConfig {
            downloads_dir: dir.to_path_buf(),
            ..AppConfig::default()
        })
        .unwrap()
    }

    async fn registrant(state: &AppState, email: &str) -> CallerIdentity {
        let signup: NewRegistrant = serde_json::from_value(serde_json::json!({
            "email": email,
            "password": "correct horse battery",
            "phone": "99999",
            "given_name": "Ada",
            "country": "India",
            "affiliation": "IISc"
        }))
        .unwrap();
        let r = crate::services::users::register(state, signup).await.unwrap();
        CallerIdentity {
            role: Role::Attendee,
            user_id: Some(r.uid),
            email: r.email,
        }
    }

    fn admin() -> CallerIdentity {
        CallerIdentity {
            role: Role::Admin,
            user_id: None,
            email: "admin@conf.example".into(),
        }
    }

    fn input(title: &str) -> NewAbstract {
        serde_json::from_value(serde_json::json!({
            "title": title,
            "theme": "Climate",
            "presenting_type": "Oral",
            "first_author_name": "Ada",
            "first_author_affiliation": "IISc",
            "presenting_author_name": "Ada",
            "presenting_author_affiliation": "IISc",
            "main_body": "We measure."
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn authors_see_their_own_and_admins_see_all() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(dir.path());
        let ada = registrant(&state, "ada@x.org").await;
        let bob = registrant(&state, "bob@x.org").await;

        let first = submit(&state, &ada, input("First")).await.unwrap();
        assert!(first.abstract_code.starts_with("ABS_"));
        submit(&state, &bob, input("Other")).await.unwrap();

        assert_eq!(list(&state, &ada).unwrap().len(), 1);
        assert_eq!(list(&state, &admin()).unwrap().len(), 2);
        assert!(matches!(
            get(&state, &bob, &first.abstract_code),
            Err(AppError::Forbidden(_))
        ));
        assert_eq!(first_title(&state, ada.user_id.unwrap()).as_deref(), Some("First"));
        assert!(first_title(&state, Uuid::new_v4()).is_none());
        assert!(matches!(submit(&state, &admin(), input("x")).await, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn finalized_abstract_refuses_edits_and_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(dir.path());
        let ada = registrant(&state, "ada@x.org").await;
        let code = submit(&state, &ada, input("Soil")).await.unwrap().abstract_code;

        let early = finalize(&state, &ada, &code).await.unwrap_err();
        assert!(matches!(early, AppError::Validation(_)));

        attach_document(&state, &ada, &code, "v1.pdf", b"one").await.unwrap();
        let replaced = attach_document(&state, &ada, &code, "v2.docx", b"two").await.unwrap();
        assert_eq!(replaced.document.as_ref().unwrap().file_name, "v2.docx");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);

        let locked = finalize(&state, &ada, &code).await.unwrap();
        assert!(locked.is_finalized);

        let edit = AbstractUpdate {
            title: Some("Changed".into()),
            ..Default::default()
        };
        assert!(matches!(update(&state, &ada, &code, edit).await, Err(AppError::Conflict(_))));
        assert!(matches!(
            attach_document(&state, &ada, &code, "v3.pdf", b"3").await,
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(remove_document(&state, &ada, &code).await, Err(AppError::Conflict(_))));

        let mut opened = open_document(&state, &admin(), &code).await.unwrap();
        let mut bytes = Vec::new();
        opened.handle.read_to_end(&mut bytes).await.unwrap();
        assert_eq!(bytes, b"two");
    }

    #[tokio::test]
    async fn review_is_admin_only_and_mails_author() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(dir.path());
        let ada = registrant(&state, "ada@x.org").await;
        let code = submit(&state, &ada, input("Soil")).await.unwrap().abstract_code;
        let decision = AbstractReview {
            status: AbstractStatus::Rejected,
            remarks: Some("Out of scope".into()),
        };

        assert!(matches!(
            review(&state, &ada, &code, decision.clone()).await,
            Err(AppError::Forbidden(_))
        ));
        let reviewed = review(&state, &admin(), &code, decision).await.unwrap();
        assert_eq!(reviewed.status, AbstractStatus::Rejected);

        let mut found = false;
        for _ in 0..100 {
            found = state
                .mailer
                .sent()
                .iter()
                .any(|m| m.to == "ada@x.org" && m.body.contains("Out of scope"));
            if found {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(found);
    }

    #[tokio::test]
    async fn unsupported_document_is_not_stored() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(dir.path());
        let ada = registrant(&state, "ada@x.org").await;
        let code = submit(&state, &ada, input("Soil")).await.unwrap().abstract_code;

        let err = attach_document(&state, &ada, &code, "slides.pptx", b"x").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(state.abstracts.get(&code).unwrap().document.is_none());
    }

    #[tokio::test]
    async fn failed_persist_keeps_memory_and_disk_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(dir.path());
        let ada = registrant(&state, "ada@x.org").await;
        let code = submit(&state, &ada, input("Soil")).await.unwrap().abstract_code;
        let state = state.with_db_pool(Some(crate::db::unreachable_pool()));

        let err = attach_document(&state, &ada, &code, "v1.pdf", b"one").await.unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
        assert!(state.abstracts.get(&code).unwrap().document.is_none());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

        let err = submit(&state, &ada, input("Second")).await.unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
        assert_eq!(state.abstracts.len(), 1);
    }
}
