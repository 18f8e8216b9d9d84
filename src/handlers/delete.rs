//! DELETE handler: preview, then delete once the session confirms

use async_trait::async_trait;

use super::{
    bullet_list, ActionHandler, ActionOutcome, HandlerDeps, MessageKey, OutcomeStatus, Request,
};
use crate::error::Result;
use crate::intent::Action;
use crate::session::DeleteConfirmation;

const AFFIRMATIVE: &[&str] = &[
    "yes", "ok", "okay", "confirm", "sure", "ja", "jawohl", "sí", "si", "oui", "sim", "да", "はい",
    "是", "确认",
];

/// Single letters count only as the whole reply
const SHORT_AFFIRMATIVE: &[&str] = &["y", "j", "s"];

fn normalize_word(word: &str) -> String {
    word.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase()
}

/// Whether a confirmation reply says yes
pub fn is_affirmative(reply: &str) -> bool {
    let mut words = reply.split_whitespace().map(normalize_word);
    let Some(first) = words.next() else {
        return false;
    };
    AFFIRMATIVE.contains(&first.as_str())
        || (words.next().is_none() && SHORT_AFFIRMATIVE.contains(&first.as_str()))
}

/// DELETE: preview the affected items and ask for confirmation
pub struct DeleteHandler;

#[async_trait]
impl ActionHandler for DeleteHandler {
    fn action(&self) -> Action {
        Action::Delete
    }

    async fn execute(&self, deps: &HandlerDeps, request: &Request<'_>) -> Result<ActionOutcome> {
        let Some(extraction) = deps.extractor.extract_delete(request.text).await else {
            return Ok(request.outcome(
                OutcomeStatus::Insufficient,
                deps.messages.get(MessageKey::DeleteInsufficient),
            ));
        };
        tracing::debug!(delete_target = ?extraction.value, "Previewing delete");

        let stmt = deps.synthesizer.preview_delete(&extraction.value)?;
        let rows = deps.store.run(stmt).await?.rows();
        if rows.is_empty() {
            return Ok(request
                .outcome(OutcomeStatus::Empty, deps.messages.get(MessageKey::DeleteEmpty))
                .with_method(extraction.method));
        }

        let message = deps.messages.format(
            MessageKey::DeleteConfirm,
            &[
                ("count", &rows.len().to_string()),
                ("items", &bullet_list(&rows)),
            ],
        );
        Ok(request
            .outcome(OutcomeStatus::AwaitingConfirmation, message)
            .with_method(extraction.method)
            .with_items(rows.clone())
            .with_pending(DeleteConfirmation::new(rows)))
    }
}

/// Settle a pending DELETE with the session's next message.
///
/// Only an explicit affirmative deletes, and only the previewed ids. A
/// missing reply (stream ended) cancels.
pub async fn resolve_confirmation(
    deps: &HandlerDeps,
    pending: DeleteConfirmation,
    reply: Option<&str>,
) -> ActionOutcome {
    let confirmed = reply.is_some_and(is_affirmative);
    if !confirmed {
        tracing::info!(items = pending.ids.len(), "Delete cancelled");
        return ActionOutcome::new(
            Action::Delete,
            1.0,
            OutcomeStatus::Cancelled,
            deps.messages.get(MessageKey::DeleteCancelled),
        )
        .with_items(pending.items);
    }

    let deleted = match deps.synthesizer.delete_ids(&pending.ids) {
        Ok(stmt) => deps.store.run(stmt).await,
        Err(e) => Err(e.into()),
    };
    match deleted {
        Ok(outcome) => {
            let count = outcome.affected();
            tracing::info!(deleted = count, "Delete confirmed");
            ActionOutcome::new(
                Action::Delete,
                1.0,
                OutcomeStatus::Deleted,
                deps.messages
                    .format(MessageKey::Deleted, &[("count", &count.to_string())]),
            )
            .with_affected(count)
            .with_items(pending.items)
        }
        Err(e) => {
            tracing::error!(error = %e, "Confirmed delete failed");
            ActionOutcome::new(
                Action::Delete,
                1.0,
                OutcomeStatus::Failed,
                deps.messages.get(MessageKey::Failed),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::super::SaveHandler;
    use super::*;
    use crate::models::ScriptedModel;

    async fn seed(deps: &HandlerDeps) {
        let c = classified(Action::Save);
        for text in [
            "save my email a@b.io",
            "save my work email c@d.io",
            "save my phone 0301234567",
        ] {
            SaveHandler.handle(deps, &request(text, &c)).await;
        }
    }

    #[test]
    fn test_affirmatives() {
        for yes in ["yes", "Y", "ok!", "Ja bitte", "sí", "oui", "sim", "да", "confirm", " j "] {
            assert!(is_affirmative(yes), "{yes}");
        }
        for no in ["no", "nein", "", "   ", "maybe yes", "cancel"] {
            assert!(!is_affirmative(no), "{no}");
        }
    }

    #[test]
    fn test_single_letter_needs_whole_reply() {
        for no in ["s no", "j nein", "y no", "s'il te plaît non"] {
            assert!(!is_affirmative(no), "{no}");
        }
    }

    #[tokio::test]
    async fn test_delete_by_label_previews_all_matches() {
        let deps = deps(ScriptedModel::new());
        seed(&deps).await;

        let c = classified(Action::Delete);
        let outcome = DeleteHandler
            .handle(&deps, &request("delete my email", &c))
            .await;
        assert_eq!(outcome.status, OutcomeStatus::AwaitingConfirmation);
        let pending = outcome.pending.unwrap();
        assert_eq!(pending.ids.len(), 2);
        assert_eq!(deps.store.item_count().unwrap(), 3);

        let done = resolve_confirmation(&deps, pending, Some("yes")).await;
        assert_eq!(done.status, OutcomeStatus::Deleted);
        assert_eq!(done.metadata.affected_rows, 2);
        assert_eq!(deps.store.item_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_by_value_is_exact() {
        let deps = deps(ScriptedModel::new());
        seed(&deps).await;

        let c = classified(Action::Delete);
        let outcome = DeleteHandler
            .handle(&deps, &request("delete a@b.io", &c))
            .await;
        let pending = outcome.pending.unwrap();
        assert_eq!(pending.items.len(), 1);
        assert_eq!(pending.items[0].content, "a@b.io");
    }

    #[tokio::test]
    async fn test_negative_or_missing_reply_cancels() {
        let deps = deps(ScriptedModel::new());
        seed(&deps).await;
        let c = classified(Action::Delete);

        for reply in [Some("no"), Some(""), None] {
            let outcome = DeleteHandler
                .handle(&deps, &request("delete my email", &c))
                .await;
            let cancelled = resolve_confirmation(&deps, outcome.pending.unwrap(), reply).await;
            assert_eq!(cancelled.status, OutcomeStatus::Cancelled);
            assert!(cancelled.is_success());
            assert_eq!(deps.store.item_count().unwrap(), 3);
        }
    }

    #[tokio::test]
    async fn test_nothing_to_delete() {
        let deps = deps(ScriptedModel::new());
        let c = classified(Action::Delete);
        let outcome = DeleteHandler
            .handle(&deps, &request("delete my passport", &c))
            .await;
        assert_eq!(outcome.status, OutcomeStatus::Empty);
        assert!(outcome.pending.is_none());
    }

    #[tokio::test]
    async fn test_repeated_confirmed_delete_removes_nothing() {
        let deps = deps(ScriptedModel::new());
        seed(&deps).await;
        let c = classified(Action::Delete);

        let outcome = DeleteHandler
            .handle(&deps, &request("delete a@b.io", &c))
            .await;
        let pending = outcome.pending.unwrap();
        resolve_confirmation(&deps, pending.clone(), Some("yes")).await;
        let again = resolve_confirmation(&deps, pending, Some("yes")).await;
        assert_eq!(again.status, OutcomeStatus::Deleted);
        assert_eq!(again.metadata.affected_rows, 0);
    }
}
