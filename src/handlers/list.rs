//! LIST handler

use async_trait::async_trait;

use super::{bullet_list, ActionHandler, ActionOutcome, HandlerDeps, MessageKey, OutcomeStatus, Request};
use crate::error::Result;
use crate::intent::Action;

/// LIST: every matching item, newest first
pub struct ListHandler;

#[async_trait]
impl ActionHandler for ListHandler {
    fn action(&self) -> Action {
        Action::List
    }

    async fn execute(&self, deps: &HandlerDeps, request: &Request<'_>) -> Result<ActionOutcome> {
        let extraction = deps.extractor.extract_list(request.text).await;
        tracing::debug!(filter = ?extraction.value, "Listing");

        let stmt = deps.synthesizer.list(&extraction.value)?;
        let rows = deps.store.run(stmt).await?.rows();

        let outcome = if rows.is_empty() {
            request.outcome(OutcomeStatus::Empty, deps.messages.get(MessageKey::ListEmpty))
        } else {
            let header = deps
                .messages
                .format(MessageKey::ListHeader, &[("count", &rows.len().to_string())]);
            request.outcome(
                OutcomeStatus::Found,
                format!("{}\n{}", header, bullet_list(&rows)),
            )
        };
        Ok(outcome
            .with_method(extraction.method)
            .with_affected(rows.len())
            .with_items(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::super::SaveHandler;
    use super::*;
    use crate::models::ScriptedModel;
    use std::sync::Arc;

    async fn seed(deps: &HandlerDeps, messages: &[&str]) {
        let c = classified(Action::Save);
        for text in messages {
            SaveHandler.handle(deps, &request(text, &c)).await;
            tokio::time::sleep(std::time::Duration::from_millis(3)).await;
        }
    }

    #[tokio::test]
    async fn test_list_all_newest_first() {
        let deps = deps(ScriptedModel::new());
        seed(
            &deps,
            &["save my email a@b.io", "save my phone 0301234567", "save my pin 4242"],
        )
        .await;

        let c = classified(Action::List);
        let outcome = ListHandler.handle(&deps, &request("list all data", &c)).await;
        assert_eq!(outcome.status, OutcomeStatus::Found);
        let contents: Vec<_> = outcome
            .metadata
            .items
            .iter()
            .map(|i| i.content.as_str())
            .collect();
        assert_eq!(contents, vec!["4242", "0301234567", "a@b.io"]);
        assert!(outcome.message.starts_with("🔒 Stored data (3):"));
    }

    #[tokio::test]
    async fn test_list_with_filter() {
        let deps = deps(ScriptedModel::new());
        seed(&deps, &["save my email a@b.io", "save my phone 0301234567"]).await;

        let c = classified(Action::List);
        let outcome = ListHandler
            .handle(&deps, &request("list my emails", &c))
            .await;
        assert_eq!(outcome.metadata.items.len(), 1);
        assert_eq!(outcome.metadata.items[0].content, "a@b.io");
    }

    #[tokio::test]
    async fn test_filtered_list_is_newest_first() {
        let deps = deps(ScriptedModel::new());
        seed(
            &deps,
            &[
                "save my phone number 0301234567",
                "save my email a@b.io",
                "save my work phone number 0307654321",
            ],
        )
        .await;

        let c = classified(Action::List);
        let outcome = ListHandler
            .handle(&deps, &request("list my phone numbers", &c))
            .await;
        assert_eq!(outcome.status, OutcomeStatus::Found);
        let contents: Vec<_> = outcome
            .metadata
            .items
            .iter()
            .map(|i| i.content.as_str())
            .collect();
        assert_eq!(contents, vec!["0307654321", "0301234567"]);
    }

    #[tokio::test]
    async fn test_model_plural_keyword_matches_singular_label() {
        let seeded = deps(ScriptedModel::new());
        seed(&seeded, &["save my phone number 0301234567"]).await;

        let deps = deps_with_store(
            ScriptedModel::new().answer("phone numbers"),
            Arc::clone(&seeded.store),
        );
        let c = classified(Action::List);
        let outcome = ListHandler
            .handle(&deps, &request("list my phone numbers", &c))
            .await;
        assert_eq!(outcome.status, OutcomeStatus::Found);
        assert_eq!(outcome.metadata.items.len(), 1);
        assert_eq!(outcome.metadata.items[0].content, "0301234567");
    }

    #[tokio::test]
    async fn test_empty_store() {
        let deps = deps(ScriptedModel::new());
        let c = classified(Action::List);
        let outcome = ListHandler.handle(&deps, &request("list all data", &c)).await;
        assert_eq!(outcome.status, OutcomeStatus::Empty);
        assert_eq!(outcome.message, "No data stored yet");
    }
}
