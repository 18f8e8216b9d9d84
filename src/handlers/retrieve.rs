//! RETRIEVE handler

use async_trait::async_trait;

use super::{ActionHandler, ActionOutcome, HandlerDeps, MessageKey, OutcomeStatus, Request};
use crate::error::Result;
use crate::intent::Action;

/// RETRIEVE: the newest item matching any keyword
pub struct RetrieveHandler;

#[async_trait]
impl ActionHandler for RetrieveHandler {
    fn action(&self) -> Action {
        Action::Retrieve
    }

    async fn execute(&self, deps: &HandlerDeps, request: &Request<'_>) -> Result<ActionOutcome> {
        let Some(extraction) = deps.extractor.extract_retrieve(request.text).await else {
            return Ok(request.outcome(
                OutcomeStatus::Insufficient,
                deps.messages.get(MessageKey::RetrieveInsufficient),
            ));
        };
        tracing::debug!(keywords = ?extraction.value.keywords(), "Retrieving");

        let stmt = deps.synthesizer.retrieve(&extraction.value)?;
        let rows = deps.store.run(stmt).await?.rows();

        let outcome = match rows.first() {
            Some(item) => request.outcome(
                OutcomeStatus::Found,
                deps.messages
                    .format(MessageKey::Found, &[("item", &item.display())]),
            ),
            None => request.outcome(
                OutcomeStatus::Empty,
                deps.messages.get(MessageKey::RetrieveEmpty),
            ),
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

    #[tokio::test]
    async fn test_save_then_retrieve() {
        let deps = deps(ScriptedModel::new());
        let save = classified(Action::Save);
        SaveHandler
            .handle(&deps, &request("save my email test@test.com", &save))
            .await;

        let c = classified(Action::Retrieve);
        let outcome = RetrieveHandler
            .handle(&deps, &request("show my email", &c))
            .await;
        assert_eq!(outcome.status, OutcomeStatus::Found);
        assert!(outcome.message.contains("test@test.com"));
        assert_eq!(outcome.metadata.items.len(), 1);
        assert_eq!(outcome.metadata.items[0].content, "test@test.com");
    }

    #[tokio::test]
    async fn test_returns_only_the_newest_match() {
        let deps = deps(ScriptedModel::new());
        let save = classified(Action::Save);
        SaveHandler
            .handle(&deps, &request("save my email old@test.com", &save))
            .await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        SaveHandler
            .handle(&deps, &request("save my email new@test.com", &save))
            .await;

        let c = classified(Action::Retrieve);
        let outcome = RetrieveHandler
            .handle(&deps, &request("what is my email?", &c))
            .await;
        assert_eq!(outcome.metadata.items.len(), 1);
        assert_eq!(outcome.metadata.items[0].content, "new@test.com");
    }

    #[tokio::test]
    async fn test_no_match_is_empty_success() {
        let deps = deps(ScriptedModel::new());
        let c = classified(Action::Retrieve);
        let outcome = RetrieveHandler
            .handle(&deps, &request("show my passport", &c))
            .await;
        assert_eq!(outcome.status, OutcomeStatus::Empty);
        assert!(outcome.is_success());
        assert_eq!(outcome.message, "❌ No data found");
    }
}
