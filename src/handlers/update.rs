//! UPDATE handler: rewrite the newest matching item in place

use async_trait::async_trait;

use super::{
    now_millis, ActionHandler, ActionOutcome, HandlerDeps, MessageKey, OutcomeStatus, Request,
};
use crate::error::Result;
use crate::intent::Action;
use crate::store::StoredItem;

/// UPDATE: replace the value of the newest matching item
pub struct UpdateHandler;

#[async_trait]
impl ActionHandler for UpdateHandler {
    fn action(&self) -> Action {
        Action::Update
    }

    async fn execute(&self, deps: &HandlerDeps, request: &Request<'_>) -> Result<ActionOutcome> {
        let Some(extraction) = deps.extractor.extract_update(request.text).await else {
            return Ok(request.outcome(
                OutcomeStatus::Insufficient,
                deps.messages.get(MessageKey::UpdateInsufficient),
            ));
        };
        let spec = &extraction.value;

        let lookup = deps.synthesizer.find_update_target(spec)?;
        let Some(current) = deps.store.run(lookup).await?.rows().into_iter().next() else {
            return Ok(request
                .outcome(
                    OutcomeStatus::NotFound,
                    deps.messages
                        .format(MessageKey::UpdateNotFound, &[("target", spec.target())]),
                )
                .with_method(extraction.method));
        };

        let now = now_millis();
        let stmt = deps.synthesizer.replace_item(&current, spec.new_value(), now)?;
        let affected = deps.store.run(stmt).await?.affected();

        let label = current.label.clone().unwrap_or_else(|| spec.target().to_string());
        let message = deps.messages.format(
            MessageKey::Updated,
            &[
                ("label", &label),
                ("old", &current.content),
                ("new", spec.new_value()),
            ],
        );
        let updated = StoredItem {
            content: spec.new_value().to_string(),
            created_at: now,
            ..current
        };

        Ok(request
            .outcome(OutcomeStatus::Updated, message)
            .with_method(extraction.method)
            .with_affected(affected)
            .with_items(vec![updated]))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::super::{RetrieveHandler, SaveHandler};
    use super::*;
    use crate::models::ScriptedModel;

    #[tokio::test]
    async fn test_update_replaces_in_place() {
        let deps = deps(ScriptedModel::new());
        let save = classified(Action::Save);
        SaveHandler
            .handle(&deps, &request("save my email old@x.io", &save))
            .await;

        let c = classified(Action::Update);
        let outcome = UpdateHandler
            .handle(&deps, &request("change my email to new@x.io", &c))
            .await;
        assert_eq!(outcome.status, OutcomeStatus::Updated);
        assert!(outcome.message.contains("old@x.io → new@x.io"));
        assert_eq!(deps.store.item_count().unwrap(), 1);

        let r = classified(Action::Retrieve);
        let found = RetrieveHandler
            .handle(&deps, &request("show my email", &r))
            .await;
        assert_eq!(found.metadata.items[0].content, "new@x.io");
        assert_eq!(found.metadata.items[0].label.as_deref(), Some("email"));
    }

    #[tokio::test]
    async fn test_missing_new_value_is_insufficient() {
        let deps = deps(ScriptedModel::new());
        let c = classified(Action::Update);
        let outcome = UpdateHandler
            .handle(&deps, &request("update my email", &c))
            .await;
        assert_eq!(outcome.status, OutcomeStatus::Insufficient);
        assert!(!outcome.is_success());
    }

    #[tokio::test]
    async fn test_unknown_target_is_not_found() {
        let deps = deps(ScriptedModel::new());
        let c = classified(Action::Update);
        let outcome = UpdateHandler
            .handle(&deps, &request("change my passport to X1234", &c))
            .await;
        assert_eq!(outcome.status, OutcomeStatus::NotFound);
        assert!(outcome.message.contains("passport"));
    }
}
