//! SAVE handler

use async_trait::async_trait;

use super::{
    now_millis, ActionHandler, ActionOutcome, HandlerDeps, MessageKey, OutcomeStatus, Request,
};
use crate::error::Result;
use crate::intent::Action;
use crate::store::StoredItem;

/// SAVE: upsert one labelled value
pub struct SaveHandler;

#[async_trait]
impl ActionHandler for SaveHandler {
    fn action(&self) -> Action {
        Action::Save
    }

    async fn execute(&self, deps: &HandlerDeps, request: &Request<'_>) -> Result<ActionOutcome> {
        let Some(extraction) = deps.extractor.extract_save(request.text).await else {
            return Ok(request.outcome(
                OutcomeStatus::Insufficient,
                deps.messages.get(MessageKey::SaveInsufficient),
            ));
        };
        let data = &extraction.value;
        let now = now_millis();

        let stmt = deps.synthesizer.save(data, request.language, now)?;
        let affected = deps.store.run(stmt).await?.affected();

        let item = StoredItem {
            id: 0,
            content: data.value().to_string(),
            label: data.label().map(str::to_string),
            language: request.language.to_string(),
            created_at: now,
        };
        let message = deps
            .messages
            .format(MessageKey::Saved, &[("item", &item.display())]);
        tracing::debug!(kind = ?data.kind(), method = extraction.method.as_str(), "Saved item");

        Ok(request
            .outcome(OutcomeStatus::Saved, message)
            .with_method(extraction.method)
            .with_affected(affected)
            .with_items(vec![item]))
    }
}
