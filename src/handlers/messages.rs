//! User-facing message catalog

use std::collections::HashMap;

/// Keys of the message catalog, as used in the `[messages]` config table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKey {
    Saved,
    SaveInsufficient,
    Found,
    RetrieveEmpty,
    RetrieveInsufficient,
    ListHeader,
    ListEmpty,
    DeleteConfirm,
    DeleteEmpty,
    DeleteInsufficient,
    Deleted,
    DeleteCancelled,
    Updated,
    UpdateInsufficient,
    UpdateNotFound,
    Rejected,
    Failed,
}

impl MessageKey {
    pub const ALL: [MessageKey; 17] = [
        MessageKey::Saved,
        MessageKey::SaveInsufficient,
        MessageKey::Found,
        MessageKey::RetrieveEmpty,
        MessageKey::RetrieveInsufficient,
        MessageKey::ListHeader,
        MessageKey::ListEmpty,
        MessageKey::DeleteConfirm,
        MessageKey::DeleteEmpty,
        MessageKey::DeleteInsufficient,
        MessageKey::Deleted,
        MessageKey::DeleteCancelled,
        MessageKey::Updated,
        MessageKey::UpdateInsufficient,
        MessageKey::UpdateNotFound,
        MessageKey::Rejected,
        MessageKey::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKey::Saved => "saved",
            MessageKey::SaveInsufficient => "save_insufficient",
            MessageKey::Found => "found",
            MessageKey::RetrieveEmpty => "retrieve_empty",
            MessageKey::RetrieveInsufficient => "retrieve_insufficient",
            MessageKey::ListHeader => "list_header",
            MessageKey::ListEmpty => "list_empty",
            MessageKey::DeleteConfirm => "delete_confirm",
            MessageKey::DeleteEmpty => "delete_empty",
            MessageKey::DeleteInsufficient => "delete_insufficient",
            MessageKey::Deleted => "deleted",
            MessageKey::DeleteCancelled => "delete_cancelled",
            MessageKey::Updated => "updated",
            MessageKey::UpdateInsufficient => "update_insufficient",
            MessageKey::UpdateNotFound => "update_not_found",
            MessageKey::Rejected => "rejected",
            MessageKey::Failed => "failed",
        }
    }

    fn default_text(&self) -> &'static str {
        match self {
            MessageKey::Saved => "✅ Stored 🔒 {item}",
            MessageKey::SaveInsufficient => {
                "Nothing to store: no value found. Try \"save my email name@example.com\"."
            }
            MessageKey::Found => "🔒 {item}",
            MessageKey::RetrieveEmpty => "❌ No data found",
            MessageKey::RetrieveInsufficient => "What should I look up?",
            MessageKey::ListHeader => "🔒 Stored data ({count}):",
            MessageKey::ListEmpty => "No data stored yet",
            MessageKey::DeleteConfirm => {
                "Delete {count} item(s)?\n{items}\nReply \"yes\" to confirm, anything else cancels."
            }
            MessageKey::DeleteEmpty => "❌ Nothing found to delete",
            MessageKey::DeleteInsufficient => "What should I delete?",
            MessageKey::Deleted => "🗑️ Deleted {count} item(s)",
            MessageKey::DeleteCancelled => "❌ Delete cancelled",
            MessageKey::Updated => "✏️ Updated {label}: {old} → {new}",
            MessageKey::UpdateInsufficient => {
                "Please name the item and its new value, e.g. \"change my email to new@example.com\"."
            }
            MessageKey::UpdateNotFound => "❌ Nothing stored for \"{target}\"",
            MessageKey::Rejected => "⚠️ That request could not be run safely.",
            MessageKey::Failed => "⚠️ Local storage error, please try again.",
        }
    }
}

/// Built-in English strings with per-key overrides from configuration
#[derive(Debug, Clone, Default)]
pub struct MessageCatalog {
    overrides: HashMap<String, String>,
}

impl MessageCatalog {
    pub fn new(overrides: HashMap<String, String>) -> Self {
        for key in overrides.keys() {
            if !MessageKey::ALL.iter().any(|k| k.as_str() == key) {
                tracing::warn!(key = %key, "Ignoring unknown message override");
            }
        }
        Self { overrides }
    }

    /// Template for `key`
    pub fn get(&self, key: MessageKey) -> &str {
        self.overrides
            .get(key.as_str())
            .map(String::as_str)
            .unwrap_or_else(|| key.default_text())
    }

    /// Template for `key` with every `{name}` replaced
    pub fn format(&self, key: MessageKey, args: &[(&str, &str)]) -> String {
        args.iter()
            .fold(self.get(key).to_string(), |text, (name, value)| {
                text.replace(&format!("{{{}}}", name), value)
            })
    }
}
