//! Builds parameterized statements from extracted payloads

use super::{SqlParam, SqlValidator, SynthesizedStatement};
use crate::error::ValidationError;
use crate::extract::{DeleteTarget, ExtractedPayload, ListFilter, RetrieveQuery, SaveData, UpdateSpec};
use crate::store::StoredItem;

const COLUMNS: &str = "id, content, label, lang, timestamp";

/// Escape `%`, `_` and the escape character itself for a LIKE pattern
fn like_contains(term: &str) -> String {
    let mut out = String::with_capacity(term.len() + 2);
    out.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

/// Statement builder for the canonical table
#[derive(Debug, Clone)]
pub struct QuerySynthesizer {
    validator: SqlValidator,
}

impl QuerySynthesizer {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            validator: SqlValidator::new(table),
        }
    }

    pub fn validator(&self) -> &SqlValidator {
        &self.validator
    }

    fn table(&self) -> &str {
        self.validator.table()
    }

    /// Insert a value, refreshing the timestamp if `(content, label)` exists
    pub fn save(
        &self,
        data: &SaveData,
        language: &str,
        now: i64,
    ) -> Result<SynthesizedStatement, ValidationError> {
        let text = format!(
            "INSERT INTO {} (content, label, lang, timestamp) VALUES (?, ?, ?, ?) \
             ON CONFLICT(content, label) DO UPDATE SET timestamp = excluded.timestamp, lang = excluded.lang",
            self.table()
        );
        self.validator.seal(
            text,
            vec![
                data.value().into(),
                data.label().unwrap_or_default().into(),
                language.into(),
                now.into(),
            ],
        )
    }

    /// Most recent item matching any keyword
    pub fn retrieve(&self, query: &RetrieveQuery) -> Result<SynthesizedStatement, ValidationError> {
        self.select_matching(query.keywords(), Some(1))
    }

    /// Items matching the filter, newest first
    pub fn list(&self, filter: &ListFilter) -> Result<SynthesizedStatement, ValidationError> {
        match filter {
            ListFilter::Keyword(k) => self.select_matching(std::slice::from_ref(k), None),
            ListFilter::All => self.validator.seal(
                format!(
                    "SELECT {} FROM {} ORDER BY timestamp DESC, id DESC",
                    COLUMNS,
                    self.table()
                ),
                Vec::new(),
            ),
        }
    }

    /// OR-chained containment match over content and label
    pub fn select_matching(
        &self,
        keywords: &[String],
        limit: Option<usize>,
    ) -> Result<SynthesizedStatement, ValidationError> {
        let mut clauses = Vec::with_capacity(keywords.len());
        let mut params = Vec::with_capacity(keywords.len() * 2);
        for keyword in keywords {
            clauses.push("(content LIKE ? ESCAPE '\\' OR label LIKE ? ESCAPE '\\')");
            let pattern = like_contains(keyword);
            params.push(SqlParam::from(pattern.clone()));
            params.push(SqlParam::from(pattern));
        }

        let mut text = format!("SELECT {} FROM {}", COLUMNS, self.table());
        if !clauses.is_empty() {
            text.push_str(" WHERE ");
            text.push_str(&clauses.join(" OR "));
        }
        text.push_str(" ORDER BY timestamp DESC, id DESC");
        if let Some(n) = limit {
            text.push_str(&format!(" LIMIT {}", n));
        }
        self.validator.seal(text, params)
    }

    fn delete_predicate(target: &DeleteTarget) -> (Option<&'static str>, Vec<SqlParam>) {
        match target {
            DeleteTarget::Value(v) => (Some("content = ?"), vec![v.as_str().into()]),
            DeleteTarget::Label(l) => (
                Some("label LIKE ? ESCAPE '\\'"),
                vec![like_contains(l).into()],
            ),
            DeleteTarget::All => (None, Vec::new()),
        }
    }

    /// Rows a DELETE of `target` would remove
    pub fn preview_delete(
        &self,
        target: &DeleteTarget,
    ) -> Result<SynthesizedStatement, ValidationError> {
        let (predicate, params) = Self::delete_predicate(target);
        let mut text = format!("SELECT {} FROM {}", COLUMNS, self.table());
        if let Some(p) = predicate {
            text.push_str(" WHERE ");
            text.push_str(p);
        }
        text.push_str(" ORDER BY timestamp DESC, id DESC");
        self.validator.seal(text, params)
    }

    /// Direct DELETE of `target`
    pub fn delete(&self, target: &DeleteTarget) -> Result<SynthesizedStatement, ValidationError> {
        let (predicate, params) = Self::delete_predicate(target);
        let mut text = format!("DELETE FROM {}", self.table());
        if let Some(p) = predicate {
            text.push_str(" WHERE ");
            text.push_str(p);
        }
        self.validator.seal(text, params)
    }

    /// DELETE restricted to previously previewed ids
    pub fn delete_ids(&self, ids: &[i64]) -> Result<SynthesizedStatement, ValidationError> {
        let placeholders = vec!["?"; ids.len()].join(", ");
        let text = format!("DELETE FROM {} WHERE id IN ({})", self.table(), placeholders);
        self.validator
            .seal(text, ids.iter().map(|id| SqlParam::from(*id)).collect())
    }

    /// Candidates for an UPDATE, newest first
    pub fn find_update_target(
        &self,
        spec: &UpdateSpec,
    ) -> Result<SynthesizedStatement, ValidationError> {
        self.select_matching(&[spec.target().to_string()], Some(1))
    }

    /// Rewrite `item` in place with a new content value
    pub fn replace_item(
        &self,
        item: &StoredItem,
        new_value: &str,
        now: i64,
    ) -> Result<SynthesizedStatement, ValidationError> {
        let text = format!(
            "INSERT OR REPLACE INTO {} (id, content, label, lang, timestamp) VALUES (?, ?, ?, ?, ?)",
            self.table()
        );
        self.validator.seal(
            text,
            vec![
                item.id.into(),
                new_value.into(),
                item.label.clone().unwrap_or_default().into(),
                item.language.as_str().into(),
                now.into(),
            ],
        )
    }

    /// First statement for any payload.
    ///
    /// DELETE yields the preview SELECT; UPDATE yields the target lookup.
    pub fn synthesize(
        &self,
        payload: &ExtractedPayload,
        language: &str,
        now: i64,
    ) -> Result<SynthesizedStatement, ValidationError> {
        match payload {
            ExtractedPayload::Save(data) => self.save(data, language, now),
            ExtractedPayload::Retrieve(query) => self.retrieve(query),
            ExtractedPayload::Delete(target) => self.preview_delete(target),
            ExtractedPayload::List(filter) => self.list(filter),
            ExtractedPayload::Update(spec) => self.find_update_target(spec),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::ValueKind;
    use crate::query::StatementKind;

    fn synth() -> QuerySynthesizer {
        QuerySynthesizer::new("mydata")
    }

    #[test]
    fn test_like_escaping() {
        assert_eq!(like_contains("email"), "%email%");
        assert_eq!(like_contains("100%_x\\"), "%100\\%\\_x\\\\%");
    }

    #[test]
    fn test_save_is_upsert_with_bound_values() {
        let data = SaveData::new(Some("email"), "a@b.io", ValueKind::Email).unwrap();
        let stmt = synth().save(&data, "en", 42).unwrap();
        assert!(stmt.is_safe);
        assert_eq!(stmt.kind, StatementKind::Insert);
        assert!(stmt.text.contains("ON CONFLICT(content, label)"));
        assert!(!stmt.text.contains("a@b.io"));
        assert_eq!(
            stmt.parameters,
            vec![
                SqlParam::from("a@b.io"),
                SqlParam::from("email"),
                SqlParam::from("en"),
                SqlParam::from(42i64)
            ]
        );
    }

    #[test]
    fn test_unlabelled_save_binds_empty_label() {
        let data = SaveData::new(None, "12345", ValueKind::Number).unwrap();
        let stmt = synth().save(&data, "de", 1).unwrap();
        assert_eq!(stmt.parameters[1], SqlParam::from(""));
    }

    #[test]
    fn test_retrieve_or_chain_and_limit() {
        let q = RetrieveQuery::new(["email", "mail"]).unwrap();
        let stmt = synth().retrieve(&q).unwrap();
        assert_eq!(stmt.kind, StatementKind::Select);
        assert_eq!(stmt.text.matches("LIKE ?").count(), 4);
        assert!(stmt.text.contains(") OR ("));
        assert!(stmt.text.ends_with("LIMIT 1"));
        assert_eq!(stmt.parameters.len(), 4);
        assert_eq!(stmt.parameters[0], SqlParam::from("%email%"));
    }

    #[test]
    fn test_list_all_has_no_filter() {
        let stmt = synth().list(&ListFilter::All).unwrap();
        assert!(!stmt.text.contains("WHERE"));
        assert!(!stmt.text.contains("LIMIT"));
        assert!(stmt.parameters.is_empty());

        let stmt = synth().list(&ListFilter::keyword("phone")).unwrap();
        assert!(stmt.text.contains("WHERE"));
        assert!(!stmt.text.contains("LIMIT"));
    }

    #[test]
    fn test_delete_variants() {
        let s = synth();
        let by_value = s.delete(&DeleteTarget::value("a@b.io").unwrap()).unwrap();
        assert_eq!(by_value.text, "DELETE FROM mydata WHERE content = ?");
        assert_eq!(by_value.parameters, vec![SqlParam::from("a@b.io")]);

        let by_label = s.delete(&DeleteTarget::label("email").unwrap()).unwrap();
        assert!(by_label.text.contains("label LIKE ?"));
        assert_eq!(by_label.parameters, vec![SqlParam::from("%email%")]);

        let all = s.delete(&DeleteTarget::All).unwrap();
        assert_eq!(all.text, "DELETE FROM mydata");

        let preview = s.preview_delete(&DeleteTarget::All).unwrap();
        assert_eq!(preview.kind, StatementKind::Select);
    }

    #[test]
    fn test_delete_ids() {
        let stmt = synth().delete_ids(&[3, 7]).unwrap();
        assert_eq!(stmt.text, "DELETE FROM mydata WHERE id IN (?, ?)");
        assert_eq!(stmt.parameters, vec![SqlParam::from(3i64), SqlParam::from(7i64)]);
    }

    #[test]
    fn test_replace_keeps_identity() {
        let item = StoredItem {
            id: 9,
            content: "old@x.io".to_string(),
            label: Some("email".to_string()),
            language: "en".to_string(),
            created_at: 1,
        };
        let stmt = synth().replace_item(&item, "new@x.io", 5).unwrap();
        assert_eq!(stmt.kind, StatementKind::Insert);
        assert_eq!(stmt.parameters[0], SqlParam::from(9i64));
        assert_eq!(stmt.parameters[1], SqlParam::from("new@x.io"));
        assert_eq!(stmt.parameters[2], SqlParam::from("email"));
    }

    #[test]
    fn test_hostile_values_stay_parameters() {
        let data = SaveData::new(
            Some("x'); DROP TABLE mydata; --"),
            "1; DELETE FROM mydata",
            ValueKind::Text,
        )
        .unwrap();
        let stmt = synth().save(&data, "en", 0).unwrap();
        assert!(stmt.is_safe);
        assert!(!stmt.text.contains("DROP"));
    }

    #[test]
    fn test_synthesize_dispatch() {
        let s = synth();
        let payload = ExtractedPayload::Delete(DeleteTarget::All);
        assert_eq!(s.synthesize(&payload, "en", 0).unwrap().kind, StatementKind::Select);
        let payload = ExtractedPayload::Update(UpdateSpec::new(Some("email"), Some("n@x.io")).unwrap());
        let stmt = s.synthesize(&payload, "en", 0).unwrap();
        assert!(stmt.text.ends_with("LIMIT 1"));
    }
}
