//! Per-page transactional relabeling.

use tracing::debug;

use crate::bail;
use crate::error::{ErrorKind, RelabelResult};
#[cfg(feature = "failpoints")]
use crate::failpoints::{MUTATE_PAGE__BEFORE_COMMIT, relabel_fail_point};
use crate::store::base::{RecordStore, StoreTransaction};
use crate::types::{Page, Record, RecordId, USERNAME_ATTRIBUTE};

/// Tag changes derived from a single record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagChange {
    pub record_id: RecordId,
    pub add: String,
    pub remove: String,
}

/// Computes the relabel of `record`: its first tag `T` is replaced by `T_{username}`.
///
/// Only the first tag is considered, other tags are left untouched. Running this on an
/// already relabeled record compounds the suffix (`T_u` becomes `T_u_u`).
pub fn plan_relabel(record: &Record) -> RelabelResult<TagChange> {
    let Some(original) = record.first_tag() else {
        bail!(
            ErrorKind::MissingTag,
            "Record has no tags",
            format!("record {} has no tags", record.id)
        );
    };

    let Some(username) = record.render_attribute(USERNAME_ATTRIBUTE) else {
        bail!(
            ErrorKind::MissingAttribute,
            "Record is missing an attribute",
            format!("record {} has no `{USERNAME_ATTRIBUTE}` attribute", record.id)
        );
    };

    Ok(TagChange {
        record_id: record.id,
        add: format!("{original}_{username}"),
        remove: original.to_owned(),
    })
}

/// Applies the relabel to every record of a page inside one store transaction.
#[derive(Debug, Clone)]
pub struct PageMutator<S> {
    store: S,
}

impl<S> PageMutator<S>
where
    S: RecordStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Relabels every record of `page` and commits, returning the number of records changed.
    ///
    /// The first failing record aborts the page: the transaction is dropped, which rolls back
    /// every change of the page, and the error is returned.
    pub async fn mutate(&self, page: &Page) -> RelabelResult<usize> {
        let mut transaction = self.store.begin().await?;

        for record in &page.records {
            let change = plan_relabel(record)?;

            transaction.add_tag(change.record_id, &change.add).await?;
            transaction
                .remove_tag(change.record_id, &change.remove)
                .await?;

            debug!(record_id = %record.id, tag = %change.add, "relabeled record");
        }

        #[cfg(feature = "failpoints")]
        relabel_fail_point(MUTATE_PAGE__BEFORE_COMMIT)?;

        transaction.commit().await?;

        Ok(page.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn person(id: i64, username: &str) -> Record {
        Record::new(RecordId(id))
            .with_tag("Person")
            .with_attribute("username", username)
    }

    #[test]
    fn plans_first_tag_with_username_suffix() {
        let change = plan_relabel(&person(1, "person_3")).unwrap();

        assert_eq!(change.add, "Person_person_3");
        assert_eq!(change.remove, "Person");
    }

    #[test]
    fn plan_only_considers_the_first_tag() {
        let record = person(1, "u").with_tag("Employee");
        let change = plan_relabel(&record).unwrap();

        assert_eq!(change.add, "Person_u");
        assert_eq!(change.remove, "Person");
    }

    #[test]
    fn plan_compounds_an_existing_suffix() {
        let record = Record::new(RecordId(1))
            .with_tag("Person_u")
            .with_attribute("username", "u");

        assert_eq!(plan_relabel(&record).unwrap().add, "Person_u_u");
    }

    #[test]
    fn plan_rejects_records_without_tags_or_username() {
        let untagged = Record::new(RecordId(1)).with_attribute("username", "u");
        assert_eq!(
            plan_relabel(&untagged).unwrap_err().kind(),
            ErrorKind::MissingTag
        );

        let anonymous = Record::new(RecordId(2)).with_tag("Person");
        assert_eq!(
            plan_relabel(&anonymous).unwrap_err().kind(),
            ErrorKind::MissingAttribute
        );

        let null_username = anonymous.with_attribute("username", json!(null));
        assert_eq!(
            plan_relabel(&null_username).unwrap_err().kind(),
            ErrorKind::MissingAttribute
        );
    }

    async fn insert_person(store: &MemoryStore, username: Option<&str>) -> Record {
        let mut attributes = BTreeMap::new();
        if let Some(username) = username {
            attributes.insert("username".to_owned(), json!(username));
        }

        let id = store.insert(vec!["Person".to_owned()], attributes).await;
        store.get(id).await.unwrap()
    }

    #[tokio::test]
    async fn mutate_commits_the_whole_page() {
        let store = MemoryStore::new();
        let records = vec![
            insert_person(&store, Some("a")).await,
            insert_person(&store, Some("b")).await,
        ];

        let mutator = PageMutator::new(store.clone());
        let relabeled = mutator.mutate(&Page::new(0, records)).await.unwrap();

        assert_eq!(relabeled, 2);
        assert_eq!(store.tag_counts().await.get("Person_a"), Some(&1));
        assert_eq!(store.tag_counts().await.get("Person_b"), Some(&1));
        assert_eq!(store.tag_counts().await.get("Person"), None);
        assert_eq!(store.commits(), 1);
    }

    #[tokio::test]
    async fn mutate_rolls_back_the_page_on_a_bad_record() {
        let store = MemoryStore::new();
        let records = vec![
            insert_person(&store, Some("a")).await,
            insert_person(&store, None).await,
        ];

        let mutator = PageMutator::new(store.clone());
        let err = mutator.mutate(&Page::new(0, records)).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::MissingAttribute);
        assert_eq!(store.tag_counts().await.get("Person"), Some(&2));
        assert_eq!(store.commits(), 0);
        assert_eq!(store.rollbacks(), 1);
    }
}
