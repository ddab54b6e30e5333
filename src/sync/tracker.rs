use crate::api::ItemRef;
use crate::app::Result;
use crate::domain::{Item, MarkAction};
use crate::store::Store;

/// Local changes of one kind, shaped the way the upload endpoint wants them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingBatch {
    pub action: MarkAction,
    /// Ids of the items carried by this batch.
    pub item_ids: Vec<i64>,
    /// Feed and guid hash pairs for the star endpoints; empty for read marks.
    pub refs: Vec<ItemRef>,
    /// Star changes on items without a guid hash. The server cannot address
    /// them, so they are confirmed locally and dropped.
    pub unsendable: Vec<i64>,
}

impl PendingBatch {
    pub fn is_empty(&self) -> bool {
        self.item_ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.item_ids.len()
    }
}

/// Finds locally changed items that still have to be uploaded.
pub struct ChangeTracker<'a> {
    store: &'a dyn Store,
}

impl<'a> ChangeTracker<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    pub fn pending(&self, action: MarkAction) -> Result<Vec<Item>> {
        self.store.pending_changes(action)
    }

    pub fn has_pending(&self) -> Result<bool> {
        Ok(self.store.pending_change_count()? > 0)
    }

    pub fn batch(&self, action: MarkAction) -> Result<PendingBatch> {
        let items = self.pending(action)?;
        let mut batch = PendingBatch {
            action,
            item_ids: Vec::with_capacity(items.len()),
            refs: Vec::new(),
            unsendable: Vec::new(),
        };

        match action {
            MarkAction::MarkRead | MarkAction::MarkUnread => {
                batch.item_ids.extend(items.iter().map(|item| item.id));
            }
            MarkAction::MarkStarred | MarkAction::MarkUnstarred => {
                for item in items {
                    match item.guid_hash {
                        Some(guid_hash) => {
                            batch.item_ids.push(item.id);
                            batch.refs.push(ItemRef {
                                feed_id: item.feed_id,
                                guid_hash,
                            });
                        }
                        None => {
                            tracing::warn!(
                                "Item {} has no guid hash and cannot be {} on the server",
                                item.id,
                                match action {
                                    MarkAction::MarkStarred => "starred",
                                    _ => "unstarred",
                                }
                            );
                            batch.unsendable.push(item.id);
                        }
                    }
                }
            }
        }
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::item_payload;
    use crate::store::SqliteStore;

    fn store() -> SqliteStore {
        let store = SqliteStore::in_memory().unwrap();
        let mut without_hash = item_payload(3, 2, 1);
        without_hash.guid_hash = None;
        store
            .upsert_items(&[
                item_payload(1, 1, 1).finalize().unwrap(),
                item_payload(2, 1, 1).finalize().unwrap(),
                without_hash.finalize().unwrap(),
            ])
            .unwrap();
        store
    }

    #[test]
    fn test_nothing_pending() {
        let store = store();
        let tracker = ChangeTracker::new(&store);
        for action in MarkAction::ALL {
            assert!(tracker.pending(action).unwrap().is_empty());
            assert!(tracker.batch(action).unwrap().is_empty());
        }
        assert!(!tracker.has_pending().unwrap());
    }

    #[test]
    fn test_read_batch_carries_ids() {
        let store = store();
        store.set_items_unread(&[1, 2], false).unwrap();

        let batch = ChangeTracker::new(&store)
            .batch(MarkAction::MarkRead)
            .unwrap();
        assert_eq!(batch.item_ids, vec![1, 2]);
        assert!(batch.refs.is_empty());
    }

    #[test]
    fn test_star_batch_carries_refs() {
        let store = store();
        store.set_items_starred(&[2, 3], true).unwrap();

        let tracker = ChangeTracker::new(&store);
        assert!(tracker.has_pending().unwrap());
        let batch = tracker.batch(MarkAction::MarkStarred).unwrap();
        assert_eq!(batch.item_ids, vec![2]);
        assert_eq!(
            batch.refs,
            vec![ItemRef {
                feed_id: 1,
                guid_hash: "hash-2".into()
            }]
        );
        assert_eq!(batch.unsendable, vec![3]);
        assert_eq!(tracker.pending(MarkAction::MarkStarred).unwrap().len(), 2);
    }
}
