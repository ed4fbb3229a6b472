use std::collections::{HashSet, VecDeque};

use crate::models::ChangeRecord;

/// In-memory view of changes awaiting delivery.
///
/// Each change is taken off the queue before it is sent and put back only if
/// the send fails, so a change is never attempted twice within one drain.
#[derive(Debug, Default)]
pub struct PendingQueue {
    changes: VecDeque<ChangeRecord>,
    queued: HashSet<String>,
}

impl PendingQueue {
    /// Append records not already queued, keeping their order.
    pub fn refill(&mut self, records: Vec<ChangeRecord>) -> usize {
        let mut added = 0;
        for record in records {
            if self.queued.insert(record.id.clone()) {
                self.changes.push_back(record);
                added += 1;
            }
        }
        added
    }

    pub fn pop(&mut self) -> Option<ChangeRecord> {
        let record = self.changes.pop_front()?;
        self.queued.remove(&record.id);
        Some(record)
    }

    /// Return a failed change to the head of the queue.
    pub fn restore(&mut self, record: ChangeRecord) {
        if self.queued.insert(record.id.clone()) {
            self.changes.push_front(record);
        }
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChangeStatus, ChangeType, EntityKind};

    fn change(id: &str) -> ChangeRecord {
        ChangeRecord {
            id: id.to_string(),
            change_type: ChangeType::Delete,
            entity: EntityKind::Project,
            entity_id: "P1".to_string(),
            data: None,
            timestamp: 1,
            user_id: "alice".to_string(),
            status: ChangeStatus::Pending,
        }
    }

    #[test]
    fn refill_skips_queued_ids() {
        let mut queue = PendingQueue::default();
        assert_eq!(queue.refill(vec![change("a"), change("b")]), 2);
        assert_eq!(queue.refill(vec![change("b"), change("c")]), 1);
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn restore_puts_change_back_in_front_once() {
        let mut queue = PendingQueue::default();
        queue.refill(vec![change("a"), change("b")]);

        let first = queue.pop().unwrap();
        queue.restore(first.clone());
        queue.restore(first);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop().unwrap().id, "a");
        assert_eq!(queue.pop().unwrap().id, "b");
        assert!(queue.is_empty());
    }
}
