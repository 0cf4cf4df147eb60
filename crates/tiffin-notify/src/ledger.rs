//! In-session notification ledger: a capped, newest-first collection of
//! order notifications plus the derived unread count. Records are created
//! here and nowhere else; every mutation leaves
//! `unread == |{r : !r.read}|` holding before it returns.

use std::collections::VecDeque;

use tiffin_wire::{OrderEvent, OrderEventKind};

/// Most records retained; the oldest is evicted once the cap is reached.
pub const LEDGER_CAPACITY: usize = 50;

const DEFAULT_MESSAGE: &str = "Order update received";

#[derive(Debug, Clone, PartialEq)]
pub struct NotificationRecord {
    /// Unique per receipt, even for repeated order ids.
    pub id: String,
    pub order_id: i64,
    pub order_number: Option<String>,
    pub kind: OrderEventKind,
    pub new_status: Option<String>,
    pub message: String,
    /// ISO 8601; defaulted to receipt time when the event carries none.
    pub timestamp: String,
    pub read: bool,
}

#[derive(Debug, Default)]
pub struct NotificationLedger {
    records: VecDeque<NotificationRecord>,
    unread: usize,
    receipt_seq: u64,
}

impl NotificationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold an event into a record, newest first. Returns the record for
    /// downstream dispatch.
    pub fn insert(&mut self, event: OrderEvent) -> NotificationRecord {
        self.receipt_seq += 1;
        let record = NotificationRecord {
            id: format!("{}-{}", event.order_id, self.receipt_seq),
            order_id: event.order_id,
            order_number: event.order_number,
            kind: event.kind,
            new_status: event.new_status,
            message: event.message.unwrap_or_else(|| DEFAULT_MESSAGE.to_string()),
            timestamp: event
                .timestamp
                .unwrap_or_else(|| chrono::Utc::now().to_rfc3339()),
            read: false,
        };
        self.records.push_front(record.clone());
        if self.records.len() > LEDGER_CAPACITY {
            // An evicted unread record leaves the unread population too.
            if let Some(evicted) = self.records.pop_back() {
                if !evicted.read {
                    self.unread -= 1;
                }
            }
        }
        self.unread += 1;
        record
    }

    /// Mark one record read. Returns whether anything changed; already-read
    /// records and unknown ids are a no-op, so the count never
    /// double-decrements.
    pub fn mark_read(&mut self, id: &str) -> bool {
        if let Some(record) = self.records.iter_mut().find(|r| r.id == id) {
            if !record.read {
                record.read = true;
                self.unread -= 1;
                return true;
            }
        }
        false
    }

    pub fn mark_all_read(&mut self) {
        for record in &mut self.records {
            record.read = true;
        }
        self.unread = 0;
    }

    /// Delete one record. The unread count drops only if it was unread.
    pub fn remove(&mut self, id: &str) -> bool {
        if let Some(pos) = self.records.iter().position(|r| r.id == id) {
            if let Some(record) = self.records.remove(pos) {
                if !record.read {
                    self.unread -= 1;
                }
                return true;
            }
        }
        false
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.unread = 0;
    }

    pub fn unread_count(&self) -> usize {
        self.unread
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records newest first.
    pub fn records(&self) -> impl Iterator<Item = &NotificationRecord> {
        self.records.iter()
    }

    pub fn snapshot(&self) -> Vec<NotificationRecord> {
        self.records.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(order_id: i64) -> OrderEvent {
        OrderEvent {
            kind: OrderEventKind::NewOrder,
            order_id,
            order_number: Some(format!("A-{order_id}")),
            new_status: None,
            message: Some("Order placed".into()),
            timestamp: None,
        }
    }

    fn invariant_holds(ledger: &NotificationLedger) -> bool {
        ledger.unread_count() == ledger.records().filter(|r| !r.read).count()
    }

    #[test]
    fn insert_builds_an_unread_record() {
        let mut ledger = NotificationLedger::new();
        let record = ledger.insert(OrderEvent {
            kind: OrderEventKind::NewOrder,
            order_id: 7,
            order_number: Some("A-7".into()),
            new_status: None,
            message: Some("Order placed".into()),
            timestamp: None,
        });
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.unread_count(), 1);
        assert!(!record.read);
        assert_eq!(record.order_id, 7);
        assert_eq!(record.message, "Order placed");
        // Timestamp was defaulted to receipt time.
        assert!(!record.timestamp.is_empty());
        assert!(invariant_holds(&ledger));
    }

    #[test]
    fn ids_are_unique_for_duplicate_order_ids() {
        let mut ledger = NotificationLedger::new();
        let a = ledger.insert(event(7));
        let b = ledger.insert(event(7));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn missing_message_gets_the_generic_text() {
        let mut ledger = NotificationLedger::new();
        let record = ledger.insert(OrderEvent {
            kind: OrderEventKind::Other,
            order_id: 1,
            order_number: None,
            new_status: None,
            message: None,
            timestamp: None,
        });
        assert_eq!(record.message, "Order update received");
    }

    #[test]
    fn provided_timestamp_is_kept() {
        let mut ledger = NotificationLedger::new();
        let record = ledger.insert(OrderEvent {
            timestamp: Some("2026-08-06T10:15:00".into()),
            ..event(3)
        });
        assert_eq!(record.timestamp, "2026-08-06T10:15:00");
    }

    #[test]
    fn capacity_evicts_the_oldest() {
        let mut ledger = NotificationLedger::new();
        for i in 0..51 {
            ledger.insert(event(i));
        }
        assert_eq!(ledger.len(), 50);
        // Newest first; order 0 fell off the back.
        let ids: Vec<i64> = ledger.records().map(|r| r.order_id).collect();
        assert_eq!(ids[0], 50);
        assert_eq!(*ids.last().unwrap(), 1);
        assert!(invariant_holds(&ledger));
    }

    #[test]
    fn evicting_an_unread_record_keeps_the_count_honest() {
        let mut ledger = NotificationLedger::new();
        for i in 0..50 {
            ledger.insert(event(i));
        }
        assert_eq!(ledger.unread_count(), 50);
        ledger.insert(event(99));
        assert_eq!(ledger.len(), 50);
        assert_eq!(ledger.unread_count(), 50);
        assert!(invariant_holds(&ledger));
    }

    #[test]
    fn evicting_a_read_record_does_not_decrement() {
        let mut ledger = NotificationLedger::new();
        let first = ledger.insert(event(0));
        for i in 1..50 {
            ledger.insert(event(i));
        }
        ledger.mark_read(&first.id);
        assert_eq!(ledger.unread_count(), 49);
        ledger.insert(event(99));
        assert_eq!(ledger.unread_count(), 50);
        assert!(invariant_holds(&ledger));
    }

    #[test]
    fn mark_read_decrements_at_most_once() {
        let mut ledger = NotificationLedger::new();
        let record = ledger.insert(event(1));
        ledger.insert(event(2));
        assert!(ledger.mark_read(&record.id));
        assert!(!ledger.mark_read(&record.id));
        assert_eq!(ledger.unread_count(), 1);
        assert!(!ledger.mark_read("unknown-id"));
        assert_eq!(ledger.unread_count(), 1);
        assert!(invariant_holds(&ledger));
    }

    #[test]
    fn mark_all_read_zeroes_the_count() {
        let mut ledger = NotificationLedger::new();
        let mut ids = Vec::new();
        for i in 0..7 {
            ids.push(ledger.insert(event(i)).id);
        }
        ledger.mark_read(&ids[0]);
        ledger.mark_read(&ids[1]);
        assert_eq!(ledger.unread_count(), 5);
        ledger.mark_all_read();
        assert_eq!(ledger.unread_count(), 0);
        assert!(ledger.records().all(|r| r.read));
        assert!(invariant_holds(&ledger));
    }

    #[test]
    fn remove_decrements_only_for_unread() {
        let mut ledger = NotificationLedger::new();
        let unread = ledger.insert(event(1));
        let read = ledger.insert(event(2));
        ledger.mark_read(&read.id);
        assert_eq!(ledger.unread_count(), 1);

        assert!(ledger.remove(&read.id));
        assert_eq!(ledger.unread_count(), 1);

        assert!(ledger.remove(&unread.id));
        assert_eq!(ledger.unread_count(), 0);

        assert!(!ledger.remove(&unread.id));
        assert!(invariant_holds(&ledger));
    }

    #[test]
    fn clear_empties_everything() {
        let mut ledger = NotificationLedger::new();
        for i in 0..5 {
            ledger.insert(event(i));
        }
        ledger.clear();
        assert!(ledger.is_empty());
        assert_eq!(ledger.unread_count(), 0);
    }

    #[test]
    fn invariant_survives_a_mixed_operation_sequence() {
        let mut ledger = NotificationLedger::new();
        let mut ids = Vec::new();
        for i in 0..60 {
            ids.push(ledger.insert(event(i)).id);
            if i % 3 == 0 {
                ledger.mark_read(&ids[ids.len() - 1]);
            }
            if i % 7 == 0 && ids.len() > 2 {
                ledger.remove(&ids[ids.len() - 2]);
            }
            assert!(invariant_holds(&ledger), "broken after insert {i}");
        }
        ledger.mark_all_read();
        assert!(invariant_holds(&ledger));
        ledger.clear();
        assert!(invariant_holds(&ledger));
    }
}
