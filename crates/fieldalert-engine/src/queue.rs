//! The shared pending-alert queue.
//!
//! One ordered, key-deduplicated sequence holds the pending alerts of both
//! kinds. Kind priority is part of the sort key, so every SOS item sorts ahead
//! of every LongStop item and the head is always the alert that deserves the
//! dialog slot. Within a kind, items are ordered by `alert_time` in the
//! configured direction.
//!
//! The queue is owned by the engine's main context; pollers never touch it
//! directly but hand their results over for [`AlertQueue::merge_kind`].

use std::cmp::Ordering;
use std::collections::{HashSet, VecDeque};

use fieldalert_config::SortDirection;
use fieldalert_core::{AlertItem, AlertKind, DedupKey};

/// Result of merging one kind's poll into the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The fetch did not grow the kind's backlog; nothing changed.
    Unchanged { queued: usize, fetched: usize },
    /// The kind's portion was replaced.
    Replaced { previous: usize, current: usize },
}

impl MergeOutcome {
    /// Whether the merge should trigger a dispatch.
    pub fn grew(&self) -> bool {
        matches!(self, MergeOutcome::Replaced { .. })
    }
}

/// Ordered, identifier-deduplicating alert queue.
#[derive(Debug, Clone)]
pub struct AlertQueue {
    items: VecDeque<AlertItem>,
    keys: HashSet<DedupKey>,
    order: SortDirection,
}

impl Default for AlertQueue {
    fn default() -> Self {
        Self::new(SortDirection::Ascending)
    }
}

impl AlertQueue {
    /// Create an empty queue.
    pub fn new(order: SortDirection) -> Self {
        Self {
            items: VecDeque::new(),
            keys: HashSet::new(),
            order,
        }
    }

    fn compare(order: SortDirection, a: &AlertItem, b: &AlertItem) -> Ordering {
        a.kind.rank().cmp(&b.kind.rank()).then_with(|| match order {
            SortDirection::Ascending => a.alert_time.cmp(&b.alert_time),
            SortDirection::Descending => b.alert_time.cmp(&a.alert_time),
        })
    }

    /// Insert `item` unless its key is already queued.
    ///
    /// The existing entry wins; returns whether the item was inserted. New
    /// items go after any equal-ordered entries.
    pub fn offer(&mut self, item: AlertItem) -> bool {
        let key = item.key();
        if self.keys.contains(&key) {
            return false;
        }
        let order = self.order;
        let at = self
            .items
            .partition_point(|queued| Self::compare(order, queued, &item) != Ordering::Greater);
        self.items.insert(at, item);
        self.keys.insert(key);
        true
    }

    /// The head without removing it.
    pub fn peek(&self) -> Option<&AlertItem> {
        self.items.front()
    }

    /// Remove and return the head.
    pub fn poll(&mut self) -> Option<AlertItem> {
        let item = self.items.pop_front()?;
        self.keys.remove(&item.key());
        Some(item)
    }

    /// Remove a specific item wherever it sits.
    pub fn remove(&mut self, key: &DedupKey) -> Option<AlertItem> {
        if !self.keys.remove(key) {
            return None;
        }
        let at = self.items.iter().position(|item| item.kind == key.kind && item.file() == key.file)?;
        self.items.remove(at)
    }

    /// Clear and refill the queue in one step.
    ///
    /// Items are sorted into queue order (stable, so equal-ordered items keep
    /// their relative order) and deduplicated with first-wins semantics.
    pub fn replace_all(&mut self, items: impl IntoIterator<Item = AlertItem>) {
        let mut items: Vec<AlertItem> = items.into_iter().collect();
        let order = self.order;
        items.sort_by(|a, b| Self::compare(order, a, b));

        self.items.clear();
        self.keys.clear();
        for item in items {
            let key = item.key();
            if self.keys.insert(key) {
                self.items.push_back(item);
            }
        }
    }

    /// Number of items matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&AlertItem) -> bool) -> usize {
        self.items.iter().filter(|item| predicate(item)).count()
    }

    /// Number of queued items of one kind.
    pub fn count_kind(&self, kind: AlertKind) -> usize {
        self.count(|item| item.kind == kind)
    }

    /// Merge a fresh, acknowledgement-filtered fetch of `kind`.
    ///
    /// Only a fetch that yields more items than are currently queued for the
    /// kind changes anything: the kind's portion is then replaced by the fetch
    /// and every item of the other kind is carried over untouched.
    pub fn merge_kind(&mut self, kind: AlertKind, fetched: Vec<AlertItem>) -> MergeOutcome {
        let mut seen = HashSet::new();
        let fresh: Vec<AlertItem> = fetched
            .into_iter()
            .filter(|item| item.kind == kind && seen.insert(item.key()))
            .collect();

        let queued = self.count_kind(kind);
        if fresh.len() <= queued {
            return MergeOutcome::Unchanged {
                queued,
                fetched: fresh.len(),
            };
        }

        let current = fresh.len();
        let remain: Vec<AlertItem> = self.items.iter().filter(|item| item.kind != kind).cloned().collect();
        self.replace_all(remain.into_iter().chain(fresh));

        MergeOutcome::Replaced {
            previous: queued,
            current,
        }
    }

    pub fn contains(&self, key: &DedupKey) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items in queue order.
    pub fn iter(&self) -> impl Iterator<Item = &AlertItem> {
        self.items.iter()
    }

    /// Drop every item (teardown only).
    pub fn clear(&mut self) {
        self.items.clear();
        self.keys.clear();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use fieldalert_core::AlertRecord;

    pub(crate) fn item(kind: AlertKind, file: &str, time: &str) -> AlertItem {
        item_named(kind, file, time, "Sato")
    }

    pub(crate) fn item_named(kind: AlertKind, file: &str, time: &str, operator: &str) -> AlertItem {
        let record = AlertRecord {
            file_identifier: file.to_string(),
            occurrence_time: time.to_string(),
            start_time: time.to_string(),
            operator_name: operator.to_string(),
            department_code: "02".to_string(),
            department_name: "Delivery".to_string(),
            team_code: "03".to_string(),
            team_name: "North".to_string(),
        };
        AlertItem::from_record(kind, record).unwrap()
    }

    fn files(queue: &AlertQueue) -> Vec<&str> {
        queue.iter().map(|i| i.file()).collect()
    }

    #[test]
    fn test_offer_dedups_first_wins() {
        let mut queue = AlertQueue::default();
        assert!(queue.offer(item_named(AlertKind::Sos, "a", "202401011200", "first")));
        assert!(!queue.offer(item_named(AlertKind::Sos, "a", "202401011100", "second")));
        assert!(queue.offer(item(AlertKind::LongStop, "a", "202401011200")));

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.peek().unwrap().payload.operator_name, "first");
    }

    #[test]
    fn test_offer_keeps_dedup_under_repeats() {
        let mut queue = AlertQueue::default();
        for round in 0..3 {
            for file in ["a", "b", "a", "c", "b"] {
                queue.offer(item(AlertKind::Sos, file, &format!("20240101120{round}")));
            }
        }
        let keys: HashSet<_> = queue.iter().map(|i| i.key()).collect();
        assert_eq!(keys.len(), queue.len());
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_sos_sorts_ahead_of_long_stop() {
        let mut queue = AlertQueue::default();
        queue.offer(item(AlertKind::LongStop, "old-stop", "202401010800"));
        queue.offer(item(AlertKind::Sos, "late-sos", "202401011800"));

        assert_eq!(queue.peek().unwrap().kind, AlertKind::Sos);
    }

    #[test]
    fn test_replace_all_orders_ascending() {
        let mut queue = AlertQueue::new(SortDirection::Ascending);
        queue.replace_all(vec![
            item(AlertKind::LongStop, "l2", "202401011300"),
            item(AlertKind::Sos, "s2", "202401011000"),
            item(AlertKind::LongStop, "l1", "202401011100"),
            item(AlertKind::Sos, "s1", "202401010900"),
        ]);
        assert_eq!(files(&queue), vec!["s1", "s2", "l1", "l2"]);
    }

    #[test]
    fn test_replace_all_orders_descending() {
        let mut queue = AlertQueue::new(SortDirection::Descending);
        queue.replace_all(vec![
            item(AlertKind::LongStop, "l1", "202401011100"),
            item(AlertKind::LongStop, "l2", "202401011300"),
            item(AlertKind::Sos, "s1", "202401010900"),
        ]);
        assert_eq!(files(&queue), vec!["s1", "l2", "l1"]);
    }

    #[test]
    fn test_poll_and_remove() {
        let mut queue = AlertQueue::default();
        queue.offer(item(AlertKind::Sos, "s1", "202401010900"));
        queue.offer(item(AlertKind::LongStop, "l1", "202401011100"));
        queue.offer(item(AlertKind::LongStop, "l2", "202401011200"));

        let key = item(AlertKind::LongStop, "l1", "202401011100").key();
        assert!(queue.remove(&key).is_some());
        assert!(!queue.contains(&key));
        assert!(queue.remove(&key).is_none());

        assert_eq!(queue.poll().unwrap().file(), "s1");
        assert_eq!(queue.poll().unwrap().file(), "l2");
        assert!(queue.poll().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_merge_requires_growth() {
        let mut queue = AlertQueue::default();
        queue.offer(item(AlertKind::Sos, "s1", "202401010900"));
        queue.offer(item(AlertKind::Sos, "s2", "202401011000"));

        let outcome = queue.merge_kind(
            AlertKind::Sos,
            vec![
                item(AlertKind::Sos, "s3", "202401011100"),
                item(AlertKind::Sos, "s3", "202401011100"),
            ],
        );
        assert_eq!(outcome, MergeOutcome::Unchanged { queued: 2, fetched: 1 });
        assert!(!outcome.grew());
        assert_eq!(files(&queue), vec!["s1", "s2"]);
    }

    #[test]
    fn test_merge_from_empty() {
        let mut queue = AlertQueue::default();
        let outcome = queue.merge_kind(AlertKind::Sos, vec![item(AlertKind::Sos, "s1", "202401010900")]);
        assert_eq!(outcome, MergeOutcome::Replaced { previous: 0, current: 1 });
        assert!(outcome.grew());
    }

    #[test]
    fn test_merge_keeps_other_kind_untouched() {
        let mut queue = AlertQueue::default();
        queue.replace_all(vec![
            item(AlertKind::LongStop, "l1", "202401011100"),
            item(AlertKind::LongStop, "l2", "202401011100"),
            item(AlertKind::LongStop, "l3", "202401011000"),
            item(AlertKind::Sos, "s-old", "202401010700"),
        ]);
        let before: Vec<String> = queue
            .iter()
            .filter(|i| i.kind == AlertKind::LongStop)
            .map(|i| i.file().to_string())
            .collect();

        queue.merge_kind(
            AlertKind::Sos,
            vec![
                item(AlertKind::Sos, "s-new", "202401011500"),
                item(AlertKind::Sos, "s-mid", "202401011200"),
            ],
        );

        let after: Vec<String> = queue
            .iter()
            .filter(|i| i.kind == AlertKind::LongStop)
            .map(|i| i.file().to_string())
            .collect();
        assert_eq!(before, after);
        assert_eq!(before, vec!["l3", "l1", "l2"]);
        assert_eq!(files(&queue)[..2], ["s-mid", "s-new"]);
        assert_eq!(queue.count_kind(AlertKind::Sos), 2);
    }

    #[test]
    fn test_merge_ignores_items_of_other_kind() {
        let mut queue = AlertQueue::default();
        let outcome = queue.merge_kind(
            AlertKind::LongStop,
            vec![
                item(AlertKind::Sos, "stray", "202401010900"),
                item(AlertKind::LongStop, "l1", "202401011000"),
            ],
        );
        assert_eq!(outcome, MergeOutcome::Replaced { previous: 0, current: 1 });
        assert_eq!(files(&queue), vec!["l1"]);
    }
}
