use driftwood_proto::ReplicatedPayload;

/// One snapshot waiting for the next flush.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedItem {
    pub seq: u64,
    pub data: ReplicatedPayload,
}

/// The outcome of picking a winner among the queued snapshots.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub winner: ReplicatedPayload,
    /// Every item with `seq <= through_seq` was considered; later arrivals were not.
    pub through_seq: u64,
    /// Items considered but not chosen.
    pub discarded: usize,
}

/// In-memory write-coalescing queue. Lost with the process; foreground
/// instances re-push anything unflushed after a restart.
#[derive(Debug, Default)]
pub struct SyncQueue {
    items: Vec<QueuedItem>,
    next_seq: u64,
}

impl SyncQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, data: ReplicatedPayload) -> u64 {
        self.next_seq += 1;
        let seq = self.next_seq;
        self.items.push(QueuedItem { seq, data });
        seq
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Picks the snapshot with the largest `last_update`, not the latest
    /// arrival. Equal stamps resolve to the later arrival.
    pub fn select(&self) -> Option<Selection> {
        let winner = self
            .items
            .iter()
            .max_by(|a, b| {
                a.data
                    .last_update
                    .cmp(&b.data.last_update)
                    .then(a.seq.cmp(&b.seq))
            })?;
        let through_seq = self.items.iter().map(|item| item.seq).max()?;
        Some(Selection {
            winner: winner.data.clone(),
            through_seq,
            discarded: self.items.len() - 1,
        })
    }

    /// Removes what a flush consumed, keeping anything that arrived after the
    /// selection was made. Returns how many items were removed.
    pub fn drain_through(&mut self, through_seq: u64) -> usize {
        let before = self.items.len();
        self.items.retain(|item| item.seq > through_seq);
        before - self.items.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftwood_proto::Settings;

    fn snapshot(color: &str, last_update: i64) -> ReplicatedPayload {
        let mut settings = Settings::default();
        settings.primary_color = color.into();
        ReplicatedPayload::new(settings, vec![], last_update)
    }

    #[test]
    fn empty_queue_selects_nothing() {
        assert!(SyncQueue::new().select().is_none());
    }

    #[test]
    fn largest_last_update_wins_over_arrival_order() {
        let mut queue = SyncQueue::new();
        queue.push(snapshot("#newest", 300));
        queue.push(snapshot("#oldest", 100));
        queue.push(snapshot("#middle", 200));
        let selection = queue.select().unwrap();
        assert_eq!(selection.winner.settings.primary_color, "#newest");
        assert_eq!(selection.discarded, 2);
        assert_eq!(selection.through_seq, 3);
    }

    #[test]
    fn equal_stamps_prefer_later_arrival() {
        let mut queue = SyncQueue::new();
        queue.push(snapshot("#first", 100));
        queue.push(snapshot("#second", 100));
        assert_eq!(
            queue.select().unwrap().winner.settings.primary_color,
            "#second"
        );
    }

    #[test]
    fn late_arrivals_survive_the_drain() {
        let mut queue = SyncQueue::new();
        queue.push(snapshot("#a", 1));
        queue.push(snapshot("#b", 2));
        let selection = queue.select().unwrap();
        queue.push(snapshot("#late", 3));
        assert_eq!(queue.drain_through(selection.through_seq), 2);
        assert_eq!(queue.len(), 1);
        assert_eq!(
            queue.select().unwrap().winner.settings.primary_color,
            "#late"
        );
    }
}
