//! Redis Cluster slot routing: CRC16 key hashing, hash-tag extraction, and
//! the sorted slot-range table used to pick a server for a key.

pub const SLOT_COUNT: u16 = 16384;

/// One contiguous, half-open range of slots served by a master (and its
/// replicas, which this write-only client never reads from).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotRange {
    pub start: u16,
    pub end: u16,
    pub master: String,
    pub replicas: Vec<String>,
}

/// The full, sorted set of ranges covering `[0, SLOT_COUNT)`.
#[derive(Debug, Clone, Default)]
pub struct SlotMap {
    ranges: Vec<SlotRange>,
}

impl SlotMap {
    pub fn new(mut ranges: Vec<SlotRange>) -> Self {
        ranges.sort_by_key(|r| r.start);
        Self { ranges }
    }

    /// A standalone (non-clustered) backend is modeled as a single range
    /// covering every slot, routed to `control`.
    pub fn single_range(control: String) -> Self {
        Self {
            ranges: vec![SlotRange {
                start: 0,
                end: SLOT_COUNT - 1,
                master: control,
                replicas: Vec::new(),
            }],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Look up the master serving `slot`, via binary search over the sorted
    /// range table.
    pub fn master_for_slot(&self, slot: u16) -> Option<&str> {
        self.find(slot).map(|r| r.master.as_str())
    }

    fn find(&self, slot: u16) -> Option<&SlotRange> {
        self.ranges
            .binary_search_by(|r| {
                if slot < r.start {
                    std::cmp::Ordering::Greater
                } else if slot > r.end {
                    std::cmp::Ordering::Less
                } else {
                    std::cmp::Ordering::Equal
                }
            })
            .ok()
            .map(|idx| &self.ranges[idx])
    }

    /// Apply a `MOVED` redirect by repointing (or inserting) the range that
    /// covers `slot` so it now targets `new_master`.
    pub fn apply_moved(&mut self, slot: u16, new_master: String) {
        if let Some(pos) = self
            .ranges
            .iter()
            .position(|r| slot >= r.start && slot <= r.end)
        {
            if self.ranges[pos].start == self.ranges[pos].end {
                self.ranges[pos].master = new_master;
            } else if slot == self.ranges[pos].start {
                self.ranges[pos].start += 1;
                self.ranges.insert(
                    pos,
                    SlotRange {
                        start: slot,
                        end: slot,
                        master: new_master,
                        replicas: Vec::new(),
                    },
                );
            } else if slot == self.ranges[pos].end {
                self.ranges[pos].end -= 1;
                self.ranges.insert(
                    pos + 1,
                    SlotRange {
                        start: slot,
                        end: slot,
                        master: new_master,
                        replicas: Vec::new(),
                    },
                );
            } else {
                let tail_start = self.ranges[pos].start;
                let tail_master = self.ranges[pos].master.clone();
                let tail_replicas = self.ranges[pos].replicas.clone();
                let old_end = self.ranges[pos].end;
                self.ranges[pos].end = slot - 1;
                self.ranges.insert(
                    pos + 1,
                    SlotRange {
                        start: slot,
                        end: slot,
                        master: new_master,
                        replicas: Vec::new(),
                    },
                );
                self.ranges.insert(
                    pos + 2,
                    SlotRange {
                        start: slot + 1,
                        end: old_end,
                        master: tail_master,
                        replicas: tail_replicas,
                    },
                );
                let _ = tail_start;
            }
        } else {
            self.ranges.push(SlotRange {
                start: slot,
                end: slot,
                master: new_master,
                replicas: Vec::new(),
            });
            self.ranges.sort_by_key(|r| r.start);
        }
    }
}

/// Extract the hash-tag substring of `key`, following the Redis Cluster
/// convention: the span between the first `{` and the first `}` after it,
/// provided that span is non-empty. An empty tag (`{}`) is not a tag at all
/// and falls through to hashing the whole key.
pub fn hash_tag(key: &[u8]) -> Option<&[u8]> {
    let open = key.iter().position(|&b| b == b'{')?;
    let close = key[open + 1..].iter().position(|&b| b == b'}')?;
    if close == 0 {
        None
    } else {
        Some(&key[open + 1..open + 1 + close])
    }
}

/// CRC16/XMODEM slot for `key`, honoring hash tags.
pub fn slot_for_key(key: &[u8]) -> u16 {
    let target = hash_tag(key).unwrap_or(key);
    crc16::State::<crc16::XMODEM>::calculate(target) % SLOT_COUNT
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn hash_tag_basic() {
        assert_eq!(hash_tag(b"foo{bar}baz"), Some(&b"bar"[..]));
    }

    #[test]
    fn hash_tag_empty_falls_through() {
        assert_eq!(hash_tag(b"foo{}{baz}"), None);
    }

    #[test]
    fn hash_tag_nested_braces() {
        assert_eq!(hash_tag(b"foo{{bar}}zap"), Some(&b"{bar"[..]));
    }

    #[test]
    fn hash_tag_absent() {
        assert_eq!(hash_tag(b"plainkey"), None);
    }

    #[test]
    fn slot_is_in_range() {
        assert!(slot_for_key(b"pcp:map:metric.name") < SLOT_COUNT);
    }

    #[test]
    fn slot_map_lookup() {
        let map = SlotMap::new(vec![
            SlotRange { start: 0, end: 8191, master: "a".into(), replicas: vec![] },
            SlotRange { start: 8192, end: 16383, master: "b".into(), replicas: vec![] },
        ]);
        assert_eq!(map.master_for_slot(0), Some("a"));
        assert_eq!(map.master_for_slot(8191), Some("a"));
        assert_eq!(map.master_for_slot(8192), Some("b"));
        assert_eq!(map.master_for_slot(16383), Some("b"));
    }

    #[test]
    fn single_range_covers_everything() {
        let map = SlotMap::single_range("control".into());
        assert_eq!(map.master_for_slot(0), Some("control"));
        assert_eq!(map.master_for_slot(16383), Some("control"));
    }

    #[test]
    fn apply_moved_splits_range() {
        let mut map = SlotMap::new(vec![SlotRange {
            start: 0,
            end: 16383,
            master: "a".into(),
            replicas: vec![],
        }]);
        map.apply_moved(100, "b".into());
        assert_eq!(map.master_for_slot(99), Some("a"));
        assert_eq!(map.master_for_slot(100), Some("b"));
        assert_eq!(map.master_for_slot(101), Some("a"));
    }
}
