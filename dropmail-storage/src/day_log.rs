use dropmail_lib::Checksum;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// polling progress of one contact for one day
///
/// * `next_id`: the first sequence number not known to be received yet;
/// * `passes`: the number of completed sweeps of that day;
/// * `messages`: the sequence numbers received so far with the checksum of
///   the committed message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayLog {
    #[serde(default = "default_next_id")]
    next_id: u64,
    #[serde(default)]
    passes: u32,
    #[serde(default)]
    messages: BTreeMap<u64, Checksum>,
}

fn default_next_id() -> u64 {
    1
}

impl Default for DayLog {
    fn default() -> Self {
        Self {
            next_id: default_next_id(),
            passes: 0,
            messages: BTreeMap::new(),
        }
    }
}

impl DayLog {
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    pub fn passes(&self) -> u32 {
        self.passes
    }

    pub fn messages(&self) -> &BTreeMap<u64, Checksum> {
        &self.messages
    }

    pub fn contains(&self, sequence: u64) -> bool {
        self.messages.contains_key(&sequence)
    }

    /// record the successful retrieval of the message at `sequence`
    ///
    /// `next_id` becomes one past the highest received sequence number
    pub fn record(&mut self, sequence: u64, checksum: Checksum) {
        self.messages.insert(sequence, checksum);
        self.next_id = std::cmp::max(self.next_id, sequence.saturating_add(1));
    }

    pub fn complete_pass(&mut self) {
        self.passes = self.passes.saturating_add(1);
    }
}
