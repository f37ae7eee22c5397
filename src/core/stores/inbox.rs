//! Application payload inbox.
//!
//! Only frames the protocol classifier deemed application data land here;
//! control traffic is consumed upstream. Each entry snapshots the sender's
//! peer record at arrival time, so the inbox stays meaningful after the
//! endpoint vanishes.

use uuid::Uuid;

use crate::core::stores::peers::PeerRecord;

/// One received application payload.
#[derive(Clone, Debug, PartialEq)]
pub struct PayloadEntry {
    pub id: Uuid,
    pub body: Vec<u8>,
    /// Sender's peer record as it looked when the payload arrived.
    pub from: PeerRecord,
    pub received_at_millis: u64,
    pub read: bool,
}

/// Ordered inbox of application payloads, oldest first.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InboxState {
    pub entries: Vec<PayloadEntry>,
}

impl InboxState {
    /// Append a payload, unread, stamped with a fresh entry id.
    pub fn push(&mut self, body: Vec<u8>, from: PeerRecord, now_millis: u64) {
        self.entries.push(PayloadEntry {
            id: Uuid::new_v4(),
            body,
            from,
            received_at_millis: now_millis,
            read: false,
        });
    }

    /// Mark one entry read. Returns `false` if the id is unknown.
    pub fn mark_read(&mut self, entry_id: Uuid) -> bool {
        match self.entries.iter_mut().find(|e| e.id == entry_id) {
            Some(entry) => {
                entry.read = true;
                true
            }
            None => false,
        }
    }

    pub fn unread_count(&self) -> usize {
        self.entries.iter().filter(|e| !e.read).count()
    }
}
