/*!
# dropmail shared types

value types shared by the network, storage and daemon crates:

* [`EmailAddress`]: the `user@domain` recipients and senders;
* [`DayKey`]: the UTC calendar day used to bucket dead-drop slots;
* [`Checksum`]: the content checksum of a committed message;
* [`EntryName`]: the name of an outbox entry, encoding its attempts and
  its recipient so a rename is enough to update it.
*/

#[cfg(test)]
#[macro_use(quickcheck)]
extern crate quickcheck_macros;

mod address;
mod checksum;
mod day;
mod entry_name;

pub use self::{
    address::{AddressError, EmailAddress},
    checksum::{Checksum, ChecksumHasher},
    day::DayKey,
    entry_name::{EntryName, EntryNameError},
};

/// build the storage network key of a dead-drop slot
///
/// both ends of a contact derive the same key without negotiating it:
/// `<contact key><day>-<sequence>`.
pub fn slot_key(contact_key: &str, day: DayKey, sequence: u64) -> String {
    format!("{}{}-{}", contact_key, day, sequence)
}
