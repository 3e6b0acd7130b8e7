//! The books: accounts and an append-only journal of balanced entries.
//!
//! The [`InMemoryLedgerStore`] is an implementation of the [`LedgerStore`] that keeps everything in memory.
//

mod entry;
mod store;

pub use entry::{
  Account, AccountId, JournalEntry, JournalEntryId, LedgerLine, NewJournalEntry, NewLine, Side,
};
pub use store::{InMemoryLedgerStore, LedgerError, LedgerStore, Result as LedgerResult};
