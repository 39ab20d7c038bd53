pub mod entries;

pub use entries::{GuestbookEntry, Sponsorship, newest_first};
