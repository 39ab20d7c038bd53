pub mod compose;
pub mod contract;
pub mod ens;
pub mod feed;
pub mod retry;
pub mod scanner;
pub mod source;
pub mod sponsorship;
pub mod watcher;

pub use compose::{FeeQuote, MessageDraft, MessageKind};
pub use contract::{GuestbookWriter, IGuestbook, SubmittedTx};
pub use feed::{FeedStatus, FeedUpdate, FeedView, GuestbookFeed, PinnedEntry};
pub use retry::{RetryPolicy, fetch_with_retry};
pub use source::{GuestbookSource, RpcGuestbookSource};
pub use watcher::{WatcherSettings, run_watcher};
