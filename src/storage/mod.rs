//! Backing cache and the mailbox store built on it

pub mod mailbox;
pub mod memory;
pub mod traits;
pub mod upstash;

pub use mailbox::{MailboxStore, TakeOutcome};
pub use memory::MemoryCache;
pub use traits::{Cache, PushOutcome, SharedCache};
pub use upstash::UpstashCache;
