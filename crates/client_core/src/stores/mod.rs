//! Client-side caches. Each store registers one dispatcher callback, which is
//! the only path that mutates its state; everything else reads snapshots.

mod user;
mod users;

pub use user::{UserSnapshot, UserStore};
pub use users::{UsersSnapshot, UsersStore, DEFAULT_PAGE_COUNT};
