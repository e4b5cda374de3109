// Cache engine — chunk storage, payload reclamation and per-file locking.

pub mod cache;
pub mod chunk;
pub mod lock;
pub mod reclaim;
pub mod stats;
pub mod store;
