// Network surface — the cache server, its wire documents and a client for it.

pub mod client;
pub mod handler;
pub mod protocol;
