// Chat-driven candidate search: a proxy in front of the external matching
// API that keeps one `searches` row per conversation session and archives
// every response in `search_results`.

pub mod chat;
pub mod handlers;
pub mod session;
pub mod store;
