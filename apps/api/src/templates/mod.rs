// Global templates: reusable email sequences owned by a user, cloned into
// project sequences on demand.

pub mod handlers;
pub mod store;
