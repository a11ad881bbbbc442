// Projects: a recruiter's named search effort, owning searches, a shortlist
// and any project-scoped sequences.

pub mod handlers;
pub mod store;
