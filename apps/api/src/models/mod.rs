pub mod candidate;
pub mod profile;
pub mod project;
pub mod search;
pub mod sequence;
pub mod template;
