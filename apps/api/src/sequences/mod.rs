// Email sequences: ordered outreach emails sent to enrolled candidates on a
// schedule. `schedule` computes send times, `render` personalises emails,
// `dispatch` advances due recipients and hands emails to `outbound`.

pub mod dispatch;
pub mod handlers;
pub mod outbound;
pub mod render;
pub mod schedule;
pub mod store;
