mod dashboard;

pub use dashboard::{Dashboard, canonical_json};
