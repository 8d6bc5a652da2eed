mod recommendations;

pub use recommendations::{AdvisorRecommendations, build_filter};
