pub mod engine;

pub use engine::{find_matches, first_matching_rule, Match, ObservedItem};
