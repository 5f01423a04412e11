#[cfg(feature = "desktop")]
pub mod commands;
pub mod model;

pub use model::{is_valid_email_or_domain, Rule, RuleError, RuleInput, RuleSet};
