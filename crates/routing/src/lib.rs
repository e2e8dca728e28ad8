//! Map a source channel name to the destination its messages are relayed to.
//!
//! Rule order (first match wins):
//! 1. Prefix rules, in configured order
//! 2. Suffix rules, in configured order
//!
//! Without a usable rule table every channel goes to the single aggregate
//! destination.

pub mod dispatcher;
pub mod error;
pub mod rules;

pub use {
    dispatcher::Dispatcher,
    error::{Error, Result},
    rules::{DispatchRule, MatchKind, parse_rules},
};
