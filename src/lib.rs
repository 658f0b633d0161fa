//! Splits a single field-query filter into a stack filter, its inverse and an
//! event filter.
//!
//! ```
//! use stacks_events_query::{StacksAndEventsQueryMode, StacksAndEventsQueryVisitor};
//!
//! let result = StacksAndEventsQueryVisitor::run_query(
//!     "blah:true (status:fixed OR status:open)",
//!     StacksAndEventsQueryMode::InvertedStacks,
//! )
//! .unwrap();
//! assert_eq!(result.query, "NOT (status:fixed OR status:open)");
//! assert!(result.is_invert_successful);
//! ```

pub mod ast;
pub mod config;
pub mod fields;
pub mod lexer;
pub mod parser;
pub mod rewriter;
pub mod serializer;
pub mod token;

pub use fields::FieldTables;
pub use parser::{parse, ParseError};
pub use rewriter::{StacksAndEventsQueryMode, StacksAndEventsQueryResult, StacksAndEventsQueryVisitor};
pub use serializer::serialize;
