pub mod filter_operator;
pub mod sort_parser;

pub use filter_operator::{Condition, Filter};
pub use sort_parser::{SortOrder, SortSpec};
