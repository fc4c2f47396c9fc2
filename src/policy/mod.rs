//! Static capability scanning and the import/output policy.

pub mod allow_list;
pub mod enforcer;
pub mod scanner;

pub use allow_list::AllowList;
pub use scanner::{scan, ScanReport};
