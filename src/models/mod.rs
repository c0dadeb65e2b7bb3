pub mod circuit;
pub mod ledger;
pub mod scrape;

pub use circuit::*;
pub use ledger::*;
pub use scrape::*;
