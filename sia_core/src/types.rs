mod common;
mod currency;
mod spendpolicy;
mod transaction;
pub mod work;

pub use common::*;
pub use currency::*;
pub use spendpolicy::*;
pub use transaction::*;
pub use work::Work;
