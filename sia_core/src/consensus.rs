mod state;
mod validation;
pub mod update;

pub use state::State;
pub use update::{apply_block, genesis_update, ApplyUpdate};
pub use validation::{
    validate_block, validate_transaction, validate_transaction_set, ValidationError,
};
