//! Process exit codes. These are part of the command-line contract.

use asice::AsicError;

pub const SUCCESS: i32 = 0;
pub const FAILED: i32 = 1; // Verification or container operation failed
pub const CONFIG_ERROR: i32 = 2; // Bad arguments, keys, policy or config file

/// Container errors map to [`FAILED`]; everything else happened before a
/// container was touched.
pub fn for_error(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<AsicError>().is_some() {
        FAILED
    } else {
        CONFIG_ERROR
    }
}
