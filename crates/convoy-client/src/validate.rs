//! Uniform response-code check applied to every scheduler call.

use tracing::info;

use convoy_core::ResponseCode;

use crate::api::SchedulerResponse;
use crate::error::{ClientError, ClientResult};

/// Log the response and fail unless its code is `OK`.
///
/// There is no retry here; a rejected call ends the command.
pub fn validate<R: SchedulerResponse + ?Sized>(resp: &R) -> ClientResult<()> {
    info!(
        "Response from scheduler: {} (message: {})",
        resp.code(),
        resp.message()
    );
    if resp.code() != ResponseCode::Ok {
        return Err(ClientError::Rejected {
            code: resp.code(),
            message: resp.message().to_string(),
        });
    }
    Ok(())
}

/// [`validate`] then hand the response back.
pub fn checked<R: SchedulerResponse>(resp: R) -> ClientResult<R> {
    validate(&resp)?;
    Ok(resp)
}
