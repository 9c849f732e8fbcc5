//! State transition rules

use crate::types::{DepositState, UploadState};

/// State transition Error
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Deposit already reached a terminal state
    #[error("Deposit already {0}")]
    DepositFinalized(DepositState),
    /// Invalid transition
    #[error("Invalid deposit transition: From {0} to {1}")]
    InvalidDepositTransition(DepositState, DepositState),
    /// Upload already reached a terminal state
    #[error("Upload already {0}")]
    UploadFinalized(UploadState),
    /// Invalid transition
    #[error("Invalid upload transition: From {0} to {1}")]
    InvalidUploadTransition(UploadState, UploadState),
}

#[inline]
/// Check if the deposit state transition is allowed
///
/// Valid transitions:
/// - Pending -> Confirmed, Failed
/// - Confirmed, Failed -> (no transitions allowed)
pub fn check_deposit_state_transition(
    current_state: DepositState,
    new_state: DepositState,
) -> Result<(), Error> {
    let is_valid_transition = match current_state {
        DepositState::Pending => {
            matches!(new_state, DepositState::Confirmed | DepositState::Failed)
        }
        DepositState::Confirmed | DepositState::Failed => false,
    };

    if !is_valid_transition {
        Err(match current_state {
            DepositState::Pending => Error::InvalidDepositTransition(current_state, new_state),
            terminal => Error::DepositFinalized(terminal),
        })
    } else {
        Ok(())
    }
}

#[inline]
/// Check if the upload state transition is allowed
///
/// Valid transitions:
/// - Queued -> Submitting, Failed
/// - Submitting -> Placing, Failed
/// - Placing -> Placed, Failed
/// - Placed -> Settling, Failed
/// - Settling -> Done, Failed
/// - Done, Failed -> (no transitions allowed)
pub fn check_upload_state_transition(
    current_state: UploadState,
    new_state: UploadState,
) -> Result<(), Error> {
    let is_valid_transition = match current_state {
        UploadState::Queued => matches!(new_state, UploadState::Submitting | UploadState::Failed),
        UploadState::Submitting => {
            matches!(new_state, UploadState::Placing | UploadState::Failed)
        }
        UploadState::Placing => matches!(new_state, UploadState::Placed | UploadState::Failed),
        UploadState::Placed => matches!(new_state, UploadState::Settling | UploadState::Failed),
        UploadState::Settling => matches!(new_state, UploadState::Done | UploadState::Failed),
        UploadState::Done | UploadState::Failed => false,
    };

    if !is_valid_transition {
        Err(match current_state {
            UploadState::Done | UploadState::Failed => Error::UploadFinalized(current_state),
            _ => Error::InvalidUploadTransition(current_state, new_state),
        })
    } else {
        Ok(())
    }
}
