//! Turn-taking rules for parallel and sequential signing

use crate::envelope::{Recipient, SigningMode};

/// True once every recipient has signed. An envelope without recipients is
/// never complete.
pub fn all_signed(recipients: &[Recipient]) -> bool {
    !recipients.is_empty() && recipients.iter().all(Recipient::is_signed)
}

/// Pending recipients whose turn it is
///
/// Parallel: every pending recipient. Sequential: the pending recipients that
/// share the lowest `order`. Input order is preserved.
pub fn awaiting_turn(mode: SigningMode, recipients: &[Recipient]) -> Vec<&Recipient> {
    let pending = recipients.iter().filter(|r| !r.is_signed());
    match mode {
        SigningMode::Parallel => pending.collect(),
        SigningMode::Sequential => {
            let Some(current) = pending.clone().map(|r| r.order).min() else {
                return Vec::new();
            };
            pending.filter(|r| r.order == current).collect()
        }
    }
}

/// Whether `recipient_id` may submit values right now
pub fn may_sign(mode: SigningMode, recipients: &[Recipient], recipient_id: &str) -> bool {
    awaiting_turn(mode, recipients)
        .iter()
        .any(|r| r.id == recipient_id)
}
