use crate::error::{ModelError, ModelResult};

/// Longest lease reason accepted, in characters.
pub const MAX_REASON_LEN: usize = 30;

const BUG_PREFIXES: [&str; 2] = ["b/", "crbug.com/"];

/// Returns `true` when `s` has the shape of a bug reference (`b/NNNN` or `crbug.com/NNNN`).
pub fn looks_like_bug_id(s: &str) -> bool {
    let s = s.trim();
    BUG_PREFIXES.iter().any(|prefix| {
        s.strip_prefix(prefix)
            .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
    })
}

/// Validates a human lease reason.
pub fn validate_reason(reason: &str) -> ModelResult<()> {
    let len = reason.chars().count();
    if len > MAX_REASON_LEN {
        return Err(ModelError::InvalidReason(format!(
            "the lease reason is limited to {MAX_REASON_LEN} characters (got {len})"
        )));
    }
    if looks_like_bug_id(reason) {
        return Err(ModelError::InvalidReason(format!(
            "the lease reason {reason:?} looks like a bug id; describe the purpose instead"
        )));
    }
    Ok(())
}
