use lettre::{Address, message::Mailbox};

use crate::error::SendError;

/// Syntactic recipient check. Failing it is permanent: no retry can fix it.
pub fn validate_email(email: &str) -> Result<Mailbox, SendError> {
    let trimmed = email.trim();

    if trimmed.is_empty() {
        return Err(SendError::InvalidRecipient {
            email: email.to_string(),
            reason: "recipient cannot be empty".to_string(),
        });
    }

    if trimmed.len() > 254 {
        return Err(SendError::InvalidRecipient {
            email: email.to_string(),
            reason: "recipient too long (maximum 254 characters)".to_string(),
        });
    }

    trimmed
        .parse::<Address>()
        .map(|address| Mailbox::new(None, address))
        .map_err(|e| SendError::InvalidRecipient {
            email: email.to_string(),
            reason: e.to_string(),
        })
}
