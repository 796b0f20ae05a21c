//! Shared identifier types.

use uuid::Uuid;

pub type UserId = Uuid;
pub type TeamId = Uuid;
pub type ApiKeyId = Uuid;
pub type JobId = Uuid;
pub type WebhookId = Uuid;
pub type TemplateId = Uuid;

/// Shorten a UUID for log fields (first group only).
pub fn abbrev_uuid(id: &Uuid) -> String {
    let s = id.to_string();
    s[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abbrev_uuid() {
        let id = Uuid::nil();
        assert_eq!(abbrev_uuid(&id), "00000000");
    }
}
