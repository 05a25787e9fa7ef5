//! Participant identity.
//!
//! A participant is created locally with a user and repository id. The
//! site id is assigned once by the server (`SiteIdMessage`) and is the
//! identity used to tell "self" from "others" for the rest of the session.

use serde::{Deserialize, Serialize};

/// One collaborator in a repository session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_id: Option<String>,
    pub repo_id: String,
}

impl Participant {
    pub fn new(user_id: impl Into<String>, repo_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            site_id: None,
            repo_id: repo_id.into(),
        }
    }

    /// Create with an explicit site id (peers, tests)
    pub fn with_site(
        user_id: impl Into<String>,
        site_id: impl Into<String>,
        repo_id: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            site_id: Some(site_id.into()),
            repo_id: repo_id.into(),
        }
    }

    pub fn site_id(&self) -> Option<&str> {
        self.site_id.as_deref()
    }

    /// True when both sides carry the same assigned site id.
    ///
    /// Participants without a site id never match anyone, themselves included.
    pub fn same_site(&self, other: &Participant) -> bool {
        matches!((&self.site_id, &other.site_id), (Some(a), Some(b)) if a == b)
    }

    /// Short label for notifications and logs.
    pub fn label(&self) -> String {
        match &self.site_id {
            Some(site) => format!("{} ({site})", self.user_id),
            None => self.user_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_participant_wire_shape() {
        let p = Participant::with_site("alice", "s1", "repo");
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "userId": "alice", "siteId": "s1", "repoId": "repo" })
        );
    }

    #[test]
    fn test_participant_without_site_omits_field() {
        let p = Participant::new("alice", "repo");
        let json = serde_json::to_string(&p).unwrap();
        assert!(!json.contains("siteId"));

        let back: Participant = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn test_same_site() {
        let a = Participant::with_site("alice", "s1", "repo");
        let b = Participant::with_site("alice-laptop", "s1", "repo");
        let c = Participant::with_site("bob", "s2", "repo");
        let unassigned = Participant::new("alice", "repo");

        assert!(a.same_site(&b));
        assert!(!a.same_site(&c));
        assert!(!unassigned.same_site(&unassigned));
    }

    #[test]
    fn test_label() {
        assert_eq!(Participant::new("bob", "r").label(), "bob");
        assert_eq!(Participant::with_site("bob", "x9", "r").label(), "bob (x9)");
    }
}
