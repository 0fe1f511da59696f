use crate::domain::{PageCursor, PostId};

/// Absolute URLs of everything served for an account.
#[derive(Debug, Clone)]
pub struct Links {
    base: String,
}

impl Links {
    pub fn new(public_base_url: &str) -> Self {
        Self {
            base: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn actor(&self, username: &str) -> String {
        format!("{}/users/{}", self.base, username)
    }

    pub fn outbox(&self, username: &str) -> String {
        format!("{}/outbox", self.actor(username))
    }

    pub fn outbox_page(&self, username: &str, cursor: PageCursor) -> String {
        format!("{}?{}", self.outbox(username), cursor.to_query())
    }

    pub fn inbox(&self, username: &str) -> String {
        format!("{}/inbox", self.actor(username))
    }

    pub fn followers(&self, username: &str) -> String {
        format!("{}/followers", self.actor(username))
    }

    pub fn following(&self, username: &str) -> String {
        format!("{}/following", self.actor(username))
    }

    pub fn liked(&self, username: &str) -> String {
        format!("{}/liked", self.actor(username))
    }

    pub fn avatar(&self, username: &str) -> String {
        format!("{}/avatar", self.actor(username))
    }

    /// Human-facing profile page.
    pub fn profile_page(&self, username: &str) -> String {
        format!("{}/@{}", self.base, username)
    }

    pub fn status(&self, username: &str, id: &PostId) -> String {
        format!("{}/statuses/{}", self.actor(username), id)
    }

    pub fn activity(&self, username: &str, id: &PostId) -> String {
        format!("{}/activity", self.status(username, id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AccountId, SourceTag};

    #[test]
    fn test_links_are_absolute() {
        let links = Links::new("https://mirror.example/");
        assert_eq!(links.actor("alice"), "https://mirror.example/users/alice");
        assert_eq!(
            links.outbox_page("alice", PageCursor::first()),
            "https://mirror.example/users/alice/outbox?after=0"
        );
        assert_eq!(links.profile_page("alice"), "https://mirror.example/@alice");

        let id = PostId::new(AccountId(1), SourceTag::Twitter, 1);
        assert_eq!(
            links.activity("alice", &id),
            "https://mirror.example/users/alice/statuses/01001/activity"
        );
    }
}
