//! Documents served to federated peers.

use serde::{Deserialize, Serialize};

pub const ACTIVITY_STREAMS_CONTEXT: &str = "https://www.w3.org/ns/activitystreams";
pub const PUBLIC_COLLECTION: &str = "https://www.w3.org/ns/activitystreams#Public";

pub const ACTIVITY_JSON: &str = "application/activity+json";
pub const JRD_JSON: &str = "application/jrd+json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderedCollection {
    #[serde(rename = "@context")]
    pub context: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    pub total_items: u64,
    pub first: String,
    pub last: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderedCollectionPage {
    #[serde(rename = "@context")]
    pub context: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev: Option<String>,
    pub part_of: String,
    pub ordered_items: Vec<Create>,
}

/// Outbox entry announcing a post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Create {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub actor: String,
    pub published: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub object: Note,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    #[serde(rename = "@context", skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub attributed_to: String,
    pub published: String,
    pub content: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    #[serde(rename = "@context")]
    pub context: String,
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub preferred_username: String,
    pub name: String,
    pub summary: String,
    pub icon: Image,
    pub inbox: String,
    pub outbox: String,
    pub followers: String,
    pub following: String,
    pub liked: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
}

/// WebFinger resource descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Jrd {
    pub subject: String,
    pub aliases: Vec<String>,
    pub links: Vec<JrdLink>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JrdLink {
    pub rel: String,
    #[serde(rename = "type")]
    pub media_type: String,
    pub href: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_collection_field_names() {
        let doc = OrderedCollection {
            context: ACTIVITY_STREAMS_CONTEXT.into(),
            kind: "OrderedCollection".into(),
            id: "https://m.example/users/alice/outbox".into(),
            total_items: 3,
            first: "https://m.example/users/alice/outbox?after=0".into(),
            last: "https://m.example/users/alice/outbox?before=3062002607999".into(),
        };

        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["@context"], ACTIVITY_STREAMS_CONTEXT);
        assert_eq!(value["type"], "OrderedCollection");
        assert_eq!(value["totalItems"], 3);
    }

    #[test]
    fn test_page_omits_missing_links() {
        let page = OrderedCollectionPage {
            context: ACTIVITY_STREAMS_CONTEXT.into(),
            kind: "OrderedCollectionPage".into(),
            id: "p".into(),
            next: None,
            prev: Some("q".into()),
            part_of: "c".into(),
            ordered_items: Vec::new(),
        };

        let value = serde_json::to_value(&page).unwrap();
        assert!(value.get("next").is_none());
        assert_eq!(value["prev"], "q");
        assert_eq!(value["partOf"], "c");
        assert_eq!(value["orderedItems"], json!([]));
    }
}
