//! Typed request contract for the visitors endpoint.
//!
//! Query strings arrive as loose strings (`?action=join&visitorId=..&isPageLoad=true`).
//! They are parsed once, at the boundary, into [`PresenceRequest`]. Unknown actions
//! fall back to `Stats` and a missing or blank `visitorId` turns a mutation into a
//! read-only `Stats` so older clients keep working.

use serde::Deserialize;

/// Raw query parameters as sent by the browser agent.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceQuery {
    pub action: Option<String>,
    pub visitor_id: Option<String>,
    pub is_page_load: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceRequest {
    /// Announce presence. `page_load` is true only for a genuine page load,
    /// which is the only case that counts toward total visits.
    Join { visitor_id: String, page_load: bool },
    /// Keep an existing session alive (creates it if absent).
    Ping { visitor_id: String },
    /// Drop a session explicitly.
    Leave { visitor_id: String },
    /// Read-only snapshot.
    Stats,
}

impl PresenceRequest {
    pub fn action_name(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::Ping { .. } => "ping",
            Self::Leave { .. } => "leave",
            Self::Stats => "stats",
        }
    }
}

impl From<PresenceQuery> for PresenceRequest {
    fn from(query: PresenceQuery) -> Self {
        // Ids are opaque: kept byte-for-byte, only blank ones are rejected
        let visitor_id = query.visitor_id.filter(|id| !id.trim().is_empty());

        let action = query.action.as_deref().map(str::trim).unwrap_or("stats");

        match (action, visitor_id) {
            ("join", Some(visitor_id)) => Self::Join {
                visitor_id,
                page_load: parse_flag(query.is_page_load.as_deref()),
            },
            ("ping", Some(visitor_id)) => Self::Ping { visitor_id },
            ("leave", Some(visitor_id)) => Self::Leave { visitor_id },
            _ => Self::Stats,
        }
    }
}

/// Only the literal `true` / `1` count as set; anything else reads as false.
fn parse_flag(raw: Option<&str>) -> bool {
    matches!(raw, Some("true") | Some("1"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(action: Option<&str>, id: Option<&str>, page_load: Option<&str>) -> PresenceQuery {
        PresenceQuery {
            action: action.map(String::from),
            visitor_id: id.map(String::from),
            is_page_load: page_load.map(String::from),
        }
    }

    #[test]
    fn test_join_with_page_load() {
        let req = PresenceRequest::from(query(Some("join"), Some("visitor_1"), Some("true")));
        assert_eq!(
            req,
            PresenceRequest::Join {
                visitor_id: "visitor_1".into(),
                page_load: true
            }
        );
    }

    #[test]
    fn test_join_page_load_defaults_false() {
        for flag in [
            None,
            Some("false"),
            Some("0"),
            Some("yes"),
            Some(""),
            Some("TRUE"),
            Some("True"),
            Some(" true"),
        ] {
            let req = PresenceRequest::from(query(Some("join"), Some("v"), flag));
            assert_eq!(
                req,
                PresenceRequest::Join {
                    visitor_id: "v".into(),
                    page_load: false
                },
                "flag {:?} should not count as a page load",
                flag
            );
        }
        let req = PresenceRequest::from(query(Some("join"), Some("v"), Some("1")));
        assert!(matches!(req, PresenceRequest::Join { page_load: true, .. }));
    }

    #[test]
    fn test_ping_and_leave() {
        assert_eq!(
            PresenceRequest::from(query(Some("ping"), Some("a"), None)),
            PresenceRequest::Ping {
                visitor_id: "a".into()
            }
        );
        assert_eq!(
            PresenceRequest::from(query(Some("leave"), Some("a"), None)),
            PresenceRequest::Leave {
                visitor_id: "a".into()
            }
        );
    }

    #[test]
    fn test_missing_or_blank_visitor_id_is_stats() {
        for action in ["join", "ping", "leave"] {
            assert_eq!(
                PresenceRequest::from(query(Some(action), None, Some("true"))),
                PresenceRequest::Stats
            );
            assert_eq!(
                PresenceRequest::from(query(Some(action), Some("   "), None)),
                PresenceRequest::Stats
            );
        }
    }

    #[test]
    fn test_unknown_or_missing_action_is_stats() {
        assert_eq!(
            PresenceRequest::from(query(Some("explode"), Some("a"), None)),
            PresenceRequest::Stats
        );
        assert_eq!(
            PresenceRequest::from(query(None, Some("a"), None)),
            PresenceRequest::Stats
        );
        assert_eq!(PresenceRequest::from(PresenceQuery::default()).action_name(), "stats");
    }

    #[test]
    fn test_visitor_id_is_kept_verbatim() {
        let padded = PresenceRequest::from(query(Some("ping"), Some(" a"), None));
        let plain = PresenceRequest::from(query(Some("ping"), Some("a"), None));
        assert_eq!(
            padded,
            PresenceRequest::Ping {
                visitor_id: " a".into()
            }
        );
        assert_ne!(padded, plain);
    }
}
