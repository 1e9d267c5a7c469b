//! Process name parsing.
//!
//! A process name is a case-insensitive dotted string. Parsing splits it
//! into a group, an id (the subgroup chain), a method, and the canonical
//! lowercase handler key used for registry lookup.

use crate::error::Exception;

/// A parsed process name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessName {
    /// The name as given by the caller.
    pub name: String,
    /// First segment, lowercased.
    pub group: String,
    /// Dot-joined middle segments (original case).
    pub id: String,
    /// Last segment (original case), empty for groups without a method.
    pub method: String,
    /// Canonical lowercase registry key.
    pub handler: String,
}

/// Groups whose handler key is `<group>.<method>` with the middle as id.
const ID_METHOD_GROUPS: [&str; 6] = ["models", "schemas", "stores", "fs", "tasks", "schedules"];

/// Groups dispatched to one handler that reads id and method itself.
const GROUP_HANDLERS: [&str; 3] = ["scripts", "studio", "plugins"];

impl ProcessName {
    /// Parse a dotted process name.
    ///
    /// # Errors
    ///
    /// Returns a `NotFound` exception for names with fewer than two
    /// segments, or fewer segments than the group requires.
    pub fn parse(name: &str) -> Result<Self, Exception> {
        let fields: Vec<&str> = name.split('.').collect();
        if fields.len() < 2 || fields.iter().any(|f| f.is_empty()) {
            return Err(Exception::not_found(format!(
                "{} is not a valid process name",
                name
            )));
        }

        let group = fields[0].to_lowercase();
        let last = fields[fields.len() - 1];
        let middle = fields[1..fields.len() - 1].join(".");
        let tail = fields[1..].join(".");

        let (id, method, handler) = match group.as_str() {
            g if ID_METHOD_GROUPS.contains(&g) => {
                (middle, last.to_string(), format!("{}.{}", g, last.to_lowercase()))
            }
            "flows" | "aigcs" => (tail, String::new(), group.clone()),
            g if GROUP_HANDLERS.contains(&g) => {
                if fields.len() < 3 {
                    return Err(Exception::not_found(format!(
                        "{} is not a valid process name: {} requires <id>.<method>",
                        name, g
                    )));
                }
                (middle, last.to_string(), group.clone())
            }
            "session" | "http" => (
                middle,
                last.to_string(),
                format!("{}.{}", group, last.to_lowercase()),
            ),
            "widgets" => {
                let handler = if middle.is_empty() {
                    format!("widgets.{}", last)
                } else {
                    format!("widgets.{}.{}", middle, last)
                };
                (middle, last.to_string(), handler.to_lowercase())
            }
            _ => (middle, last.to_string(), name.to_lowercase()),
        };

        Ok(ProcessName {
            name: name.to_string(),
            group,
            id,
            method,
            handler,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(name: &str) -> ProcessName {
        ProcessName::parse(name).unwrap()
    }

    #[test]
    fn models_split_id_and_method() {
        let n = parse("models.user.pet.Find");
        assert_eq!(n.group, "models");
        assert_eq!(n.id, "user.pet");
        assert_eq!(n.method, "Find");
        assert_eq!(n.handler, "models.find");
    }

    #[test]
    fn fs_store_is_the_id() {
        let n = parse("fs.system.ReadFile");
        assert_eq!(n.id, "system");
        assert_eq!(n.handler, "fs.readfile");
    }

    #[test]
    fn flows_and_aigcs_use_group_handler() {
        let n = parse("flows.stat.daily");
        assert_eq!(n.handler, "flows");
        assert_eq!(n.id, "stat.daily");

        let n = parse("aigcs.translate");
        assert_eq!(n.handler, "aigcs");
        assert_eq!(n.id, "translate");
    }

    #[test]
    fn plugins_need_id_and_method() {
        let n = parse("plugins.user.Search");
        assert_eq!(n.handler, "plugins");
        assert_eq!(n.id, "user");
        assert_eq!(n.method, "Search");

        let err = ProcessName::parse("plugins.Search").unwrap_err();
        assert_eq!(err.code, 404);
    }

    #[test]
    fn session_and_http_keep_method_only() {
        assert_eq!(parse("session.Get").handler, "session.get");
        assert_eq!(parse("http.Post").handler, "http.post");
    }

    #[test]
    fn widgets_include_widget_id() {
        let n = parse("widgets.Dyform.Setting");
        assert_eq!(n.id, "Dyform");
        assert_eq!(n.handler, "widgets.dyform.setting");
    }

    #[test]
    fn other_groups_use_full_name() {
        let n = parse("diff.Patch");
        assert_eq!(n.handler, "diff.patch");
        let n = parse("encoding.base64.Encode");
        assert_eq!(n.handler, "encoding.base64.encode");
        assert_eq!(n.group, "encoding");
    }

    #[test]
    fn short_names_are_not_found() {
        assert_eq!(ProcessName::parse("unknown").unwrap_err().code, 404);
        assert_eq!(ProcessName::parse("").unwrap_err().code, 404);
        assert_eq!(ProcessName::parse("a..b").unwrap_err().code, 404);
    }
}
