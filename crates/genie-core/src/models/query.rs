use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::{CoreError, CoreErrorKind, MergeMode};

/// The design tools that submit work to the backend.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Tool {
    PartsGenie,
    DesignGenie,
    DominoGenie,
    DigestGenie,
    MetabolomicsGenie,
    AssemblyGenie,
    SbcDoe,
    Save,
}

impl Tool {
    pub const ALL: [Tool; 8] = [
        Tool::PartsGenie,
        Tool::DesignGenie,
        Tool::DominoGenie,
        Tool::DigestGenie,
        Tool::MetabolomicsGenie,
        Tool::AssemblyGenie,
        Tool::SbcDoe,
        Tool::Save,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PartsGenie => "PartsGenie",
            Self::DesignGenie => "DesignGenie",
            Self::DominoGenie => "DominoGenie",
            Self::DigestGenie => "DigestGenie",
            Self::MetabolomicsGenie => "MetabolomicsGenie",
            Self::AssemblyGenie => "AssemblyGenie",
            Self::SbcDoe => "SBC-DoE",
            Self::Save => "save",
        }
    }

    /// DesignGenie submissions yield one job per requested design, each
    /// contributing part of the result.
    pub fn merge_mode(self) -> MergeMode {
        match self {
            Self::DesignGenie => MergeMode::Append,
            _ => MergeMode::Replace,
        }
    }

    pub fn dashboard_title(self) -> String {
        format!("{} dashboard", self.as_str())
    }
}

impl Display for Tool {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Tool {
    type Err = CoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Tool::ALL
            .into_iter()
            .find(|tool| tool.as_str().eq_ignore_ascii_case(value))
            .ok_or_else(|| {
                CoreError::new(
                    CoreErrorKind::InvalidInput,
                    format!("unknown tool '{value}'"),
                )
            })
    }
}

/// A design query. Only the `app` discriminator is interpreted; every other
/// member is passed through to the backend untouched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub app: String,
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl Query {
    pub fn new(app: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            params: Map::new(),
        }
    }

    pub fn for_tool(tool: Tool) -> Self {
        Self::new(tool.as_str())
    }

    pub fn from_json(value: Value) -> Result<Self, CoreError> {
        let Value::Object(mut object) = value else {
            return Err(CoreError::new(
                CoreErrorKind::InvalidInput,
                "query must be a JSON object",
            ));
        };

        let app = match object.remove("app") {
            Some(Value::String(app)) if !app.trim().is_empty() => app,
            Some(_) => {
                return Err(CoreError::new(
                    CoreErrorKind::InvalidInput,
                    "query 'app' must be a non-empty string",
                ));
            }
            None => {
                return Err(CoreError::new(
                    CoreErrorKind::InvalidInput,
                    "query is missing the 'app' discriminator",
                ));
            }
        };

        Ok(Self {
            app,
            params: object,
        })
    }

    pub fn param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Returns a copy with `key` set to `value`, replacing any previous entry.
    pub fn with_context(&self, key: impl Into<String>, value: Value) -> Self {
        self.clone().param(key, value)
    }

    pub fn tool(&self) -> Option<Tool> {
        self.app.parse().ok()
    }

    pub fn merge_mode(&self) -> MergeMode {
        self.tool().map(Tool::merge_mode).unwrap_or_default()
    }

    pub fn to_json(&self) -> Value {
        let mut object = self.params.clone();
        object.insert("app".to_string(), Value::String(self.app.clone()));
        Value::Object(object)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn query_round_trips_app_discriminator_with_params() {
        let query = Query::from_json(json!({"app": "DominoGenie", "melt_temp": 70})).unwrap();
        assert_eq!(query.app, "DominoGenie");
        assert_eq!(query.tool(), Some(Tool::DominoGenie));
        assert_eq!(
            serde_json::to_value(&query).unwrap(),
            json!({"app": "DominoGenie", "melt_temp": 70})
        );
        assert_eq!(query.to_json(), json!({"app": "DominoGenie", "melt_temp": 70}));
    }

    #[test]
    fn query_without_app_is_rejected() {
        let error = Query::from_json(json!({"melt_temp": 70})).unwrap_err();
        assert_eq!(error.kind, CoreErrorKind::InvalidInput);

        let error = Query::from_json(json!(["PartsGenie"])).unwrap_err();
        assert_eq!(error.kind, CoreErrorKind::InvalidInput);
    }

    #[test]
    fn with_context_leaves_original_untouched() {
        let query = Query::for_tool(Tool::DigestGenie);
        let merged = query.with_context("ice", json!({"url": "https://ice.example"}));

        assert!(query.params.is_empty());
        assert_eq!(merged.params["ice"]["url"], "https://ice.example");
    }

    #[test]
    fn design_genie_appends_and_unknown_apps_replace() {
        assert_eq!(Tool::DesignGenie.merge_mode(), MergeMode::Append);
        assert_eq!(Tool::PartsGenie.merge_mode(), MergeMode::Replace);
        assert_eq!(Query::new("SomethingElse").merge_mode(), MergeMode::Replace);
        assert_eq!("partsgenie".parse::<Tool>().unwrap(), Tool::PartsGenie);
        assert_eq!(Tool::PartsGenie.dashboard_title(), "PartsGenie dashboard");
    }

    #[test]
    fn assembly_and_doe_tools_parse_and_replace() {
        assert_eq!("assemblygenie".parse::<Tool>().unwrap(), Tool::AssemblyGenie);
        assert_eq!("sbc-doe".parse::<Tool>().unwrap(), Tool::SbcDoe);
        assert_eq!(Tool::SbcDoe.as_str(), "SBC-DoE");
        assert_eq!(Tool::AssemblyGenie.merge_mode(), MergeMode::Replace);
        assert_eq!(Tool::SbcDoe.merge_mode(), MergeMode::Replace);

        let query = Query::from_json(json!({"app": "SBC-DoE"})).unwrap();
        assert_eq!(query.tool(), Some(Tool::SbcDoe));
    }
}
