//! Plan Requests and Prompt Building
//!
//! A [`PlanRequest`] is the structured body clients POST to the gateway. It is
//! turned into a fixed two-message conversation: the advisor system
//! instruction followed by a user message listing every field as a
//! `label: value` line.

use serde::{de, Deserialize, Deserializer};

use crate::messages::ChatMessage;

/// Built-in system instruction for the career planning advisor
///
/// Defines the role, the output structure, the answer language, and asks the
/// model not to reveal its reasoning.
pub const DEFAULT_SYSTEM_PROMPT: &str = concat!(
    "你是一名职业生涯与AI学习规划顾问。",
    "请基于用户背景、技能、目标岗位与时间范围，输出结构化、可执行的学习与实践计划。",
    "内容应包含阶段划分、里程碑、学习资源、每日/每周安排、项目实践与评估指标。",
    "语言使用中文，避免输出任何内部推理或思考过程。"
);

/// Placeholder for fields the client left out
pub const UNKNOWN_VALUE: &str = "未知";

/// Separator used when listing skills and preferences
const LIST_SEPARATOR: &str = ", ";

/// Structured career/learning-plan request
///
/// Missing or `null` fields take their defaults, so `{}` is a valid request.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct PlanRequest {
    /// Person the plan is for
    #[serde(default)]
    pub name: Option<String>,

    /// Education and work background
    #[serde(default, deserialize_with = "null_as_default")]
    pub background: String,

    /// Current skills
    #[serde(default, deserialize_with = "null_as_default")]
    pub skills: Vec<String>,

    /// Role the person is aiming for
    #[serde(default, deserialize_with = "null_as_default")]
    pub target_role: String,

    /// Plan horizon in months; numbers and text are both accepted
    #[serde(default)]
    pub timeframe_months: Option<serde_json::Value>,

    /// Learning preferences
    #[serde(default, deserialize_with = "null_as_default")]
    pub preferences: Vec<String>,

    /// Current level (e.g. beginner, intermediate)
    #[serde(default)]
    pub level: Option<String>,

    /// Whether reasoning should be removed from the reply
    #[serde(default)]
    pub hide_reasoning: Option<bool>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl PlanRequest {
    /// Parse a request body; an empty body is an empty request
    ///
    /// # Errors
    ///
    /// Returns the JSON error for malformed bodies, bodies that are not an
    /// object, or mistyped fields.
    pub fn from_json(body: &[u8]) -> Result<Self, serde_json::Error> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        let value: serde_json::Value = serde_json::from_slice(body)?;
        if !value.is_object() {
            return Err(de::Error::custom("request body must be a JSON object"));
        }
        serde_json::from_value(value)
    }

    /// Whether reasoning should be hidden (defaults to `true`)
    #[must_use]
    pub fn hides_reasoning(&self) -> bool {
        self.hide_reasoning.unwrap_or(true)
    }

    /// Render the timeframe, or the unknown placeholder
    fn timeframe_label(&self) -> String {
        match &self.timeframe_months {
            None | Some(serde_json::Value::Null) => UNKNOWN_VALUE.to_string(),
            Some(serde_json::Value::String(s)) if s.is_empty() => UNKNOWN_VALUE.to_string(),
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }

    /// Field lines of the user message, in fixed order
    #[must_use]
    pub fn detail_lines(&self) -> Vec<(&'static str, String)> {
        vec![
            ("姓名", self.name.clone().unwrap_or_default()),
            ("背景", self.background.clone()),
            ("技能", self.skills.join(LIST_SEPARATOR)),
            ("目标岗位", self.target_role.clone()),
            ("时间范围(月)", self.timeframe_label()),
            ("偏好", self.preferences.join(LIST_SEPARATOR)),
            (
                "水平",
                self.level
                    .clone()
                    .filter(|l| !l.is_empty())
                    .unwrap_or_else(|| UNKNOWN_VALUE.to_string()),
            ),
        ]
    }

    /// Render the user message text
    #[must_use]
    pub fn user_prompt(&self) -> String {
        self.detail_lines()
            .into_iter()
            .map(|(label, value)| format!("{label}: {value}"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Build the outbound conversation: system instruction, then user details
    #[must_use]
    pub fn to_conversation(&self, system_prompt: &str) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(system_prompt),
            ChatMessage::user(self.user_prompt()),
        ]
    }
}
