//! Event log entries.
//!
//! Every command that touches a files database records what it did as
//! events in the `log` table. Operations are named `command:operation`,
//! e.g. `identify:start` or `edit.action:edit`.

use chrono::{DateTime, Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::Level;
use uuid::Uuid;

use crate::error::CoreError;
use crate::files::FileType;
use crate::version::VERSION;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub file_uuid: Option<Uuid>,
    pub file_type: Option<FileType>,
    /// Local time without offset, as stored in the log table.
    pub time: NaiveDateTime,
    pub operation: String,
    pub data: Option<Value>,
    pub reason: Option<String>,
}

/// Which of the optional fields to include in an event message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ShowArgs {
    /// Include uuid, data and reason.
    #[default]
    All,
    /// Only the operation.
    None,
    /// Only the listed fields (`"uuid"`, `"data"`, `"reason"`).
    Only(Vec<&'static str>),
}

/// Formatting options for [`Event::message`].
#[derive(Debug, Clone, Default)]
pub struct MessageOptions {
    /// With [`ShowArgs::All`], include fields that are unset.
    pub show_null: bool,
    pub show_args: ShowArgs,
    /// Extra `key=value` pairs appended to the message.
    pub extra: Vec<(String, String)>,
}

impl MessageOptions {
    pub fn operation_only() -> Self {
        Self {
            show_args: ShowArgs::None,
            ..Self::default()
        }
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.extra.push((key.into(), value.to_string()));
        self
    }
}

impl Event {
    /// Create an event for a command. `command` is the dotted command path
    /// (`"edit.action"`); surrounding `:` and `.` are trimmed from it and `:`
    /// from `operation`.
    pub fn from_command(command: &str, operation: &str) -> Self {
        let command = command.trim_matches(|c| c == ':' || c == '.');
        let operation = operation.trim_matches(':');
        Self {
            file_uuid: None,
            file_type: None,
            time: Local::now().naive_local(),
            operation: format!("{command}:{operation}"),
            data: None,
            reason: None,
        }
    }

    pub fn with_file(mut self, uuid: Uuid, file_type: FileType) -> Self {
        self.file_uuid = Some(uuid);
        self.file_type = Some(file_type);
        self
    }

    pub fn with_data(mut self, data: impl Into<Value>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_time(mut self, time: DateTime<Local>) -> Self {
        self.time = time.naive_local();
        self
    }

    /// Add the library version and the command parameters to the data.
    ///
    /// Unset data becomes `{"acacore": VERSION, "params": params}`, an
    /// object gets the two keys merged in, and an array gets the object
    /// appended. Any other data is an error.
    pub fn with_params(mut self, params: Value) -> Result<Self, CoreError> {
        let mut entry = serde_json::Map::new();
        entry.insert("acacore".to_string(), Value::String(VERSION.to_string()));
        entry.insert("params".to_string(), params);

        self.data = match self.data.take() {
            None => Some(Value::Object(entry)),
            Some(Value::Object(mut map)) => {
                map.extend(entry);
                Some(Value::Object(map))
            }
            Some(Value::Array(mut list)) => {
                list.push(Value::Object(entry));
                Some(Value::Array(list))
            }
            Some(other) => {
                return Err(CoreError::Validation(format!(
                    "cannot add parameters to event data of type {}",
                    json_type(&other)
                )))
            }
        };

        Ok(self)
    }

    /// Check that file uuid and file type are set together.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.file_uuid.is_some() != self.file_type.is_some() {
            return Err(CoreError::Validation("uuid and file type must be set together".to_string()));
        }
        Ok(())
    }

    /// Format the event as `{operation} uuid={type}:{uuid} data={data} reason={reason}`.
    pub fn message(&self, options: &MessageOptions) -> String {
        let uuid = match (self.file_type, self.file_uuid) {
            (Some(file_type), Some(uuid)) => Some(format!("{file_type}:{uuid}")),
            (None, Some(uuid)) => Some(uuid.to_string()),
            _ => None,
        };
        let data = self.data.as_ref().map(Value::to_string);
        let reason = self.reason.as_deref().map(str::trim);

        let mut message = self.operation.clone();
        let mut push = |key: &str, value: Option<&str>, always: bool| {
            if let Some(value) = value {
                message.push_str(&format!(" {key}={value}"));
            } else if always {
                message.push_str(&format!(" {key}=null"));
            }
        };

        match &options.show_args {
            ShowArgs::None => {}
            ShowArgs::All => {
                push("uuid", uuid.as_deref(), options.show_null);
                push("data", data.as_deref(), options.show_null);
                push("reason", reason, options.show_null);
            }
            ShowArgs::Only(fields) => {
                for (key, value) in [("uuid", uuid.as_deref()), ("data", data.as_deref()), ("reason", reason)] {
                    if fields.contains(&key) {
                        push(key, value, true);
                    }
                }
            }
        }

        for (key, value) in &options.extra {
            message.push_str(&format!(" {}={value}", key.trim()));
        }

        message
    }

    /// Emit the event message through `tracing` at the given level.
    pub fn log(&self, level: Level, options: &MessageOptions) {
        let message = self.message(options);
        match level {
            Level::ERROR => tracing::error!("{message}"),
            Level::WARN => tracing::warn!("{message}"),
            Level::INFO => tracing::info!("{message}"),
            Level::DEBUG => tracing::debug!("{message}"),
            Level::TRACE => tracing::trace!("{message}"),
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    #[test]
    fn operation_is_trimmed_and_joined() {
        let event = Event::from_command(".edit.action:", ":edit:");
        assert_eq!(event.operation, "edit.action:edit");
        assert!(event.validate().is_ok());
    }

    #[test]
    fn params_fill_empty_data() {
        let event = Event::from_command("identify", "start")
            .with_params(json!({"root": "/data"}))
            .unwrap();
        assert_eq!(event.data, Some(json!({"acacore": VERSION, "params": {"root": "/data"}})));
    }

    #[test]
    fn params_merge_into_object_and_append_to_array() {
        let event = Event::from_command("identify", "start")
            .with_data(json!({"version": "1.0.0"}))
            .with_params(json!({}))
            .unwrap();
        assert_eq!(event.data, Some(json!({"version": "1.0.0", "acacore": VERSION, "params": {}})));

        let event = Event::from_command("identify", "start")
            .with_data(json!([1]))
            .with_params(json!({}))
            .unwrap();
        assert_eq!(event.data, Some(json!([1, {"acacore": VERSION, "params": {}}])));
    }

    #[test]
    fn params_reject_scalar_data() {
        let result = Event::from_command("identify", "start").with_data("text").with_params(json!({}));
        assert_matches!(result, Err(CoreError::Validation(_)));
    }

    #[test]
    fn uuid_without_type_is_invalid() {
        let mut event = Event::from_command("a", "b");
        event.file_uuid = Some(Uuid::nil());
        assert!(event.validate().is_err());
    }

    #[test]
    fn message_shows_set_fields() {
        let event = Event::from_command("edit", "action")
            .with_file(Uuid::nil(), FileType::Original)
            .with_reason("  fixed  ");
        assert_eq!(
            event.message(&MessageOptions::default()),
            "edit:action uuid=original:00000000-0000-0000-0000-000000000000 reason=fixed"
        );
    }

    #[test]
    fn message_show_null_and_operation_only() {
        let event = Event::from_command("identify", "end");
        let options = MessageOptions {
            show_null: true,
            ..MessageOptions::default()
        };
        assert_eq!(event.message(&options), "identify:end uuid=null data=null reason=null");
        assert_eq!(event.message(&MessageOptions::operation_only()), "identify:end");
    }

    #[test]
    fn message_with_selected_fields_and_extra() {
        let event = Event::from_command("identify", "file")
            .with_file(Uuid::nil(), FileType::Master)
            .with_data(json!({"puid": "fmt/18"}));
        let options = MessageOptions {
            show_args: ShowArgs::Only(vec!["data"]),
            ..MessageOptions::default()
        }
        .with_extra(" path ", "a/b.pdf");
        assert_eq!(event.message(&options), r#"identify:file data={"puid":"fmt/18"} path=a/b.pdf"#);
    }
}
