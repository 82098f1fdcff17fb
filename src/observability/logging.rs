//! Structured logging facade.
//!
//! # Responsibilities
//! - Build the `tracing` backend from a configured level
//! - Offer leveled writes that take backend-agnostic [`Field`]s
//! - Encode domain errors as structured objects
//!
//! # Design Decisions
//! - Each logger owns its own `Dispatch`; nothing is installed globally here
//! - JSON output, one object per line, message under `message` and every
//!   field as a top-level member
//! - Debug level annotates entries with the caller location

use std::error::Error as StdError;
use std::fmt::{self, Write as _};
use std::panic::Location;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::field::{Field as EventField, Visit};
use tracing::level_filters::LevelFilter;
use tracing::{Dispatch, Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::{FormatTime, SystemTime};
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields, MakeWriter};
use tracing_subscriber::registry::LookupSpan;

use crate::error::Error as DomainError;

/// Structured key/value attached to a log entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    key: String,
    value: Value,
}

impl Field {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &Value {
        &self.value
    }
}

pub fn string(key: impl Into<String>, value: impl Into<String>) -> Field {
    Field {
        key: key.into(),
        value: Value::String(value.into()),
    }
}

/// Any serializable value. Values that fail to serialize are logged as a note.
pub fn any<T: Serialize + ?Sized>(key: impl Into<String>, value: &T) -> Field {
    let value = serde_json::to_value(value)
        .unwrap_or_else(|e| Value::String(format!("<unserializable: {e}>")));
    Field {
        key: key.into(),
        value,
    }
}

pub fn int64(key: impl Into<String>, value: i64) -> Field {
    Field {
        key: key.into(),
        value: Value::from(value),
    }
}

pub fn uint64(key: impl Into<String>, value: u64) -> Field {
    Field {
        key: key.into(),
        value: Value::from(value),
    }
}

/// Error field under key `error`.
///
/// A domain error anywhere in the source chain is logged as
/// `{code, message, params}`; its cause is left out. Other errors are logged
/// by their display text.
pub fn error(err: &(dyn StdError + 'static)) -> Field {
    let value = match DomainError::find(err) {
        Some(domain) => domain_error_object(domain),
        None => Value::String(err.to_string()),
    };
    Field {
        key: "error".to_string(),
        value,
    }
}

fn domain_error_object(err: &DomainError) -> Value {
    let params: Map<String, Value> = err
        .params()
        .iter()
        .map(|param| (param.key.clone(), Value::String(param.value.clone())))
        .collect();

    let mut object = Map::new();
    object.insert("message".to_string(), Value::String(err.message().to_string()));
    object.insert("code".to_string(), Value::from(err.code().as_u32()));
    object.insert("params".to_string(), Value::Object(params));
    Value::Object(object)
}

#[derive(Debug, thiserror::Error)]
pub enum LoggerError {
    #[error("unrecognized log level {0:?}")]
    Level(String),
}

fn parse_level(level: &str) -> Result<LevelFilter, LoggerError> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok(LevelFilter::TRACE),
        "debug" => Ok(LevelFilter::DEBUG),
        "" | "info" => Ok(LevelFilter::INFO),
        "warn" | "warning" => Ok(LevelFilter::WARN),
        "error" | "dpanic" | "panic" | "fatal" => Ok(LevelFilter::ERROR),
        _ => Err(LoggerError::Level(level.to_string())),
    }
}

/// Leveled structured logger.
///
/// Cheap to clone and safe to share across request tasks.
#[derive(Debug, Clone)]
pub struct Logger {
    dispatch: Dispatch,
    fields: Arc<[Field]>,
    caller: bool,
}

impl Logger {
    /// Logger writing JSON lines to stdout.
    pub fn new(level: &str) -> Result<Self, LoggerError> {
        Self::with_writer(level, std::io::stdout)
    }

    /// Logger writing JSON lines to `writer`.
    pub fn with_writer<W>(level: &str, writer: W) -> Result<Self, LoggerError>
    where
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        let filter = parse_level(level)?;
        let development = filter >= LevelFilter::DEBUG;

        let subscriber = tracing_subscriber::fmt()
            .event_format(JsonLines::default())
            .with_max_level(filter)
            .with_writer(writer)
            .finish();

        Ok(Self {
            dispatch: Dispatch::new(subscriber),
            fields: Arc::from(Vec::new()),
            caller: development,
        })
    }

    /// Backend dispatcher, for routing third-party `tracing` events here.
    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    /// Derived logger with extra persistent fields. `self` is unchanged.
    pub fn with(&self, fields: &[Field]) -> Logger {
        if fields.is_empty() {
            return self.clone();
        }
        let combined: Vec<Field> = self.fields.iter().chain(fields).cloned().collect();
        Logger {
            dispatch: self.dispatch.clone(),
            fields: Arc::from(combined),
            caller: self.caller,
        }
    }

    #[track_caller]
    pub fn debug(&self, message: &str, fields: &[Field]) {
        self.emit(Level::DEBUG, message, fields, Location::caller());
    }

    #[track_caller]
    pub fn info(&self, message: &str, fields: &[Field]) {
        self.emit(Level::INFO, message, fields, Location::caller());
    }

    #[track_caller]
    pub fn warn(&self, message: &str, fields: &[Field]) {
        self.emit(Level::WARN, message, fields, Location::caller());
    }

    #[track_caller]
    pub fn error(&self, message: &str, fields: &[Field]) {
        self.emit(Level::ERROR, message, fields, Location::caller());
    }

    /// Log at error level and exit the process with status 1.
    ///
    /// Reserved for unrecoverable startup failures.
    #[track_caller]
    pub fn fatal(&self, message: &str, fields: &[Field]) -> ! {
        self.emit(Level::ERROR, message, fields, Location::caller());
        std::process::exit(1)
    }

    /// Log at error level, then panic with `message`.
    #[track_caller]
    pub fn panic(&self, message: &str, fields: &[Field]) -> ! {
        self.emit(Level::ERROR, message, fields, Location::caller());
        panic!("{message}")
    }

    fn emit(&self, level: Level, message: &str, fields: &[Field], caller: &Location<'_>) {
        let mut rendered = Map::new();
        if self.caller {
            rendered.insert(
                "caller".to_string(),
                Value::String(format!("{}:{}", caller.file(), caller.line())),
            );
        }
        for field in self.fields.iter().chain(fields) {
            rendered.insert(field.key.clone(), field.value.clone());
        }
        let rendered = Rendered(rendered);

        tracing::dispatcher::with_default(&self.dispatch, || {
            if level == Level::ERROR {
                tracing::error!(fields = %rendered, "{}", message);
            } else if level == Level::WARN {
                tracing::warn!(fields = %rendered, "{}", message);
            } else if level == Level::INFO {
                tracing::info!(fields = %rendered, "{}", message);
            } else if level == Level::DEBUG {
                tracing::debug!(fields = %rendered, "{}", message);
            } else {
                tracing::trace!(fields = %rendered, "{}", message);
            }
        });
    }
}

/// Name under which [`Logger`] hands its merged fields to the formatter.
const MERGED_FIELDS: &str = "fields";

struct Rendered(Map<String, Value>);

impl fmt::Display for Rendered {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(&self.0).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

/// One JSON object per line. The merged [`Logger`] fields become top-level
/// members; fields of third-party events are kept as they were recorded.
#[derive(Debug, Default)]
struct JsonLines {
    timer: SystemTime,
}

impl<S, N> FormatEvent<S, N> for JsonLines
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut entry = Map::new();
        event.record(&mut EntryVisitor(&mut entry));
        entry.insert(
            "level".to_string(),
            Value::String(event.metadata().level().to_string()),
        );

        let members = serde_json::to_string(&entry).map_err(|_| fmt::Error)?;
        writer.write_str("{\"timestamp\":\"")?;
        self.timer.format_time(&mut writer)?;
        writer.write_str("\",")?;
        // `entry` is never empty, so `members` is `{...}` with content.
        writer.write_str(&members[1..])?;
        writeln!(writer)
    }
}

struct EntryVisitor<'a>(&'a mut Map<String, Value>);

impl EntryVisitor<'_> {
    fn insert(&mut self, field: &EventField, value: Value) {
        self.0.insert(field.name().to_string(), value);
    }
}

impl Visit for EntryVisitor<'_> {
    fn record_debug(&mut self, field: &EventField, value: &dyn fmt::Debug) {
        let text = format!("{value:?}");
        if field.name() == MERGED_FIELDS {
            if let Ok(Value::Object(fields)) = serde_json::from_str::<Value>(&text) {
                self.0.extend(fields);
                return;
            }
        }
        self.insert(field, Value::String(text));
    }

    fn record_str(&mut self, field: &EventField, value: &str) {
        self.insert(field, Value::String(value.to_string()));
    }

    fn record_i64(&mut self, field: &EventField, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &EventField, value: u64) {
        self.insert(field, Value::from(value));
    }

    fn record_f64(&mut self, field: &EventField, value: f64) {
        self.insert(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &EventField, value: bool) {
        self.insert(field, Value::Bool(value));
    }
}


#[cfg(test)]
mod tests {
    use super::capture::CapturedLogs;
    use super::*;
    use crate::error::ErrorCode;

    fn logger(level: &str) -> (Logger, CapturedLogs) {
        let logs = CapturedLogs::default();
        (Logger::with_writer(level, logs.clone()).unwrap(), logs)
    }

    #[derive(Debug, thiserror::Error)]
    #[error("loading widget: {0}")]
    struct Wrapped(#[source] DomainError);

    #[test]
    fn rejects_unknown_level() {
        assert!(matches!(Logger::new("loud"), Err(LoggerError::Level(l)) if l == "loud"));
    }

    #[test]
    fn writes_message_level_and_fields() {
        let (log, logs) = logger("info");
        log.info("server ready", &[string("address", "127.0.0.1:80"), uint64("workers", 4)]);

        let entries = logs.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["message"], "server ready");
        assert_eq!(entries[0]["level"], "INFO");
        assert_eq!(entries[0]["address"], "127.0.0.1:80");
        assert_eq!(entries[0]["workers"], 4);
        assert!(entries[0]["timestamp"].is_string());
        assert!(entries[0].get("fields").is_none());
    }

    #[test]
    fn level_filters_lower_entries() {
        let (log, logs) = logger("warn");
        log.debug("hidden", &[]);
        log.info("hidden", &[]);
        log.warn("shown", &[]);
        log.error("shown", &[]);

        let entries = logs.entries();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e["message"] == "shown"));
    }

    #[test]
    fn debug_level_records_caller() {
        let (log, logs) = logger("debug");
        log.debug("probe", &[]);
        let entry = &logs.entries()[0];
        assert!(entry["caller"].as_str().unwrap().contains("logging.rs"));
    }

    #[test]
    fn with_derives_without_touching_parent() {
        let (parent, logs) = logger("info");
        let child = parent.with(&[string("component", "http")]);

        child.info("from child", &[int64("attempt", -1)]);
        parent.info("from parent", &[]);

        let entries = logs.entries();
        assert_eq!(entries[0]["component"], "http");
        assert_eq!(entries[0]["attempt"], -1);
        assert!(entries[1].get("component").is_none());
    }

    #[test]
    fn domain_error_field_is_structured_without_cause() {
        let err = DomainError::new(ErrorCode::NotFound, "no such widget")
            .with_param("id", "42")
            .with_cause(std::io::Error::other("disk on fire"));

        let field = error(&err);
        assert_eq!(field.key(), "error");
        assert_eq!(
            field.value(),
            &serde_json::json!({"code": 5, "message": "no such widget", "params": {"id": "42"}})
        );
        assert!(!field.value().to_string().contains("disk on fire"));
    }

    #[test]
    fn logged_domain_error_is_queryable_by_code() {
        let (log, logs) = logger("info");
        log.error(
            "failed",
            &[error(&DomainError::new(ErrorCode::NotFound, "gone").with_param("id", "7"))],
        );

        let entry = &logs.entries()[0];
        assert_eq!(entry.pointer("/error/code"), Some(&serde_json::json!(5)));
        assert_eq!(entry.pointer("/error/message"), Some(&serde_json::json!("gone")));
        assert_eq!(entry.pointer("/error/params/id"), Some(&serde_json::json!("7")));
    }

    #[test]
    fn third_party_events_keep_their_fields() {
        let (log, logs) = logger("info");
        tracing::dispatcher::with_default(log.dispatch(), || {
            tracing::info!(peer = "10.0.0.1", retries = 3u64, "accepted");
        });

        let entry = &logs.entries()[0];
        assert_eq!(entry["message"], "accepted");
        assert_eq!(entry["peer"], "10.0.0.1");
        assert_eq!(entry["retries"], 3);
    }

    #[test]
    fn wrapped_domain_error_is_found() {
        let field = error(&Wrapped(DomainError::entity_not_found()));
        assert_eq!(field.value()["code"], 5);
    }

    #[test]
    fn plain_error_field_uses_display() {
        let io = std::io::Error::other("connection refused");
        assert_eq!(error(&io).value(), &Value::String("connection refused".into()));
    }

    #[test]
    fn any_serializes_values() {
        assert_eq!(any("tags", &["a", "b"]).value(), &serde_json::json!(["a", "b"]));
    }

    #[test]
    #[should_panic(expected = "cannot continue")]
    fn panic_logs_then_panics() {
        let (log, _logs) = logger("error");
        log.panic("cannot continue", &[]);
    }
}
