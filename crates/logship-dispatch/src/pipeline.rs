//! Call-logging boundary.
//!
//! A [`LogCall`] describes what to record for a call site; a
//! [`CallOutcome`] is what happened. [`LogPipeline::record`] turns the
//! pair into a record and dispatches it. It never fails and never
//! panics on pipeline errors, so the logged operation is unaffected.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{error, trace};

use logship_core::{
    resolve, Bindings, DefaultLog, ExtensionValues, FieldValue, RecordFactory, RecordKind,
    RecordType,
};
use logship_core::logging;
use logship_core::naming::snake_case;

use crate::dispatcher::{DeliveryState, Dispatcher};

/// Status written for a call that returned normally.
pub const STATUS_SUCCESS: &str = "SUCCESS";
/// Status written for a call that returned an error.
pub const STATUS_FAILED: &str = "FAILED";

/// What to record for one call site.
#[derive(Debug, Clone)]
pub struct LogCall {
    /// Description template, see [`logship_core::template`].
    pub description: String,
    /// Record type; [`DefaultLog`] when unset.
    pub kind: Option<RecordKind>,
    pub module: String,
    pub target: String,
    /// Operation category, stored as `operation_type`.
    pub category: String,
    pub class_name: String,
    pub method_name: String,
    pub log_arguments: bool,
    pub log_result: bool,
    pub log_exception: bool,
    /// Override of the pipeline's async default.
    pub async_send: Option<bool>,
    /// Requested sink name.
    pub sink: Option<String>,
}

impl LogCall {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            kind: None,
            module: String::new(),
            target: String::new(),
            category: String::new(),
            class_name: String::new(),
            method_name: String::new(),
            log_arguments: false,
            log_result: false,
            log_exception: true,
            async_send: None,
            sink: None,
        }
    }

    pub fn with_type<R: RecordType + Default>(mut self) -> Self {
        self.kind = Some(RecordKind::of::<R>());
        self
    }

    pub fn with_kind(mut self, kind: RecordKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_metadata(
        mut self,
        module: impl Into<String>,
        target: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        self.module = module.into();
        self.target = target.into();
        self.category = category.into();
        self
    }

    pub fn with_method(mut self, class_name: impl Into<String>, method_name: impl Into<String>) -> Self {
        self.class_name = class_name.into();
        self.method_name = method_name.into();
        self
    }

    pub fn log_arguments(mut self, enabled: bool) -> Self {
        self.log_arguments = enabled;
        self
    }

    pub fn log_result(mut self, enabled: bool) -> Self {
        self.log_result = enabled;
        self
    }

    pub fn log_exception(mut self, enabled: bool) -> Self {
        self.log_exception = enabled;
        self
    }

    pub fn with_async(mut self, async_send: bool) -> Self {
        self.async_send = Some(async_send);
        self
    }

    pub fn with_sink(mut self, sink: impl Into<String>) -> Self {
        self.sink = Some(sink.into());
        self
    }
}

/// What happened during one call.
#[derive(Debug, Clone, Default)]
pub struct CallOutcome {
    /// Arguments in declaration order.
    pub arguments: Vec<(String, Value)>,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub elapsed: Duration,
}

impl CallOutcome {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_argument(mut self, name: impl Into<String>, value: Value) -> Self {
        self.arguments.push((name.into(), value));
        self
    }

    pub fn with_result(mut self, result: Value) -> Self {
        self.result = Some(result);
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self
    }

    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = elapsed;
        self
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Template bindings for a call.
pub fn call_bindings(call: &LogCall, outcome: &CallOutcome) -> Bindings {
    let mut bindings = Bindings::new()
        .with_arguments(&outcome.arguments)
        .with_method(&call.class_name, &call.method_name);
    if let Some(result) = &outcome.result {
        bindings = bindings.with_result(result.clone());
    }
    if let Some(message) = &outcome.error {
        bindings = bindings.with_error(message);
    }
    bindings
}

/// Extension values filled from call metadata and outcome. Arguments are
/// added under their declared name and, when different, its snake_case
/// form. Names the record type does not declare are dropped by the factory.
pub fn call_values(call: &LogCall, outcome: &CallOutcome) -> ExtensionValues {
    let mut values = ExtensionValues::new();
    let mut text = |name: &str, value: &str| {
        values.insert(name.to_string(), FieldValue::Text(value.to_string()));
    };
    text("module", &call.module);
    text("target", &call.target);
    text("operation_type", &call.category);
    text(
        "status",
        if outcome.is_success() {
            STATUS_SUCCESS
        } else {
            STATUS_FAILED
        },
    );

    values.insert(
        "response_time".to_string(),
        FieldValue::Long(i64::try_from(outcome.elapsed.as_millis()).unwrap_or(i64::MAX)),
    );

    if call.log_exception {
        if let Some(message) = &outcome.error {
            values.insert(
                "exception_message".to_string(),
                FieldValue::Text(message.clone()),
            );
        }
    }

    if call.log_arguments {
        let all: Vec<Value> = outcome.arguments.iter().map(|(_, v)| v.clone()).collect();
        values.insert("request_args".to_string(), FieldValue::Json(Value::Array(all)));
        for (name, value) in &outcome.arguments {
            let value = FieldValue::from_json(value);
            // `orderId` also fills the `order_id` field.
            let column = snake_case(name);
            if column != *name {
                values.entry(column).or_insert_with(|| value.clone());
            }
            values.insert(name.clone(), value);
        }
    }

    if call.log_result {
        if let Some(result) = &outcome.result {
            values.insert("response_data".to_string(), FieldValue::Json(result.clone()));
        }
    }

    values
}

/// Turns intercepted calls into dispatched records.
pub struct LogPipeline {
    factory: RecordFactory,
    dispatcher: Arc<Dispatcher>,
    async_default: bool,
}

impl LogPipeline {
    pub fn new(factory: RecordFactory, dispatcher: Arc<Dispatcher>, async_default: bool) -> Self {
        Self {
            factory,
            dispatcher,
            async_default,
        }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn factory(&self) -> &RecordFactory {
        &self.factory
    }

    /// Record one call. Errors are logged and swallowed.
    ///
    /// Returns the state reached before this method returned: `Dispatched`
    /// for queued async sends, `Failed` when the record could not be built.
    pub async fn record(&self, call: &LogCall, outcome: &CallOutcome) -> DeliveryState {
        let kind = call.kind.unwrap_or_else(RecordKind::of::<DefaultLog>);
        let description = resolve(&call.description, &call_bindings(call, outcome));
        let values = call_values(call, outcome);

        let record = match self.factory.create(&kind, &description, &values) {
            Ok(record) => record,
            Err(e) => {
                error!(
                    subsystem = logging::SUBSYSTEM_PIPELINE,
                    record_type = kind.name(),
                    error = %e,
                    "Failed to create log record"
                );
                return DeliveryState::Failed;
            }
        };
        trace!(
            subsystem = logging::SUBSYSTEM_PIPELINE,
            record_id = record.id(),
            record_type = record.type_name(),
            state = %DeliveryState::Created,
            "Record created"
        );

        if call.async_send.unwrap_or(self.async_default) {
            self.dispatcher.send_async(record, call.sink.as_deref());
            DeliveryState::Dispatched
        } else {
            self.dispatcher
                .send_isolated(record.as_ref(), call.sink.as_deref())
                .await
        }
    }

    /// Stop background delivery after draining queued records.
    pub async fn shutdown(&self) {
        self.dispatcher.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_call_values_success() {
        let call = LogCall::new("export").with_metadata("billing", "invoice", "EXPORT");
        let outcome = CallOutcome::new()
            .with_argument("invoiceId", json!("INV-1"))
            .with_elapsed(Duration::from_millis(42));

        let values = call_values(&call, &outcome);
        assert_eq!(values["module"], FieldValue::Text("billing".into()));
        assert_eq!(values["target"], FieldValue::Text("invoice".into()));
        assert_eq!(values["operation_type"], FieldValue::Text("EXPORT".into()));
        assert_eq!(values["status"], FieldValue::Text(STATUS_SUCCESS.into()));
        assert_eq!(values["response_time"], FieldValue::Long(42));
        assert!(!values.contains_key("request_args"));
        assert!(!values.contains_key("invoiceId"));
        assert!(!values.contains_key("exception_message"));
    }

    #[test]
    fn test_call_values_arguments_result_and_error() {
        let call = LogCall::new("x")
            .log_arguments(true)
            .log_result(true)
            .log_exception(true);
        let outcome = CallOutcome::new()
            .with_argument("orderId", json!("X1"))
            .with_argument("qty", json!(3))
            .with_result(json!({"ok": false}))
            .with_error("out of stock");

        let values = call_values(&call, &outcome);
        assert_eq!(values["status"], FieldValue::Text(STATUS_FAILED.into()));
        assert_eq!(
            values["exception_message"],
            FieldValue::Text("out of stock".into())
        );
        assert_eq!(values["request_args"], FieldValue::Json(json!(["X1", 3])));
        assert_eq!(values["orderId"], FieldValue::Text("X1".into()));
        assert_eq!(values["order_id"], FieldValue::Text("X1".into()));
        assert_eq!(values["qty"], FieldValue::Integer(3));
        assert!(!values.contains_key("Qty"));
        assert_eq!(values["response_data"], FieldValue::Json(json!({"ok": false})));
    }

    #[test]
    fn test_exception_not_logged_when_disabled() {
        let call = LogCall::new("x").log_exception(false);
        let outcome = CallOutcome::new().with_error("boom");
        let values = call_values(&call, &outcome);
        assert!(!values.contains_key("exception_message"));
        assert_eq!(values["status"], FieldValue::Text(STATUS_FAILED.into()));
    }

    #[test]
    fn test_bindings_expose_call() {
        let call = LogCall::new("x").with_method("OrderService", "cancel");
        let outcome = CallOutcome::new()
            .with_argument("orderId", json!("X1"))
            .with_result(json!(true))
            .with_error("late");
        let description = resolve(
            "#{#className}.#{#methodName}(#{#orderId}) -> #{#result}: #{#exceptionMessage}",
            &call_bindings(&call, &outcome),
        );
        assert_eq!(description, "OrderService.cancel(X1) -> true: late");
    }
}
