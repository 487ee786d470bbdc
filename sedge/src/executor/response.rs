//! The shapes execution hands back to the transport layer.

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::{
    executor::{ExecutionError, PathSegment, ResponseStream},
    maybe_async::MaybeAsync,
    value::{Object, Value},
};

/// The result of executing an operation, or of a request that failed before
/// execution.
///
/// `data` is present iff the operation produced one, possibly `null` from
/// bubbling. Serialization omits empty `errors` and absent fields.
#[derive(Clone, Debug, PartialEq)]
pub struct ExecutionResult {
    /// The response tree, when execution happened.
    pub data: Option<Value>,
    /// All errors recorded while producing `data`.
    pub errors: Vec<ExecutionError>,
    /// Whether more payloads follow; only set on incremental sequences.
    pub has_next: Option<bool>,
    /// Implementation-specific extra information.
    pub extensions: Option<Object>,
}

impl ExecutionResult {
    /// A response carrying only request errors; execution never started.
    pub fn from_errors(errors: Vec<ExecutionError>) -> Self {
        Self {
            data: None,
            errors,
            has_next: None,
            extensions: None,
        }
    }

    /// The final empty payload of an incremental sequence.
    pub(crate) fn terminal() -> Self {
        Self {
            data: None,
            errors: Vec::new(),
            has_next: Some(false),
            extensions: None,
        }
    }
}

impl Serialize for ExecutionResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        if !self.errors.is_empty() {
            map.serialize_entry("errors", &self.errors)?;
        }
        if let Some(data) = &self.data {
            map.serialize_entry("data", data)?;
        }
        if let Some(has_next) = self.has_next {
            map.serialize_entry("hasNext", &has_next)?;
        }
        if let Some(extensions) = &self.extensions {
            map.serialize_entry("extensions", &Value::Object(extensions.clone()))?;
        }
        map.end()
    }
}

/// One out-of-band payload of an incremental delivery: a sub-tree at `path`,
/// produced by a `@defer`red fragment or a `@stream`ed list element.
#[derive(Clone, Debug, PartialEq)]
pub struct ExecutionPatchResult {
    /// The completed sub-tree, `null` when the patch failed.
    pub data: Option<Value>,
    /// Where in the response the sub-tree belongs.
    pub path: Vec<PathSegment>,
    /// The label of the originating `@defer`/`@stream`, if one was given.
    pub label: Option<String>,
    /// Errors scoped to this patch.
    pub errors: Vec<ExecutionError>,
    /// Whether more payloads follow.
    pub has_next: bool,
    /// Implementation-specific extra information.
    pub extensions: Option<Object>,
}

impl Serialize for ExecutionPatchResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        if !self.errors.is_empty() {
            map.serialize_entry("errors", &self.errors)?;
        }
        if let Some(data) = &self.data {
            map.serialize_entry("data", data)?;
        }
        map.serialize_entry("path", &self.path)?;
        if let Some(label) = &self.label {
            map.serialize_entry("label", label)?;
        }
        map.serialize_entry("hasNext", &self.has_next)?;
        if let Some(extensions) = &self.extensions {
            map.serialize_entry("extensions", &Value::Object(extensions.clone()))?;
        }
        map.end()
    }
}

/// One item of an incremental response sequence.
#[derive(Clone, Debug, PartialEq)]
#[allow(missing_docs)]
pub enum AsyncExecutionResult {
    Result(ExecutionResult),
    Patch(ExecutionPatchResult),
}

impl AsyncExecutionResult {
    /// The `hasNext` marker of this payload.
    pub fn has_next(&self) -> Option<bool> {
        match self {
            Self::Result(r) => r.has_next,
            Self::Patch(p) => Some(p.has_next),
        }
    }
}

impl Serialize for AsyncExecutionResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Result(r) => r.serialize(serializer),
            Self::Patch(p) => p.serialize(serializer),
        }
    }
}

/// What a request ultimately produces: one result, or a sequence of them when
/// incremental delivery is active.
pub enum ExecutionOutcome {
    /// A complete response.
    Single(ExecutionResult),
    /// The initial response plus subsequent patches.
    Incremental(ResponseStream),
}

impl ExecutionOutcome {
    /// Unwraps a complete response, discarding an incremental one.
    pub fn into_single(self) -> Option<ExecutionResult> {
        match self {
            Self::Single(result) => Some(result),
            Self::Incremental(_) => None,
        }
    }

    /// Unwraps an incremental response sequence.
    pub fn into_stream(self) -> Option<ResponseStream> {
        match self {
            Self::Single(_) => None,
            Self::Incremental(stream) => Some(stream),
        }
    }
}

impl MaybeAsync<ExecutionOutcome> {
    /// Convenience for tests and simple hosts: drives the outcome to a single
    /// complete result, panicking on an incremental one.
    pub async fn into_result(self) -> ExecutionResult {
        let outcome = self.await;
        match outcome {
            ExecutionOutcome::Single(result) => result,
            ExecutionOutcome::Incremental(_) => {
                panic!("execution produced an incremental response")
            }
        }
    }
}
