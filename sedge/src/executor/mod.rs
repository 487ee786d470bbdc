//! Resolve the document to values.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, RwLock},
};

use fnv::FnvHashMap;
use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::{
    ast::{
        Definition, Document, Fragment, FromInputValue, InputValue, Operation, OperationType,
    },
    maybe_async::MaybeAsync,
    parser::{SourcePosition, Spanning},
    resolver::{
        default_field_resolver, default_type_resolver, ContextValue, FieldResolverFn,
        ResolvedValue, TypeResolverFn,
    },
    schema::{meta::MetaType, Schema},
    value::{Object, Value},
};

pub use self::response::{
    AsyncExecutionResult, ExecutionOutcome, ExecutionPatchResult, ExecutionResult,
};
pub(crate) use self::incremental::Dispatcher;
pub use self::incremental::ResponseStream;

pub(crate) mod collect;
pub(crate) mod complete;
pub(crate) mod incremental;
mod response;

/// The map of variables used for substitution during query execution.
pub type Variables = HashMap<String, InputValue>;

/// The number of variable-coercion errors reported before giving up.
const MAX_COERCION_ERRORS: usize = 50;

/// Error type for errors that occur during field resolution.
///
/// Field errors are represented by a human-readable error message and an
/// optional [`Value`] structure containing additional information.
///
/// They can be converted to from any type that implements [`fmt::Display`],
/// which makes error chaining with the `?` operator a breeze:
///
/// ```rust
/// # use sedge::FieldError;
/// fn get_string(data: Vec<u8>) -> Result<String, FieldError> {
///     let s = String::from_utf8(data)?;
///     Ok(s)
/// }
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct FieldError {
    message: String,
    extensions: Value,
}

impl<T: fmt::Display> From<T> for FieldError {
    fn from(e: T) -> Self {
        Self {
            message: e.to_string(),
            extensions: Value::Null,
        }
    }
}

impl FieldError {
    /// Constructs a new [`FieldError`] with additional data.
    ///
    /// The `extensions` parameter is added to the `"extensions"` field of the
    /// error object in the response. If it is [`Value::Null`], no extra data
    /// is included.
    #[must_use]
    pub fn new<T: fmt::Display>(e: T, extensions: Value) -> Self {
        Self {
            message: e.to_string(),
            extensions,
        }
    }

    /// Returns the `"message"` field of this [`FieldError`].
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the `"extensions"` field of this [`FieldError`].
    #[must_use]
    pub fn extensions(&self) -> &Value {
        &self.extensions
    }
}

/// The result of resolving the value of a field of type `T`.
pub type FieldResult<T> = Result<T, FieldError>;

/// A single segment of a response path: a response key or a list index.
#[derive(Clone, Debug, Eq, PartialEq)]
#[allow(missing_docs)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl Serialize for PathSegment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Key(k) => serializer.serialize_str(k),
            Self::Index(i) => serializer.serialize_u64(*i as u64),
        }
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(k) => f.write_str(k),
            Self::Index(i) => write!(f, "{i}"),
        }
    }
}

/// The location of a value inside the response, built up as completion
/// descends.
///
/// Paths are immutable cons lists: each descent allocates a new head node
/// sharing the whole ancestor chain. The optional type name on a node only
/// enriches diagnostics and takes no part in equality or linearization.
#[derive(Clone)]
pub struct ResponsePath(Option<Arc<PathNode>>);

struct PathNode {
    parent: ResponsePath,
    segment: PathSegment,
    type_name: Option<String>,
}

impl ResponsePath {
    /// The empty path pointing at the response root.
    pub fn root() -> Self {
        Self(None)
    }

    /// Descends into the response key `key`.
    pub fn append_key(&self, key: &str, type_name: Option<&str>) -> Self {
        Self(Some(Arc::new(PathNode {
            parent: self.clone(),
            segment: PathSegment::Key(key.into()),
            type_name: type_name.map(Into::into),
        })))
    }

    /// Descends into the list index `index`.
    pub fn append_index(&self, index: usize) -> Self {
        Self(Some(Arc::new(PathNode {
            parent: self.clone(),
            segment: PathSegment::Index(index),
            type_name: None,
        })))
    }

    /// The type-name hint recorded at the head of this path, if any.
    ///
    /// Diagnostic only; takes no part in equality or linearization.
    pub fn type_hint(&self) -> Option<&str> {
        self.0.as_ref()?.type_name.as_deref()
    }

    /// Flattens this path into its ordered segments, root first.
    pub fn linearize(&self) -> Vec<PathSegment> {
        let mut segments = Vec::new();
        self.collect_into(&mut segments);
        segments
    }

    fn collect_into(&self, acc: &mut Vec<PathSegment>) {
        if let Some(node) = &self.0 {
            node.parent.collect_into(acc);
            acc.push(node.segment.clone());
        }
    }
}

impl PartialEq for ResponsePath {
    fn eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (None, None) => true,
            (Some(a), Some(b)) => a.segment == b.segment && a.parent == b.parent,
            _ => false,
        }
    }
}

impl Eq for ResponsePath {}

impl fmt::Debug for ResponsePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.linearize()).finish()
    }
}

/// Error type for errors that occur during query execution.
///
/// All execution errors contain the source position in the query of the field
/// that failed to resolve, and the response path leading to it.
#[derive(Clone, Debug, PartialEq)]
pub struct ExecutionError {
    location: SourcePosition,
    path: Vec<PathSegment>,
    error: FieldError,
}

impl ExecutionError {
    /// Constructs a new execution error occurring at the beginning of the
    /// query, outside any field.
    pub fn at_origin(error: FieldError) -> Self {
        Self {
            location: SourcePosition::new_origin(),
            path: Vec::new(),
            error,
        }
    }

    pub(crate) fn new(location: SourcePosition, path: &ResponsePath, error: FieldError) -> Self {
        Self {
            location,
            path: path.linearize(),
            error,
        }
    }

    /// The underlying error.
    pub fn error(&self) -> &FieldError {
        &self.error
    }

    /// The source location _in the query_ of the field that failed to
    /// resolve.
    pub fn location(&self) -> &SourcePosition {
        &self.location
    }

    /// The path of response keys and list indices leading to the field that
    /// generated this error.
    pub fn path(&self) -> &[PathSegment] {
        &self.path
    }
}

impl Serialize for ExecutionError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(serde::Serialize)]
        struct Location {
            line: usize,
            column: usize,
        }

        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("message", self.error.message())?;
        map.serialize_entry(
            "locations",
            &[Location {
                line: self.location.line() + 1,
                column: self.location.column() + 1,
            }],
        )?;
        if !self.path.is_empty() {
            map.serialize_entry("path", &self.path)?;
        }
        if !self.error.extensions().is_null() {
            map.serialize_entry("extensions", self.error.extensions())?;
        }
        map.end()
    }
}

/// The append-only error accumulator a single execution (or a single patch)
/// writes into.
pub(crate) type ErrorSink = Arc<RwLock<Vec<ExecutionError>>>;

pub(crate) fn new_error_sink() -> ErrorSink {
    Arc::new(RwLock::new(Vec::new()))
}

pub(crate) fn drain_errors(sink: &ErrorSink) -> Vec<ExecutionError> {
    std::mem::take(&mut *sink.write().unwrap())
}

/// A response value that is either complete or still being produced, carrying
/// errors that must bubble through non-`null` boundaries.
pub(crate) type Completion = MaybeAsync<Result<Value, ExecutionError>>;

/// Field arguments after coercion against the variable scope.
///
/// Defaults have been applied and variable references substituted; values are
/// constant.
#[derive(Clone, Debug, Default)]
pub struct Arguments {
    args: IndexMap<String, InputValue>,
}

impl Arguments {
    pub(crate) fn new(args: IndexMap<String, InputValue>) -> Self {
        Self { args }
    }

    /// Gets and converts an argument into the desired type.
    ///
    /// Returns [`Some`] if the argument is present _and_ type conversion
    /// succeeds.
    pub fn get<T: FromInputValue>(&self, key: &str) -> Option<T> {
        self.args.get(key).and_then(InputValue::convert)
    }

    /// Gets the raw coerced value of an argument.
    pub fn get_input(&self, key: &str) -> Option<&InputValue> {
        self.args.get(key)
    }
}

/// Everything `execute` needs for one request.
pub struct ExecutionArgs {
    /// The validated schema to execute against.
    pub schema: Arc<Schema>,
    /// The parsed, validated executable document.
    pub document: Document,
    /// The value the root-type resolvers receive as their source.
    pub root_value: Option<ResolvedValue>,
    /// The opaque value handed through to every resolver.
    pub context_value: Option<ContextValue>,
    /// Variable values, already coerced from their transport representation.
    pub variable_values: Option<Variables>,
    /// Which operation to execute, when the document contains several.
    pub operation_name: Option<String>,
    /// Overrides the default property-lookup field resolver.
    pub field_resolver: Option<FieldResolverFn>,
    /// Overrides the default `__typename`-based type resolver.
    pub type_resolver: Option<TypeResolverFn>,
    /// The field resolver a subscription driver would use for the root
    /// subscription fields. Unused by plain execution.
    pub subscribe_field_resolver: Option<FieldResolverFn>,
}

impl ExecutionArgs {
    /// Constructs [`ExecutionArgs`] with all optional parts absent.
    pub fn new(schema: Arc<Schema>, document: Document) -> Self {
        Self {
            schema,
            document,
            root_value: None,
            context_value: None,
            variable_values: None,
            operation_name: None,
            field_resolver: None,
            type_resolver: None,
            subscribe_field_resolver: None,
        }
    }

    /// Sets the root value.
    pub fn root_value(mut self, root: impl Into<ResolvedValue>) -> Self {
        self.root_value = Some(root.into());
        self
    }

    /// Sets the opaque context value.
    pub fn context_value(mut self, context: ContextValue) -> Self {
        self.context_value = Some(context);
        self
    }

    /// Sets the variable values.
    pub fn variable_values(mut self, vars: Variables) -> Self {
        self.variable_values = Some(vars);
        self
    }

    /// Selects the operation to execute by name.
    pub fn operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }

    /// Overrides the default field resolver.
    pub fn field_resolver(mut self, resolver: FieldResolverFn) -> Self {
        self.field_resolver = Some(resolver);
        self
    }

    /// Overrides the default type resolver.
    pub fn type_resolver(mut self, resolver: TypeResolverFn) -> Self {
        self.type_resolver = Some(resolver);
        self
    }
}

/// The per-request environment: everything resolution needs to look at, plus
/// the error accumulator and the incremental dispatcher.
///
/// Lives exactly as long as one `execute` call; never shared across calls.
pub struct ExecutionContext {
    pub(crate) schema: Arc<Schema>,
    pub(crate) fragments: HashMap<String, Fragment>,
    pub(crate) root_value: ResolvedValue,
    pub(crate) context_value: ContextValue,
    pub(crate) operation: Spanning<Operation>,
    pub(crate) variables: Variables,
    pub(crate) field_resolver: FieldResolverFn,
    pub(crate) type_resolver: TypeResolverFn,
    pub(crate) subscribe_field_resolver: FieldResolverFn,
    pub(crate) errors: ErrorSink,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) subfields_memo:
        Mutex<FnvHashMap<usize, FnvHashMap<usize, Arc<collect::CollectedFields>>>>,
}

impl ExecutionContext {
    /// Validates the request and assembles the per-request environment.
    ///
    /// On failure, the returned request errors are the entire response; no
    /// execution happens.
    pub fn build(args: ExecutionArgs) -> Result<Self, Vec<ExecutionError>> {
        let operation = find_operation(&args.document, args.operation_name.as_deref())?;

        let mut fragments = HashMap::new();
        for def in &args.document {
            if let Definition::Fragment(f) = def {
                fragments.insert(f.item.name.item.clone(), f.item.clone());
            }
        }

        let variables = coerce_variable_values(
            &operation.item,
            args.variable_values.unwrap_or_default(),
        )?;

        let field_resolver = args
            .field_resolver
            .unwrap_or_else(|| Arc::new(default_field_resolver));
        let subscribe_field_resolver = args
            .subscribe_field_resolver
            .unwrap_or_else(|| Arc::new(default_field_resolver));

        Ok(Self {
            schema: args.schema,
            fragments,
            root_value: args.root_value.unwrap_or(ResolvedValue::Null),
            context_value: args.context_value.unwrap_or_else(|| Arc::new(())),
            operation,
            variables,
            field_resolver,
            type_resolver: args
                .type_resolver
                .unwrap_or_else(|| Arc::new(default_type_resolver)),
            subscribe_field_resolver,
            errors: new_error_sink(),
            dispatcher: Dispatcher::new(),
            subfields_memo: Mutex::new(FnvHashMap::default()),
        })
    }

    /// The schema the operation executes against.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The root value the operation started from.
    pub fn root_value(&self) -> &ResolvedValue {
        &self.root_value
    }

    /// The operation being executed.
    pub fn operation(&self) -> &Operation {
        &self.operation.item
    }

    /// The fragment definition named `name`, if the document contains one.
    pub fn fragment_by_name(&self, name: &str) -> Option<&Fragment> {
        self.fragments.get(name)
    }

    /// The coerced variable values of the request.
    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    /// The resolver a subscription driver should use for the root
    /// subscription fields. Plain execution never calls it.
    pub fn subscribe_field_resolver(&self) -> &FieldResolverFn {
        &self.subscribe_field_resolver
    }

    /// Appends an error to the request's error accumulator.
    pub fn push_error(&self, error: ExecutionError) {
        self.errors.write().unwrap().push(error);
    }
}

fn find_operation(
    document: &Document,
    operation_name: Option<&str>,
) -> Result<Spanning<Operation>, Vec<ExecutionError>> {
    let mut operation = None;
    for def in document {
        if let Definition::Operation(op) = def {
            match operation_name {
                None => {
                    if operation.is_some() {
                        return Err(vec![ExecutionError::at_origin(
                            "Must provide operation name if query contains multiple operations."
                                .into(),
                        )]);
                    }
                    operation = Some(op);
                }
                Some(name) => {
                    if op.item.name.as_ref().map(|n| n.item.as_str()) == Some(name) {
                        operation = Some(op);
                    }
                }
            }
        }
    }

    match operation {
        Some(op) => Ok(op.clone()),
        None => Err(vec![ExecutionError::at_origin(match operation_name {
            Some(name) => format!("Unknown operation named \"{name}\".").into(),
            None => "Must provide an operation.".into(),
        })]),
    }
}

/// Pre-binds the operation's declared variables: applies defaults and rejects
/// missing or `null` values for required variables.
///
/// Coercion of raw transport values into schema input types happens before
/// values reach this crate; here only presence and nullability are enforced.
fn coerce_variable_values(
    operation: &Operation,
    provided: Variables,
) -> Result<Variables, Vec<ExecutionError>> {
    let Some(definitions) = &operation.variable_definitions else {
        return Ok(provided);
    };

    let mut coerced = Variables::new();
    let mut errors = Vec::new();

    for (name, def) in &definitions.item.items {
        if errors.len() >= MAX_COERCION_ERRORS {
            break;
        }
        let var_type = &def.var_type.item;
        match provided.get(&name.item) {
            Some(value) if value.is_null() && var_type.is_non_null() => {
                errors.push(ExecutionError::new(
                    name.span.start,
                    &ResponsePath::root(),
                    format!(
                        "Variable \"${}\" of non-null type \"{var_type}\" must not be null.",
                        name.item,
                    )
                    .into(),
                ));
            }
            Some(value) => {
                coerced.insert(name.item.clone(), value.clone());
            }
            None => {
                if let Some(default) = &def.default_value {
                    coerced.insert(
                        name.item.clone(),
                        default.item.clone().into_const(&Variables::new()),
                    );
                } else if var_type.is_non_null() {
                    errors.push(ExecutionError::new(
                        name.span.start,
                        &ResponsePath::root(),
                        format!(
                            "Variable \"${}\" of required type \"{var_type}\" was not provided.",
                            name.item,
                        )
                        .into(),
                    ));
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(coerced)
    } else {
        Err(errors)
    }
}

/// Runs a full request: context construction, operation execution, response
/// shaping.
pub(crate) fn execute_request(args: ExecutionArgs) -> MaybeAsync<ExecutionOutcome> {
    let ctx = match ExecutionContext::build(args) {
        Ok(ctx) => Arc::new(ctx),
        Err(errors) => {
            return MaybeAsync::Ready(ExecutionOutcome::Single(ExecutionResult::from_errors(
                errors,
            )))
        }
    };

    tracing::debug!(
        operation = %ctx.operation.item.operation_type,
        "executing operation"
    );

    match execute_operation(&ctx) {
        MaybeAsync::Ready(result) => MaybeAsync::Ready(build_response(ctx, result)),
        MaybeAsync::Pending(fut) => {
            MaybeAsync::pending(async move { build_response(ctx, fut.await) })
        }
    }
}

/// Shapes the initial response and decides between a bare result and an
/// incremental sequence.
fn build_response(
    ctx: Arc<ExecutionContext>,
    result: Result<Value, ExecutionError>,
) -> ExecutionOutcome {
    let data = match result {
        Ok(value) => value,
        Err(error) => {
            ctx.push_error(error);
            Value::Null
        }
    };

    let initial = ExecutionResult {
        data: Some(data),
        errors: drain_errors(&ctx.errors),
        has_next: None,
        extensions: None,
    };

    if ctx.dispatcher.has_pending() {
        ExecutionOutcome::Incremental(ResponseStream::new(ctx, initial))
    } else {
        ExecutionOutcome::Single(initial)
    }
}

/// Executes the context's operation against its root value.
pub(crate) fn execute_operation(ctx: &Arc<ExecutionContext>) -> Completion {
    let op = &ctx.operation;
    let op_type = op.item.operation_type;

    let root_type = match ctx.schema.root_type(op_type) {
        Some(t) => t.clone(),
        None => {
            return MaybeAsync::Ready(Err(ExecutionError::new(
                op.span.start,
                &ResponsePath::root(),
                format!("Schema is not configured to execute {op_type} operation.").into(),
            )))
        }
    };

    let collected = collect::collect_fields(ctx, &root_type, &op.item.selection_set);
    let path = ResponsePath::root();
    let source = ctx.root_value.clone();

    let result = match op_type {
        OperationType::Mutation => {
            execute_fields_serially(ctx, &root_type, source.clone(), &path, &collected.fields)
        }
        OperationType::Query | OperationType::Subscription => execute_fields(
            ctx,
            &root_type,
            source.clone(),
            &path,
            &collected.fields,
            &ctx.errors,
        ),
    };

    for patch in &collected.patches {
        let patch_errors = new_error_sink();
        let value = execute_fields(
            ctx,
            &root_type,
            source.clone(),
            &path,
            &patch.fields,
            &patch_errors,
        );
        ctx.dispatcher
            .add_fields(value, patch_errors, patch.label.clone(), &path);
    }

    result
}

/// Executes a grouped field set in parallel: every field's resolution is
/// started before any of them is awaited, and the results are recombined in
/// collection order.
pub(crate) fn execute_fields(
    ctx: &Arc<ExecutionContext>,
    parent_type: &Arc<MetaType>,
    source: ResolvedValue,
    path: &ResponsePath,
    fields: &collect::GroupedFieldSet,
    errors: &ErrorSink,
) -> Completion {
    let mut pairs = Vec::with_capacity(fields.len());
    for (response_name, nodes) in fields {
        if let Some(completion) =
            complete::execute_field(ctx, parent_type, source.clone(), nodes, path, errors)
        {
            pairs.push((response_name.clone(), completion));
        }
    }

    MaybeAsync::all_keyed(pairs).map(|resolved| {
        let mut object = Object::with_capacity(resolved.len());
        for (key, value) in resolved {
            object.add_field(key, value?);
        }
        Ok(Value::Object(object))
    })
}

/// Executes a grouped field set serially: each field starts only after the
/// previous one has fully settled, sub-selections included.
///
/// Used for mutation root fields. Patches queued by a settled field are not
/// flushed before the next field starts; they are delivered after the initial
/// result like everywhere else.
fn execute_fields_serially(
    ctx: &Arc<ExecutionContext>,
    parent_type: &Arc<MetaType>,
    source: ResolvedValue,
    path: &ResponsePath,
    fields: &collect::GroupedFieldSet,
) -> Completion {
    let mut object = Object::with_capacity(fields.len());
    let mut iter = fields.clone().into_iter();

    while let Some((response_name, nodes)) = iter.next() {
        let Some(completion) =
            complete::execute_field(ctx, parent_type, source.clone(), &nodes, path, &ctx.errors)
        else {
            continue;
        };
        match completion {
            MaybeAsync::Ready(Ok(value)) => {
                object.add_field(response_name, value);
            }
            MaybeAsync::Ready(Err(error)) => return MaybeAsync::Ready(Err(error)),
            MaybeAsync::Pending(fut) => {
                let ctx = Arc::clone(ctx);
                let parent_type = Arc::clone(parent_type);
                let path = path.clone();
                return MaybeAsync::pending(async move {
                    object.add_field(response_name, fut.await?);
                    for (response_name, nodes) in iter {
                        let Some(completion) = complete::execute_field(
                            &ctx,
                            &parent_type,
                            source.clone(),
                            &nodes,
                            &path,
                            &ctx.errors,
                        ) else {
                            continue;
                        };
                        object.add_field(response_name, completion.await?);
                    }
                    Ok(Value::Object(object))
                });
            }
        }
    }

    MaybeAsync::Ready(Ok(Value::Object(object)))
}
