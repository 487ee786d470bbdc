//! The dynamic value model seen by field resolvers.
//!
//! Resolvers consume a [`ResolvedValue`] as their source and produce another
//! one, either immediately or through a future. Object sources carry property
//! tables whose entries are plain values or resolver closures; the default
//! field resolver bridges the two by looking properties up by field name and
//! invoking the ones that are functions.

use std::{any::Any, fmt, pin::Pin, sync::Arc, sync::Mutex};

use futures::Stream;
use indexmap::IndexMap;

use crate::{
    ast::{FieldNode, Type},
    executor::{Arguments, ExecutionContext, FieldError, FieldResult, ResponsePath},
    maybe_async::MaybeAsync,
    schema::meta::MetaType,
    value::ScalarValue,
};

/// The opaque per-request context value handed through to every resolver.
pub type ContextValue = Arc<dyn Any + Send + Sync>;

/// An asynchronous sequence of raw values, as produced by a streaming
/// resolver. Items may individually fail.
pub type ResolvedStream = Pin<Box<dyn Stream<Item = FieldResult<ResolvedValue>> + Send>>;

/// What a resolver returns: a raw value or an error, possibly pending.
pub type ResolverResult = MaybeAsync<FieldResult<ResolvedValue>>;

/// A field resolver: `(source, args, context, info)` to a raw value.
pub type FieldResolverFn =
    Arc<dyn Fn(&ResolvedValue, &Arguments, &ContextValue, &ResolveInfo) -> ResolverResult + Send + Sync>;

/// A type resolver for abstract types: names the concrete object type a raw
/// value belongs to.
pub type TypeResolverFn = Arc<
    dyn Fn(&ResolvedValue, &ContextValue, &ResolveInfo, &str) -> MaybeAsync<FieldResult<String>>
        + Send
        + Sync,
>;

/// A predicate deciding whether a raw value belongs to an object type.
pub type IsTypeOfFn = Arc<dyn Fn(&ResolvedValue, &ContextValue) -> MaybeAsync<bool> + Send + Sync>;

/// A property resolver on an object source, invoked with
/// `(args, context, info)`.
pub type PropertyFn =
    Arc<dyn Fn(&Arguments, &ContextValue, &ResolveInfo) -> ResolverResult + Send + Sync>;

/// A raw value flowing out of resolvers and into value completion.
#[derive(Clone)]
pub enum ResolvedValue {
    /// The absent value.
    Null,
    /// A leaf value.
    Scalar(ScalarValue),
    /// A finite list of raw values.
    List(Vec<ResolvedValue>),
    /// An object-like value with named properties.
    Object(Arc<ObjectSource>),
    /// An asynchronous sequence of raw values.
    Stream(StreamSource),
}

impl ResolvedValue {
    /// Constructs a leaf value.
    pub fn scalar<T: Into<ScalarValue>>(v: T) -> Self {
        Self::Scalar(v.into())
    }

    /// Constructs a list of raw values.
    pub fn list<I: IntoIterator<Item = ResolvedValue>>(items: I) -> Self {
        Self::List(items.into_iter().collect())
    }

    /// Constructs an object value.
    pub fn object(source: ObjectSource) -> Self {
        Self::Object(Arc::new(source))
    }

    /// Constructs a streaming value out of an asynchronous sequence.
    pub fn stream<S>(stream: S) -> Self
    where
        S: Stream<Item = FieldResult<ResolvedValue>> + Send + 'static,
    {
        Self::Stream(StreamSource::new(Box::pin(stream)))
    }

    /// Indicates whether this value is `null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns this value's object source, if it is object-like.
    pub fn as_object(&self) -> Option<&Arc<ObjectSource>> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }
}

impl fmt::Debug for ResolvedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Scalar(s) => write!(f, "{s}"),
            Self::List(l) => f.debug_list().entries(l).finish(),
            Self::Object(o) => {
                let mut map = f.debug_map();
                for (k, v) in o.properties() {
                    match v {
                        Property::Value(v) => map.entry(k, v),
                        Property::Func(_) => map.entry(k, &"<function>"),
                    };
                }
                map.finish()
            }
            Self::Stream(_) => f.write_str("<stream>"),
        }
    }
}

impl From<i32> for ResolvedValue {
    fn from(v: i32) -> Self {
        Self::Scalar(v.into())
    }
}

impl From<f64> for ResolvedValue {
    fn from(v: f64) -> Self {
        Self::Scalar(v.into())
    }
}

impl From<bool> for ResolvedValue {
    fn from(v: bool) -> Self {
        Self::Scalar(v.into())
    }
}

impl From<String> for ResolvedValue {
    fn from(v: String) -> Self {
        Self::Scalar(v.into())
    }
}

impl From<&str> for ResolvedValue {
    fn from(v: &str) -> Self {
        Self::Scalar(v.into())
    }
}

impl From<ObjectSource> for ResolvedValue {
    fn from(o: ObjectSource) -> Self {
        Self::object(o)
    }
}

/// A shareable handle on an asynchronous sequence.
///
/// Cloning shares the underlying sequence; completion takes it out of the
/// handle exactly once and drives it from there.
#[derive(Clone)]
pub struct StreamSource(Arc<Mutex<Option<ResolvedStream>>>);

impl StreamSource {
    /// Wraps an asynchronous sequence into a [`StreamSource`].
    pub fn new(stream: ResolvedStream) -> Self {
        Self(Arc::new(Mutex::new(Some(stream))))
    }

    /// Takes the sequence out of this handle. Returns [`None`] if it has
    /// already been consumed.
    pub(crate) fn take(&self) -> Option<ResolvedStream> {
        self.0.lock().unwrap().take()
    }
}

/// A property of an [`ObjectSource`].
#[derive(Clone)]
pub enum Property {
    /// A plain stored value.
    Value(ResolvedValue),
    /// A resolver function invoked with `(args, context, info)`.
    Func(PropertyFn),
}

/// An object-like raw value: an ordered table of named properties.
#[derive(Clone, Default)]
pub struct ObjectSource {
    properties: IndexMap<String, Property>,
}

impl ObjectSource {
    /// Creates an empty [`ObjectSource`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a plain property value.
    pub fn property(mut self, name: impl Into<String>, value: impl Into<ResolvedValue>) -> Self {
        self.properties
            .insert(name.into(), Property::Value(value.into()));
        self
    }

    /// Adds a function-valued property.
    pub fn func<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Arguments, &ContextValue, &ResolveInfo) -> ResolverResult + Send + Sync + 'static,
    {
        self.properties
            .insert(name.into(), Property::Func(Arc::new(f)));
        self
    }

    /// Sets the `__typename` hint used by the default type resolver.
    pub fn typename(self, name: impl Into<String>) -> Self {
        let name: String = name.into();
        self.property("__typename", ResolvedValue::scalar(name))
    }

    /// Looks up a property by name.
    pub fn get(&self, name: &str) -> Option<&Property> {
        self.properties.get(name)
    }

    /// Iterates over all properties in insertion order.
    pub fn properties(&self) -> impl Iterator<Item = (&String, &Property)> {
        self.properties.iter()
    }

    /// Returns the `__typename` hint, if one is stored.
    pub fn type_name(&self) -> Option<&str> {
        match self.properties.get("__typename") {
            Some(Property::Value(ResolvedValue::Scalar(s))) => s.as_str(),
            _ => None,
        }
    }
}

/// Everything a resolver may want to know about the field being resolved.
pub struct ResolveInfo {
    /// The schema-side name of the field.
    pub field_name: String,
    /// All merged selection nodes for this response key.
    pub field_nodes: Arc<Vec<FieldNode>>,
    /// The declared output type of the field.
    pub return_type: Type,
    /// The name of the object type the field lives on.
    pub parent_type: String,
    /// The response path to this field.
    pub path: ResponsePath,
    pub(crate) ctx: Arc<ExecutionContext>,
}

impl ResolveInfo {
    /// The schema the operation executes against.
    pub fn schema(&self) -> &crate::schema::Schema {
        self.ctx.schema()
    }

    /// The root value the operation started from.
    pub fn root_value(&self) -> &ResolvedValue {
        self.ctx.root_value()
    }

    /// The operation being executed.
    pub fn operation(&self) -> &crate::ast::Operation {
        self.ctx.operation()
    }

    /// The fragment definition named `name`, if the document contains one.
    pub fn fragment(&self, name: &str) -> Option<&crate::ast::Fragment> {
        self.ctx.fragment_by_name(name)
    }

    /// The coerced variable values of the request.
    pub fn variable_values(&self) -> &crate::executor::Variables {
        self.ctx.variables()
    }
}

/// The default field resolver: property lookup on an object-like source.
///
/// Function-valued properties are invoked with `(args, context, info)`; plain
/// properties are returned as-is. Any other source kind yields the absent
/// value.
pub fn default_field_resolver(
    source: &ResolvedValue,
    args: &Arguments,
    context: &ContextValue,
    info: &ResolveInfo,
) -> ResolverResult {
    match source {
        ResolvedValue::Object(obj) => match obj.get(&info.field_name) {
            Some(Property::Value(v)) => MaybeAsync::Ready(Ok(v.clone())),
            Some(Property::Func(f)) => f(args, context, info),
            None => MaybeAsync::Ready(Ok(ResolvedValue::Null)),
        },
        _ => MaybeAsync::Ready(Ok(ResolvedValue::Null)),
    }
}

/// The default type resolver for abstract types.
///
/// Prefers a string `__typename` property on the value; otherwise tries the
/// `is_type_of` predicate of each possible concrete type in schema order and
/// names the first that claims the value.
pub fn default_type_resolver(
    value: &ResolvedValue,
    context: &ContextValue,
    info: &ResolveInfo,
    abstract_type: &str,
) -> MaybeAsync<FieldResult<String>> {
    if let Some(name) = value.as_object().and_then(|o| o.type_name()) {
        return MaybeAsync::Ready(Ok(name.into()));
    }

    let mut checks: Vec<(String, MaybeAsync<bool>)> = Vec::new();
    for possible in info.schema().possible_types(abstract_type) {
        if let MetaType::Object(obj) = possible.as_ref() {
            if let Some(is_type_of) = &obj.is_type_of {
                checks.push((obj.name.clone(), is_type_of(value, context)));
            }
        }
    }

    let abstract_type = abstract_type.to_owned();
    let first_match = move |results: Vec<(String, bool)>| {
        results
            .into_iter()
            .find(|(_, matches)| *matches)
            .map(|(name, _)| name)
            .ok_or_else(|| unresolved_abstract_error(&abstract_type))
    };

    if checks.iter().any(|(_, c)| c.is_pending()) {
        MaybeAsync::pending(async move {
            let mut results = Vec::with_capacity(checks.len());
            for (name, check) in checks {
                results.push((name, check.await));
            }
            first_match(results)
        })
    } else {
        MaybeAsync::Ready(first_match(
            checks
                .into_iter()
                .map(|(name, c)| (name, c.expect_ready("no check is pending")))
                .collect(),
        ))
    }
}

fn unresolved_abstract_error(abstract_type: &str) -> FieldError {
    FieldError::from(format!(
        "Abstract type \"{abstract_type}\" must resolve to an Object type at runtime. Either the \
         \"{abstract_type}\" type should provide a \"resolve_type\" function or each possible type \
         should provide an \"is_type_of\" function.",
    ))
}
