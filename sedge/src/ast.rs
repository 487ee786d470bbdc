//! The executable-document syntax tree consumed by the executor.
//!
//! Nodes are owned (`String`-named, [`Arc`]-shared where the executor regroups
//! them) so that selections can travel into `'static` completion futures and
//! incremental patches without borrowing from the parsed source. Every node
//! carries its position in the query source via [`Spanning`].

use std::{fmt, sync::Arc};

use smallvec::{smallvec, SmallVec};

use crate::{
    executor::Variables,
    parser::Spanning,
    value::ScalarValue,
};

/// A single wrapper applied to a named type.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TypeModifier {
    /// The `!` wrapper.
    NonNull,
    /// The `[...]` wrapper.
    List,
}

/// Type literal in a syntax tree.
///
/// Carries no semantic information and might refer to types that don't exist.
/// Wrappers are stored innermost-first, so the last modifier is the outermost
/// one.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Type {
    name: String,
    modifiers: SmallVec<[TypeModifier; 2]>,
}

impl Type {
    /// Constructs a bare named [`Type`] with no wrappers.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            modifiers: smallvec![],
        }
    }

    /// Wraps this [`Type`] into a list.
    pub fn wrap_list(mut self) -> Self {
        self.modifiers.push(TypeModifier::List);
        self
    }

    /// Wraps this [`Type`] into a non-`null` assertion.
    pub fn wrap_non_null(mut self) -> Self {
        self.modifiers.push(TypeModifier::NonNull);
        self
    }

    /// Returns the outermost [`TypeModifier`] of this [`Type`], if any.
    pub fn modifier(&self) -> Option<TypeModifier> {
        self.modifiers.last().copied()
    }

    /// Returns this [`Type`] with the outermost wrapper removed.
    ///
    /// Unwrapping a bare named type returns it unchanged.
    pub fn inner(&self) -> Type {
        let mut inner = self.clone();
        inner.modifiers.pop();
        inner
    }

    /// Returns the innermost name of this [`Type`] by unpacking all wrappers.
    pub fn innermost_name(&self) -> &str {
        &self.name
    }

    /// Indicates whether this [`Type`] can only represent non-`null` values.
    pub fn is_non_null(&self) -> bool {
        matches!(self.modifiers.last(), Some(TypeModifier::NonNull))
    }

    /// Indicates whether this [`Type`] is a list, looking through a non-`null`
    /// wrapper.
    pub fn is_list(&self) -> bool {
        match self.modifiers.last() {
            Some(TypeModifier::List) => true,
            Some(TypeModifier::NonNull) => self.inner().is_list(),
            None => false,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.modifier() {
            Some(TypeModifier::NonNull) => write!(f, "{}!", self.inner()),
            Some(TypeModifier::List) => write!(f, "[{}]", self.inner()),
            None => write!(f, "{}", self.name),
        }
    }
}

/// A JSON-like value passed into query execution, either out-of-band through
/// variables, or in-band as argument literals and default values. These are
/// _not_ constant and might contain variable references.
///
/// List and object variants are _spanned_, i.e. they contain a reference to
/// their position in the source file, if available.
#[derive(Clone, Debug, PartialEq)]
#[allow(missing_docs)]
pub enum InputValue {
    Null,
    Scalar(ScalarValue),
    Enum(String),
    Variable(String),
    List(Vec<Spanning<InputValue>>),
    Object(Vec<(Spanning<String>, Spanning<InputValue>)>),
}

impl InputValue {
    /// Constructs a `null` value.
    pub fn null() -> Self {
        Self::Null
    }

    /// Constructs a scalar value.
    pub fn scalar<T: Into<ScalarValue>>(v: T) -> Self {
        Self::Scalar(v.into())
    }

    /// Constructs an enum value.
    pub fn enum_value(s: impl AsRef<str>) -> Self {
        Self::Enum(s.as_ref().into())
    }

    /// Constructs a variable reference.
    pub fn variable(v: impl AsRef<str>) -> Self {
        Self::Variable(v.as_ref().into())
    }

    /// Constructs an unlocated list out of plain values.
    pub fn list(l: Vec<Self>) -> Self {
        Self::List(l.into_iter().map(Spanning::unlocated).collect())
    }

    /// Constructs an unlocated object out of plain key/value pairs.
    pub fn object<K: AsRef<str>>(o: Vec<(K, Self)>) -> Self {
        Self::Object(
            o.into_iter()
                .map(|(k, v)| {
                    (
                        Spanning::unlocated(k.as_ref().into()),
                        Spanning::unlocated(v),
                    )
                })
                .collect(),
        )
    }

    /// Indicates whether this value is `null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Indicates whether this value is a variable reference.
    pub fn is_variable(&self) -> bool {
        matches!(self, Self::Variable(_))
    }

    /// Resolves all variable references inside this value against `vars`,
    /// yielding a constant value.
    ///
    /// References to variables that are absent from `vars` become `null`.
    pub fn into_const(self, vars: &Variables) -> InputValue {
        match self {
            Self::Variable(name) => vars.get(&name).cloned().unwrap_or(Self::Null),
            Self::List(l) => Self::List(
                l.into_iter()
                    .map(|s| s.map(|v| v.into_const(vars)))
                    .collect(),
            ),
            Self::Object(o) => Self::Object(
                o.into_iter()
                    .map(|(k, v)| (k, v.map(|v| v.into_const(vars))))
                    .collect(),
            ),
            v => v,
        }
    }

    /// Converts this value into the desired Rust type, if it matches.
    pub fn convert<T: FromInputValue>(&self) -> Option<T> {
        T::from_input_value(self)
    }
}

/// Parsing of an unstructured input value into a Rust data type.
///
/// Used by the executor when extracting directive and field arguments, e.g.
/// the `if` condition of `@skip` or the `initialCount` of `@stream`.
pub trait FromInputValue: Sized {
    /// Performs the conversion.
    fn from_input_value(v: &InputValue) -> Option<Self>;
}

impl FromInputValue for bool {
    fn from_input_value(v: &InputValue) -> Option<Self> {
        match v {
            InputValue::Scalar(ScalarValue::Boolean(b)) => Some(*b),
            _ => None,
        }
    }
}

impl FromInputValue for i32 {
    fn from_input_value(v: &InputValue) -> Option<Self> {
        match v {
            InputValue::Scalar(ScalarValue::Int(i)) => Some(*i),
            _ => None,
        }
    }
}

impl FromInputValue for f64 {
    fn from_input_value(v: &InputValue) -> Option<Self> {
        match v {
            InputValue::Scalar(ScalarValue::Float(f)) => Some(*f),
            InputValue::Scalar(ScalarValue::Int(i)) => Some(f64::from(*i)),
            _ => None,
        }
    }
}

impl FromInputValue for String {
    fn from_input_value(v: &InputValue) -> Option<Self> {
        match v {
            InputValue::Scalar(ScalarValue::String(s)) => Some(s.clone()),
            InputValue::Enum(s) => Some(s.clone()),
            _ => None,
        }
    }
}

/// Definition of a single operation variable.
#[derive(Clone, Debug, PartialEq)]
pub struct VariableDefinition {
    /// The declared type of the variable.
    pub var_type: Spanning<Type>,
    /// The default value, used when the variable is not supplied.
    pub default_value: Option<Spanning<InputValue>>,
}

/// All variable definitions of an operation, in declaration order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VariableDefinitions {
    #[allow(missing_docs)]
    pub items: Vec<(Spanning<String>, VariableDefinition)>,
}

/// Arguments as they appear on a field or directive in the source.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Arguments {
    #[allow(missing_docs)]
    pub items: Vec<(Spanning<String>, Spanning<InputValue>)>,
}

impl Arguments {
    /// Looks up the provided value of the argument named `name`.
    pub fn get(&self, name: &str) -> Option<&Spanning<InputValue>> {
        self.items
            .iter()
            .find(|(k, _)| k.item == name)
            .map(|(_, v)| v)
    }
}

/// A directive applied to a field, fragment spread, or inline fragment.
#[derive(Clone, Debug, PartialEq)]
pub struct Directive {
    #[allow(missing_docs)]
    pub name: Spanning<String>,
    #[allow(missing_docs)]
    pub arguments: Option<Spanning<Arguments>>,
}

impl Directive {
    /// Constructs a new [`Directive`] without arguments.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Spanning::unlocated(name.into()),
            arguments: None,
        }
    }

    /// Appends an argument to this [`Directive`].
    pub fn with_argument(mut self, name: impl Into<String>, value: InputValue) -> Self {
        let args = self
            .arguments
            .get_or_insert_with(|| Spanning::unlocated(Arguments::default()));
        args.item
            .items
            .push((Spanning::unlocated(name.into()), Spanning::unlocated(value)));
        self
    }

    /// Looks up the value of the argument named `name`, resolved against
    /// `vars`.
    pub fn argument(&self, name: &str, vars: &Variables) -> Option<InputValue> {
        self.arguments
            .as_ref()
            .and_then(|args| args.item.get(name))
            .map(|v| v.item.clone().into_const(vars))
    }
}

/// A field node within a selection set.
#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    #[allow(missing_docs)]
    pub alias: Option<Spanning<String>>,
    #[allow(missing_docs)]
    pub name: Spanning<String>,
    #[allow(missing_docs)]
    pub arguments: Option<Spanning<Arguments>>,
    #[allow(missing_docs)]
    pub directives: Option<Vec<Spanning<Directive>>>,
    #[allow(missing_docs)]
    pub selection_set: Option<Vec<Selection>>,
}

impl Field {
    /// Constructs a new leaf [`Field`] selection with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            alias: None,
            name: Spanning::unlocated(name.into()),
            arguments: None,
            directives: None,
            selection_set: None,
        }
    }

    /// Sets the response alias of this [`Field`].
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(Spanning::unlocated(alias.into()));
        self
    }

    /// Appends an argument to this [`Field`].
    pub fn with_argument(mut self, name: impl Into<String>, value: InputValue) -> Self {
        let args = self
            .arguments
            .get_or_insert_with(|| Spanning::unlocated(Arguments::default()));
        args.item
            .items
            .push((Spanning::unlocated(name.into()), Spanning::unlocated(value)));
        self
    }

    /// Appends a directive to this [`Field`].
    pub fn with_directive(mut self, directive: Directive) -> Self {
        self.directives
            .get_or_insert_with(Vec::new)
            .push(Spanning::unlocated(directive));
        self
    }

    /// Sets the sub-selection of this [`Field`].
    pub fn with_selection_set(mut self, selections: Vec<Selection>) -> Self {
        self.selection_set = Some(selections);
        self
    }

    /// The response key of this [`Field`]: its alias, or its name.
    pub fn response_name(&self) -> &str {
        self.alias
            .as_ref()
            .map(|a| a.item.as_str())
            .unwrap_or(&self.name.item)
    }
}

/// A field node as regrouped by the executor.
///
/// Grouped field sets and incremental patches share the very same node across
/// list elements; the shared identity is what subfield-collection memoization
/// keys on.
pub type FieldNode = Arc<Spanning<Field>>;

/// A named-fragment spread within a selection set.
#[derive(Clone, Debug, PartialEq)]
pub struct FragmentSpread {
    #[allow(missing_docs)]
    pub name: Spanning<String>,
    #[allow(missing_docs)]
    pub directives: Option<Vec<Spanning<Directive>>>,
}

/// An inline fragment within a selection set.
#[derive(Clone, Debug, PartialEq)]
pub struct InlineFragment {
    #[allow(missing_docs)]
    pub type_condition: Option<Spanning<String>>,
    #[allow(missing_docs)]
    pub directives: Option<Vec<Spanning<Directive>>>,
    #[allow(missing_docs)]
    pub selection_set: Vec<Selection>,
}

/// Entry in a GraphQL selection set.
///
/// One of the three variants of a selection that exist in GraphQL: a field, a
/// fragment spread, or an inline fragment.
///
/// ```text
/// {
///   field(withArg: 123) { subField }
///   ...fragmentSpread
///   ...on User {
///     inlineFragmentField
///   }
/// }
/// ```
#[derive(Clone, Debug, PartialEq)]
#[allow(missing_docs)]
pub enum Selection {
    Field(FieldNode),
    FragmentSpread(Spanning<FragmentSpread>),
    InlineFragment(Spanning<InlineFragment>),
}

impl Selection {
    /// Wraps a [`Field`] into a [`Selection`].
    pub fn field(f: Field) -> Self {
        Self::Field(Arc::new(Spanning::unlocated(f)))
    }

    /// Constructs a spread of the fragment named `name`.
    pub fn fragment_spread(name: impl Into<String>) -> Self {
        Self::FragmentSpread(Spanning::unlocated(FragmentSpread {
            name: Spanning::unlocated(name.into()),
            directives: None,
        }))
    }

    /// Constructs an inline fragment with an optional type condition.
    pub fn inline_fragment(
        type_condition: Option<&str>,
        directives: Vec<Directive>,
        selection_set: Vec<Selection>,
    ) -> Self {
        Self::InlineFragment(Spanning::unlocated(InlineFragment {
            type_condition: type_condition.map(|c| Spanning::unlocated(c.into())),
            directives: if directives.is_empty() {
                None
            } else {
                Some(directives.into_iter().map(Spanning::unlocated).collect())
            },
            selection_set,
        }))
    }
}

/// The kind of an operation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[allow(missing_docs)]
pub enum OperationType {
    Query,
    Mutation,
    Subscription,
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Query => "query",
            Self::Mutation => "mutation",
            Self::Subscription => "subscription",
        })
    }
}

/// A single operation definition.
#[derive(Clone, Debug, PartialEq)]
pub struct Operation {
    #[allow(missing_docs)]
    pub operation_type: OperationType,
    #[allow(missing_docs)]
    pub name: Option<Spanning<String>>,
    #[allow(missing_docs)]
    pub variable_definitions: Option<Spanning<VariableDefinitions>>,
    #[allow(missing_docs)]
    pub directives: Option<Vec<Spanning<Directive>>>,
    #[allow(missing_docs)]
    pub selection_set: Vec<Selection>,
}

impl Operation {
    /// Constructs a new [`Operation`] of the given kind.
    pub fn new(operation_type: OperationType, selection_set: Vec<Selection>) -> Self {
        Self {
            operation_type,
            name: None,
            variable_definitions: None,
            directives: None,
            selection_set,
        }
    }

    /// Constructs a query operation.
    pub fn query(selection_set: Vec<Selection>) -> Self {
        Self::new(OperationType::Query, selection_set)
    }

    /// Constructs a mutation operation.
    pub fn mutation(selection_set: Vec<Selection>) -> Self {
        Self::new(OperationType::Mutation, selection_set)
    }

    /// Names this [`Operation`].
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(Spanning::unlocated(name.into()));
        self
    }

    /// Declares a variable on this [`Operation`].
    pub fn with_variable(
        mut self,
        name: impl Into<String>,
        var_type: Type,
        default_value: Option<InputValue>,
    ) -> Self {
        let defs = self
            .variable_definitions
            .get_or_insert_with(|| Spanning::unlocated(VariableDefinitions::default()));
        defs.item.items.push((
            Spanning::unlocated(name.into()),
            VariableDefinition {
                var_type: Spanning::unlocated(var_type),
                default_value: default_value.map(Spanning::unlocated),
            },
        ));
        self
    }
}

/// A named-fragment definition.
#[derive(Clone, Debug, PartialEq)]
pub struct Fragment {
    #[allow(missing_docs)]
    pub name: Spanning<String>,
    #[allow(missing_docs)]
    pub type_condition: Spanning<String>,
    #[allow(missing_docs)]
    pub directives: Option<Vec<Spanning<Directive>>>,
    #[allow(missing_docs)]
    pub selection_set: Vec<Selection>,
}

impl Fragment {
    /// Constructs a new [`Fragment`] named `name` on the type `on`.
    pub fn new(
        name: impl Into<String>,
        on: impl Into<String>,
        selection_set: Vec<Selection>,
    ) -> Self {
        Self {
            name: Spanning::unlocated(name.into()),
            type_condition: Spanning::unlocated(on.into()),
            directives: None,
            selection_set,
        }
    }
}

/// A top-level definition in an executable document.
#[derive(Clone, Debug, PartialEq)]
#[allow(missing_docs)]
pub enum Definition {
    Operation(Spanning<Operation>),
    Fragment(Spanning<Fragment>),
}

impl Definition {
    /// Wraps an [`Operation`] into a [`Definition`].
    pub fn operation(op: Operation) -> Self {
        Self::Operation(Spanning::unlocated(op))
    }

    /// Wraps a [`Fragment`] into a [`Definition`].
    pub fn fragment(f: Fragment) -> Self {
        Self::Fragment(Spanning::unlocated(f))
    }
}

/// A parsed executable document: operations plus named fragments.
pub type Document = Vec<Definition>;
