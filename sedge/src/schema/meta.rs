//! Metadata for the types a schema exposes.

use std::sync::Arc;

use crate::{
    ast::{InputValue, Type},
    executor::{Arguments, FieldResult},
    resolver::{
        ContextValue, FieldResolverFn, IsTypeOfFn, ResolveInfo, ResolvedValue, ResolverResult,
        TypeResolverFn,
    },
    maybe_async::MaybeAsync,
    value::Value,
};

/// Serialization of a raw leaf value into a response value.
///
/// Returning [`None`] marks the value as invalid for the scalar, which the
/// executor turns into a field error.
pub type ScalarSerializeFn = Arc<dyn Fn(&ResolvedValue) -> Option<Value> + Send + Sync>;

/// Scalar type metadata.
#[derive(Clone)]
pub struct ScalarMeta {
    #[allow(missing_docs)]
    pub name: String,
    #[allow(missing_docs)]
    pub serialize: ScalarSerializeFn,
}

impl ScalarMeta {
    /// Builds a [`ScalarMeta`] type with the default leaf serialization,
    /// which passes raw scalar values through unchanged and rejects
    /// everything else.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            serialize: Arc::new(|raw| match raw {
                ResolvedValue::Scalar(s) => Some(Value::Scalar(s.clone())),
                _ => None,
            }),
        }
    }

    /// Replaces the leaf serialization of this scalar.
    pub fn serialize_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&ResolvedValue) -> Option<Value> + Send + Sync + 'static,
    {
        self.serialize = Arc::new(f);
        self
    }

    /// Wraps this [`ScalarMeta`] into a generic [`MetaType`].
    pub fn into_meta(self) -> MetaType {
        MetaType::Scalar(self)
    }
}

/// Enum type metadata.
#[derive(Clone)]
pub struct EnumMeta {
    #[allow(missing_docs)]
    pub name: String,
    #[allow(missing_docs)]
    pub values: Vec<String>,
}

impl EnumMeta {
    /// Builds an [`EnumMeta`] type out of the provided `values`.
    pub fn new(name: impl Into<String>, values: &[&str]) -> Self {
        Self {
            name: name.into(),
            values: values.iter().map(|v| (*v).into()).collect(),
        }
    }

    /// Wraps this [`EnumMeta`] into a generic [`MetaType`].
    pub fn into_meta(self) -> MetaType {
        MetaType::Enum(self)
    }

    fn serialize(&self, raw: &ResolvedValue) -> Option<Value> {
        match raw {
            ResolvedValue::Scalar(s) => {
                let name = s.as_str()?;
                self.values
                    .iter()
                    .any(|v| v == name)
                    .then(|| Value::scalar(name))
            }
            _ => None,
        }
    }
}

/// An argument a field accepts.
#[derive(Clone)]
pub struct Argument {
    #[allow(missing_docs)]
    pub name: String,
    #[allow(missing_docs)]
    pub arg_type: Type,
    #[allow(missing_docs)]
    pub default_value: Option<InputValue>,
}

impl Argument {
    /// Constructs an [`Argument`] of the given type.
    pub fn new(name: impl Into<String>, arg_type: Type) -> Self {
        Self {
            name: name.into(),
            arg_type,
            default_value: None,
        }
    }

    /// Sets the default value of this [`Argument`].
    pub fn default_value(mut self, val: InputValue) -> Self {
        self.default_value = Some(val);
        self
    }
}

/// A field on an object or interface type.
#[derive(Clone)]
pub struct Field {
    #[allow(missing_docs)]
    pub name: String,
    #[allow(missing_docs)]
    pub field_type: Type,
    #[allow(missing_docs)]
    pub arguments: Option<Vec<Argument>>,
    /// The resolver for this field; the context's default field resolver is
    /// used when absent.
    pub resolver: Option<FieldResolverFn>,
}

impl Field {
    /// Constructs a [`Field`] of the given output type.
    pub fn new(name: impl Into<String>, field_type: Type) -> Self {
        Self {
            name: name.into(),
            field_type,
            arguments: None,
            resolver: None,
        }
    }

    /// Appends an argument definition to this [`Field`].
    pub fn argument(mut self, argument: Argument) -> Self {
        self.arguments.get_or_insert_with(Vec::new).push(argument);
        self
    }

    /// Attaches a resolver to this [`Field`].
    pub fn resolver<F>(mut self, f: F) -> Self
    where
        F: Fn(&ResolvedValue, &Arguments, &ContextValue, &ResolveInfo) -> ResolverResult
            + Send
            + Sync
            + 'static,
    {
        self.resolver = Some(Arc::new(f));
        self
    }
}

/// Object type metadata.
#[derive(Clone)]
pub struct ObjectMeta {
    #[allow(missing_docs)]
    pub name: String,
    #[allow(missing_docs)]
    pub fields: Vec<Field>,
    /// Names of the interfaces this object implements.
    pub interfaces: Vec<String>,
    /// Predicate claiming raw values for this type during abstract-type
    /// resolution.
    pub is_type_of: Option<IsTypeOfFn>,
}

impl ObjectMeta {
    /// Builds an [`ObjectMeta`] type with the given `fields`.
    pub fn new(name: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            name: name.into(),
            fields,
            interfaces: Vec::new(),
            is_type_of: None,
        }
    }

    /// Sets the interfaces this object implements.
    pub fn interfaces(mut self, interfaces: &[&str]) -> Self {
        self.interfaces = interfaces.iter().map(|i| (*i).into()).collect();
        self
    }

    /// Attaches an `is_type_of` predicate to this object type.
    pub fn is_type_of<F>(mut self, f: F) -> Self
    where
        F: Fn(&ResolvedValue, &ContextValue) -> MaybeAsync<bool> + Send + Sync + 'static,
    {
        self.is_type_of = Some(Arc::new(f));
        self
    }

    /// Wraps this [`ObjectMeta`] into a generic [`MetaType`].
    pub fn into_meta(self) -> MetaType {
        MetaType::Object(self)
    }

    /// Looks up a field definition by name.
    pub fn field_by_name(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Interface type metadata.
#[derive(Clone)]
pub struct InterfaceMeta {
    #[allow(missing_docs)]
    pub name: String,
    #[allow(missing_docs)]
    pub fields: Vec<Field>,
    /// Resolves the concrete object type of a raw value; the context's
    /// default type resolver is used when absent.
    pub resolve_type: Option<TypeResolverFn>,
}

impl InterfaceMeta {
    /// Builds an [`InterfaceMeta`] type with the given `fields`.
    pub fn new(name: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            name: name.into(),
            fields,
            resolve_type: None,
        }
    }

    /// Attaches a type resolver to this interface.
    pub fn resolve_type<F>(mut self, f: F) -> Self
    where
        F: Fn(&ResolvedValue, &ContextValue, &ResolveInfo, &str) -> MaybeAsync<FieldResult<String>>
            + Send
            + Sync
            + 'static,
    {
        self.resolve_type = Some(Arc::new(f));
        self
    }

    /// Wraps this [`InterfaceMeta`] into a generic [`MetaType`].
    pub fn into_meta(self) -> MetaType {
        MetaType::Interface(self)
    }
}

/// Union type metadata.
#[derive(Clone)]
pub struct UnionMeta {
    #[allow(missing_docs)]
    pub name: String,
    /// Names of the member object types.
    pub of_type_names: Vec<String>,
    /// Resolves the concrete object type of a raw value; the context's
    /// default type resolver is used when absent.
    pub resolve_type: Option<TypeResolverFn>,
}

impl UnionMeta {
    /// Builds a [`UnionMeta`] type of the given member types.
    pub fn new(name: impl Into<String>, of_types: &[&str]) -> Self {
        Self {
            name: name.into(),
            of_type_names: of_types.iter().map(|t| (*t).into()).collect(),
            resolve_type: None,
        }
    }

    /// Attaches a type resolver to this union.
    pub fn resolve_type<F>(mut self, f: F) -> Self
    where
        F: Fn(&ResolvedValue, &ContextValue, &ResolveInfo, &str) -> MaybeAsync<FieldResult<String>>
            + Send
            + Sync
            + 'static,
    {
        self.resolve_type = Some(Arc::new(f));
        self
    }

    /// Wraps this [`UnionMeta`] into a generic [`MetaType`].
    pub fn into_meta(self) -> MetaType {
        MetaType::Union(self)
    }
}

/// Generic type metadata.
#[derive(Clone)]
#[allow(missing_docs)]
pub enum MetaType {
    Scalar(ScalarMeta),
    Object(ObjectMeta),
    Interface(InterfaceMeta),
    Union(UnionMeta),
    Enum(EnumMeta),
}

impl MetaType {
    /// The name of the described type.
    pub fn name(&self) -> &str {
        match self {
            Self::Scalar(ScalarMeta { name, .. })
            | Self::Object(ObjectMeta { name, .. })
            | Self::Interface(InterfaceMeta { name, .. })
            | Self::Union(UnionMeta { name, .. })
            | Self::Enum(EnumMeta { name, .. }) => name,
        }
    }

    /// Indicates whether this is a leaf (scalar or enum) type.
    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Scalar(_) | Self::Enum(_))
    }

    /// Indicates whether this is an abstract (interface or union) type.
    pub fn is_abstract(&self) -> bool {
        matches!(self, Self::Interface(_) | Self::Union(_))
    }

    /// Looks up a field definition by name on an object or interface type.
    pub fn field_by_name(&self, name: &str) -> Option<&Field> {
        match self {
            Self::Object(ObjectMeta { fields, .. })
            | Self::Interface(InterfaceMeta { fields, .. }) => {
                fields.iter().find(|f| f.name == name)
            }
            _ => None,
        }
    }

    /// The explicit type resolver of an abstract type, if any.
    pub fn resolve_type_fn(&self) -> Option<&TypeResolverFn> {
        match self {
            Self::Interface(InterfaceMeta { resolve_type, .. })
            | Self::Union(UnionMeta { resolve_type, .. }) => resolve_type.as_ref(),
            _ => None,
        }
    }

    /// Serializes a raw value through this leaf type. Returns [`None`] for
    /// invalid values and for non-leaf types.
    pub fn serialize_leaf(&self, raw: &ResolvedValue) -> Option<Value> {
        match self {
            Self::Scalar(s) => (s.serialize)(raw),
            Self::Enum(e) => e.serialize(raw),
            _ => None,
        }
    }
}
