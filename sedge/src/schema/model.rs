use std::sync::Arc;

use fnv::FnvHashMap;

use crate::{
    ast::OperationType,
    schema::meta::{Field, MetaType, ObjectMeta, ScalarMeta},
};

/// The read-only schema model execution runs against.
///
/// Construction validation is the responsibility of the schema layer that
/// builds this model; the executor trusts it.
#[derive(Clone)]
pub struct Schema {
    types: FnvHashMap<String, Arc<MetaType>>,
    query_type_name: String,
    mutation_type_name: Option<String>,
    subscription_type_name: Option<String>,
    meta_fields: Vec<Field>,
}

impl Schema {
    /// Creates a new [`Schema`] with the given query root type.
    ///
    /// The built-in `Int`, `Float`, `String`, `Boolean` and `ID` scalars are
    /// registered automatically.
    pub fn new(query: ObjectMeta) -> Self {
        let mut schema = Self {
            types: FnvHashMap::default(),
            query_type_name: query.name.clone(),
            mutation_type_name: None,
            subscription_type_name: None,
            meta_fields: Vec::new(),
        };
        for builtin in ["Int", "Float", "String", "Boolean", "ID"] {
            schema.insert(ScalarMeta::new(builtin).into_meta());
        }
        schema.insert(query.into_meta());
        schema
    }

    /// Sets the mutation root type.
    pub fn with_mutation(mut self, mutation: ObjectMeta) -> Self {
        self.mutation_type_name = Some(mutation.name.clone());
        self.insert(mutation.into_meta());
        self
    }

    /// Sets the subscription root type.
    pub fn with_subscription(mut self, subscription: ObjectMeta) -> Self {
        self.subscription_type_name = Some(subscription.name.clone());
        self.insert(subscription.into_meta());
        self
    }

    /// Registers an additional named type.
    pub fn register(mut self, meta: MetaType) -> Self {
        self.insert(meta);
        self
    }

    /// Registers a meta-field definition served on the query root, e.g. the
    /// `__schema` and `__type` definitions of an introspection layer.
    pub fn with_meta_field(mut self, field: Field) -> Self {
        self.meta_fields.push(field);
        self
    }

    fn insert(&mut self, meta: MetaType) {
        self.types.insert(meta.name().into(), Arc::new(meta));
    }

    /// Looks up a type by name.
    pub fn type_by_name(&self, name: &str) -> Option<&Arc<MetaType>> {
        self.types.get(name)
    }

    /// The root type for the given operation kind, if the schema is
    /// configured for it.
    pub fn root_type(&self, operation_type: OperationType) -> Option<&Arc<MetaType>> {
        let name = match operation_type {
            OperationType::Query => Some(&self.query_type_name),
            OperationType::Mutation => self.mutation_type_name.as_ref(),
            OperationType::Subscription => self.subscription_type_name.as_ref(),
        }?;
        self.types.get(name)
    }

    /// The name of the query root type.
    pub fn query_type_name(&self) -> &str {
        &self.query_type_name
    }

    /// A registered meta-field definition, looked up by name.
    pub fn meta_field(&self, name: &str) -> Option<&Field> {
        self.meta_fields.iter().find(|f| f.name == name)
    }

    /// Enumerates the possible concrete types of the abstract type named
    /// `abstract_type`: union members, or all objects implementing an
    /// interface.
    pub fn possible_types(&self, abstract_type: &str) -> Vec<Arc<MetaType>> {
        match self.types.get(abstract_type).map(Arc::as_ref) {
            Some(MetaType::Union(u)) => u
                .of_type_names
                .iter()
                .filter_map(|n| self.types.get(n).cloned())
                .collect(),
            Some(MetaType::Interface(i)) => {
                let mut possible: Vec<_> = self
                    .types
                    .values()
                    .filter(|t| match t.as_ref() {
                        MetaType::Object(o) => o.interfaces.iter().any(|imp| *imp == i.name),
                        _ => false,
                    })
                    .cloned()
                    .collect();
                possible.sort_by(|a, b| a.name().cmp(b.name()));
                possible
            }
            _ => Vec::new(),
        }
    }

    /// Indicates whether the object type `object` is a possible runtime type
    /// of the abstract type named `abstract_type`.
    pub fn is_possible_type(&self, abstract_type: &str, object: &ObjectMeta) -> bool {
        match self.types.get(abstract_type).map(Arc::as_ref) {
            Some(MetaType::Union(u)) => u.of_type_names.iter().any(|n| *n == object.name),
            Some(MetaType::Interface(i)) => object.interfaces.iter().any(|imp| *imp == i.name),
            _ => false,
        }
    }

    /// Indicates whether a fragment with the given type condition applies to
    /// the concrete type `object`: the condition names the type itself, an
    /// interface it implements, or a union containing it.
    pub fn fragment_condition_matches(&self, condition: &str, object: &ObjectMeta) -> bool {
        condition == object.name || self.is_possible_type(condition, object)
    }
}
