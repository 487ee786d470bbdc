//! Synchronous execution behavior.

use std::sync::Arc;

use crate::{
    ast::{Definition, Document, Field, Fragment, InputValue, Operation, Selection, Type},
    execute, execute_sync, graphql_value, graphql_vars,
    meta::{Argument, EnumMeta, Field as MetaField, ObjectMeta, ScalarMeta, UnionMeta},
    ExecutionArgs, MaybeAsync, ObjectSource, PathSegment, ResolvedValue, ScalarValue, Schema,
    Value,
};

fn query_doc(selections: Vec<Selection>) -> Document {
    vec![Definition::operation(Operation::query(selections))]
}

fn string_field(name: &str) -> MetaField {
    MetaField::new(name, Type::named("String"))
}

#[test]
fn sync_query_resolves_synchronously() {
    let schema = Arc::new(Schema::new(ObjectMeta::new("Query", vec![string_field("x")])));
    let document = query_doc(vec![Selection::field(Field::new("x"))]);
    let root = ObjectSource::new().property("x", "a");

    let result = execute_sync(ExecutionArgs::new(schema, document).root_value(root)).unwrap();

    assert!(result.errors.is_empty());
    assert_eq!(result.data, Some(graphql_value!({"x": "a"})));
    assert_eq!(result.has_next, None);
}

#[test]
fn response_keys_follow_collection_order() {
    let schema = Arc::new(Schema::new(ObjectMeta::new(
        "Query",
        vec![string_field("a"), string_field("b"), string_field("c")],
    )));
    let document = query_doc(vec![
        Selection::field(Field::new("c")),
        Selection::field(Field::new("a").with_alias("z")),
        Selection::field(Field::new("b")),
    ]);
    let root = ObjectSource::new()
        .property("a", "1")
        .property("b", "2")
        .property("c", "3");

    let result = execute_sync(ExecutionArgs::new(schema, document).root_value(root)).unwrap();

    let keys: Vec<_> = result
        .data
        .unwrap()
        .into_object()
        .unwrap()
        .into_iter()
        .map(|(k, _)| k)
        .collect();
    assert_eq!(keys, ["c", "z", "b"]);
}

#[test]
fn merged_selections_share_one_response_key() {
    let user = ObjectMeta::new("User", vec![string_field("name"), string_field("bio")]);
    let schema = Arc::new(
        Schema::new(ObjectMeta::new(
            "Query",
            vec![MetaField::new("user", Type::named("User"))],
        ))
        .register(user.into_meta()),
    );
    let document = query_doc(vec![
        Selection::field(
            Field::new("user").with_selection_set(vec![Selection::field(Field::new("name"))]),
        ),
        Selection::field(
            Field::new("user").with_selection_set(vec![Selection::field(Field::new("bio"))]),
        ),
    ]);
    let root = ObjectSource::new().property(
        "user",
        ObjectSource::new().property("name", "n").property("bio", "b"),
    );

    let result = execute_sync(ExecutionArgs::new(schema, document).root_value(root)).unwrap();

    assert!(result.errors.is_empty());
    assert_eq!(
        result.data,
        Some(graphql_value!({"user": {"name": "n", "bio": "b"}})),
    );
}

#[test]
fn typename_resolves_on_any_type() {
    let schema = Arc::new(Schema::new(ObjectMeta::new("Query", vec![string_field("x")])));
    let document = query_doc(vec![Selection::field(Field::new("__typename"))]);

    let result = execute_sync(ExecutionArgs::new(schema, document)).unwrap();

    assert_eq!(result.data, Some(graphql_value!({"__typename": "Query"})));
}

#[test]
fn null_bubbles_to_data_when_no_nullable_ancestor() {
    let schema = Arc::new(Schema::new(ObjectMeta::new(
        "Query",
        vec![MetaField::new("n", Type::named("String").wrap_non_null())],
    )));
    let document = query_doc(vec![Selection::field(Field::new("n"))]);

    let result = execute_sync(ExecutionArgs::new(schema, document)).unwrap();

    assert_eq!(result.data, Some(Value::Null));
    assert_eq!(result.errors.len(), 1);
    assert_eq!(
        result.errors[0].error().message(),
        "Cannot return null for non-nullable field Query.n.",
    );
    assert_eq!(result.errors[0].path(), [PathSegment::Key("n".into())]);
}

#[test]
fn null_bubbles_to_the_nearest_nullable_ancestor() {
    let user = ObjectMeta::new(
        "User",
        vec![MetaField::new("name", Type::named("String").wrap_non_null())],
    );
    let schema = Arc::new(
        Schema::new(ObjectMeta::new(
            "Query",
            vec![MetaField::new("user", Type::named("User"))],
        ))
        .register(user.into_meta()),
    );
    let document = query_doc(vec![Selection::field(
        Field::new("user").with_selection_set(vec![Selection::field(Field::new("name"))]),
    )]);
    let root = ObjectSource::new().property("user", ObjectSource::new());

    let result = execute_sync(ExecutionArgs::new(schema, document).root_value(root)).unwrap();

    assert_eq!(result.data, Some(graphql_value!({"user": null})));
    assert_eq!(result.errors.len(), 1);
    assert_eq!(
        result.errors[0].path(),
        [
            PathSegment::Key("user".into()),
            PathSegment::Key("name".into()),
        ],
    );
}

#[test]
fn resolver_errors_are_located_and_null_the_field() {
    let schema = Arc::new(Schema::new(ObjectMeta::new(
        "Query",
        vec![string_field("boom").resolver(|_, _, _, _| {
            MaybeAsync::Ready(Err("the dungeon collapsed".into()))
        })],
    )));
    let document = query_doc(vec![Selection::field(Field::new("boom"))]);

    let result = execute_sync(ExecutionArgs::new(schema, document)).unwrap();

    assert_eq!(result.data, Some(graphql_value!({"boom": null})));
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].error().message(), "the dungeon collapsed");
    assert_eq!(result.errors[0].path(), [PathSegment::Key("boom".into())]);
}

#[test]
fn arguments_apply_defaults_and_variables() {
    let greet = MetaField::new("greet", Type::named("String"))
        .argument(
            Argument::new("name", Type::named("String"))
                .default_value(InputValue::scalar("world")),
        )
        .resolver(|_, args, _, _| {
            let name: String = args.get("name").unwrap_or_default();
            MaybeAsync::Ready(Ok(ResolvedValue::scalar(format!("hello {name}"))))
        });
    let schema = Arc::new(Schema::new(ObjectMeta::new("Query", vec![greet])));

    let document = query_doc(vec![Selection::field(Field::new("greet"))]);
    let result = execute_sync(ExecutionArgs::new(Arc::clone(&schema), document)).unwrap();
    assert_eq!(result.data, Some(graphql_value!({"greet": "hello world"})));

    let document = vec![Definition::operation(
        Operation::query(vec![Selection::field(
            Field::new("greet").with_argument("name", InputValue::variable("n")),
        )])
        .with_variable("n", Type::named("String"), None),
    )];
    let result = execute_sync(
        ExecutionArgs::new(schema, document).variable_values(graphql_vars! {"n": "sedge"}),
    )
    .unwrap();
    assert_eq!(result.data, Some(graphql_value!({"greet": "hello sedge"})));
}

#[test]
fn missing_required_argument_is_a_field_error() {
    let req = MetaField::new("req", Type::named("Int"))
        .argument(Argument::new("x", Type::named("Int").wrap_non_null()))
        .resolver(|_, args, _, _| {
            MaybeAsync::Ready(Ok(ResolvedValue::scalar(args.get::<i32>("x").unwrap_or(0))))
        });
    let schema = Arc::new(Schema::new(ObjectMeta::new("Query", vec![req])));
    let document = query_doc(vec![Selection::field(Field::new("req"))]);

    let result = execute_sync(ExecutionArgs::new(schema, document)).unwrap();

    assert_eq!(result.data, Some(graphql_value!({"req": null})));
    assert_eq!(
        result.errors[0].error().message(),
        "Argument \"x\" of required type \"Int!\" was not provided.",
    );
}

#[test]
fn skip_and_include_respect_variables() {
    let schema = Arc::new(Schema::new(ObjectMeta::new(
        "Query",
        vec![string_field("a"), string_field("b")],
    )));
    let document = vec![Definition::operation(
        Operation::query(vec![
            Selection::field(Field::new("a").with_directive(
                crate::ast::Directive::new("skip").with_argument("if", InputValue::variable("s")),
            )),
            Selection::field(Field::new("b")),
        ])
        .with_variable("s", Type::named("Boolean").wrap_non_null(), None),
    )];
    let root = ObjectSource::new().property("a", "1").property("b", "2");

    let result = execute_sync(
        ExecutionArgs::new(schema, document)
            .root_value(root)
            .variable_values(graphql_vars! {"s": true}),
    )
    .unwrap();

    assert_eq!(result.data, Some(graphql_value!({"b": "2"})));
}

#[test]
fn named_fragments_merge_into_the_selection() {
    let schema = Arc::new(Schema::new(ObjectMeta::new(
        "Query",
        vec![string_field("a"), string_field("b")],
    )));
    let document = vec![
        Definition::operation(Operation::query(vec![
            Selection::field(Field::new("a")),
            Selection::fragment_spread("rest"),
        ])),
        Definition::fragment(Fragment::new(
            "rest",
            "Query",
            vec![Selection::field(Field::new("b"))],
        )),
    ];
    let root = ObjectSource::new().property("a", "1").property("b", "2");

    let result = execute_sync(ExecutionArgs::new(schema, document).root_value(root)).unwrap();

    assert_eq!(result.data, Some(graphql_value!({"a": "1", "b": "2"})));
}

#[test]
fn union_member_resolves_through_typename_without_predicates() {
    // Neither the union nor its members carry any resolution hook; only the
    // value's own `__typename` can name the runtime type here.
    let a = ObjectMeta::new("A", vec![MetaField::new("v", Type::named("Int"))]);
    let b = ObjectMeta::new("B", vec![MetaField::new("w", Type::named("Int"))]);
    let schema = Arc::new(
        Schema::new(ObjectMeta::new(
            "Query",
            vec![MetaField::new("u", Type::named("U"))],
        ))
        .register(UnionMeta::new("U", &["A", "B"]).into_meta())
        .register(a.into_meta())
        .register(b.into_meta()),
    );
    let document = query_doc(vec![Selection::field(Field::new("u").with_selection_set(
        vec![Selection::inline_fragment(
            Some("A"),
            vec![],
            vec![Selection::field(Field::new("v"))],
        )],
    ))]);
    let root = ObjectSource::new().property("u", ObjectSource::new().typename("A").property("v", 1));

    let result = execute_sync(ExecutionArgs::new(schema, document).root_value(root)).unwrap();

    assert!(result.errors.is_empty());
    assert_eq!(result.data, Some(graphql_value!({"u": {"v": 1}})));
}

#[test]
fn union_member_resolves_through_is_type_of_predicates() {
    let a = ObjectMeta::new("A", vec![MetaField::new("v", Type::named("Int"))])
        .is_type_of(|value, _| {
            MaybeAsync::Ready(value.as_object().is_some_and(|o| o.get("v").is_some()))
        });
    let b = ObjectMeta::new("B", vec![MetaField::new("w", Type::named("Int"))])
        .is_type_of(|value, _| {
            MaybeAsync::Ready(value.as_object().is_some_and(|o| o.get("w").is_some()))
        });
    let schema = Arc::new(
        Schema::new(ObjectMeta::new(
            "Query",
            vec![MetaField::new("u", Type::named("U"))],
        ))
        .register(UnionMeta::new("U", &["A", "B"]).into_meta())
        .register(a.into_meta())
        .register(b.into_meta()),
    );
    let document = query_doc(vec![Selection::field(Field::new("u").with_selection_set(
        vec![Selection::inline_fragment(
            Some("B"),
            vec![],
            vec![Selection::field(Field::new("w"))],
        )],
    ))]);
    let root = ObjectSource::new().property("u", ObjectSource::new().property("w", 2));

    let result = execute_sync(ExecutionArgs::new(schema, document).root_value(root)).unwrap();

    assert!(result.errors.is_empty());
    assert_eq!(result.data, Some(graphql_value!({"u": {"w": 2}})));
}

#[test]
fn runtime_type_outside_the_union_is_an_error() {
    let schema = Arc::new(
        Schema::new(
            ObjectMeta::new("Query", vec![MetaField::new("u", Type::named("U"))]),
        )
        .register(UnionMeta::new("U", &["A"]).into_meta())
        .register(ObjectMeta::new("A", vec![MetaField::new("v", Type::named("Int"))]).into_meta())
        .register(ObjectMeta::new("C", vec![MetaField::new("v", Type::named("Int"))]).into_meta()),
    );
    let document = query_doc(vec![Selection::field(Field::new("u").with_selection_set(
        vec![Selection::field(Field::new("__typename"))],
    ))]);
    let root = ObjectSource::new().property("u", ObjectSource::new().typename("C"));

    let result = execute_sync(ExecutionArgs::new(schema, document).root_value(root)).unwrap();

    assert_eq!(result.data, Some(graphql_value!({"u": null})));
    assert_eq!(
        result.errors[0].error().message(),
        "Runtime Object type \"C\" is not a possible type for \"U\".",
    );
}

#[test]
fn leaf_serialization_must_be_total() {
    let odd = ScalarMeta::new("Odd").serialize_with(|raw| match raw {
        ResolvedValue::Scalar(ScalarValue::Int(i)) if i % 2 == 1 => Some(Value::scalar(*i)),
        _ => None,
    });
    let schema = Arc::new(
        Schema::new(ObjectMeta::new(
            "Query",
            vec![MetaField::new("odd", Type::named("Odd"))],
        ))
        .register(odd.into_meta()),
    );
    let document = query_doc(vec![Selection::field(Field::new("odd"))]);
    let root = ObjectSource::new().property("odd", 2);

    let result = execute_sync(ExecutionArgs::new(schema, document).root_value(root)).unwrap();

    assert_eq!(result.data, Some(graphql_value!({"odd": null})));
    assert_eq!(
        result.errors[0].error().message(),
        "Expected a value of type \"Odd\" but received: 2",
    );
}

#[test]
fn enum_values_outside_the_declaration_are_rejected() {
    let schema = Arc::new(
        Schema::new(ObjectMeta::new(
            "Query",
            vec![MetaField::new("mood", Type::named("Mood"))],
        ))
        .register(EnumMeta::new("Mood", &["HAPPY", "GRUMPY"]).into_meta()),
    );
    let document = query_doc(vec![Selection::field(Field::new("mood"))]);

    let ok = execute_sync(
        ExecutionArgs::new(Arc::clone(&schema), document.clone())
            .root_value(ObjectSource::new().property("mood", "GRUMPY")),
    )
    .unwrap();
    assert_eq!(ok.data, Some(graphql_value!({"mood": "GRUMPY"})));

    let bad = execute_sync(
        ExecutionArgs::new(schema, document)
            .root_value(ObjectSource::new().property("mood", "SLEEPY")),
    )
    .unwrap();
    assert_eq!(bad.data, Some(graphql_value!({"mood": null})));
    assert_eq!(bad.errors.len(), 1);
}

#[test]
fn non_iterable_list_source_is_an_error() {
    let schema = Arc::new(Schema::new(ObjectMeta::new(
        "Query",
        vec![MetaField::new("items", Type::named("Int").wrap_list())],
    )));
    let document = query_doc(vec![Selection::field(Field::new("items"))]);
    let root = ObjectSource::new().property("items", 5);

    let result = execute_sync(ExecutionArgs::new(schema, document).root_value(root)).unwrap();

    assert_eq!(result.data, Some(graphql_value!({"items": null})));
    assert_eq!(
        result.errors[0].error().message(),
        "Expected Iterable, but did not find one for field \"Query.items\".",
    );
}

#[test]
fn nullable_list_elements_absorb_their_errors() {
    let items = MetaField::new("items", Type::named("Int").wrap_list()).resolver(|_, _, _, _| {
        MaybeAsync::Ready(Ok(ResolvedValue::list([
            ResolvedValue::scalar(1),
            ResolvedValue::scalar("not an int"),
            ResolvedValue::scalar(3),
        ])))
    });
    let schema = Arc::new(Schema::new(ObjectMeta::new("Query", vec![items])));
    let document = query_doc(vec![Selection::field(Field::new("items"))]);

    let result = execute_sync(ExecutionArgs::new(schema, document)).unwrap();

    assert_eq!(result.data, Some(graphql_value!({"items": [1, null, 3]})));
    assert_eq!(result.errors.len(), 1);
    assert_eq!(
        result.errors[0].path(),
        [PathSegment::Key("items".into()), PathSegment::Index(1)],
    );
}

#[test]
fn non_null_list_element_failure_nulls_the_list() {
    let items = MetaField::new("items", Type::named("Int").wrap_non_null().wrap_list())
        .resolver(|_, _, _, _| {
            MaybeAsync::Ready(Ok(ResolvedValue::list([
                ResolvedValue::scalar(1),
                ResolvedValue::Null,
            ])))
        });
    let schema = Arc::new(Schema::new(ObjectMeta::new("Query", vec![items])));
    let document = query_doc(vec![Selection::field(Field::new("items"))]);

    let result = execute_sync(ExecutionArgs::new(schema, document)).unwrap();

    assert_eq!(result.data, Some(graphql_value!({"items": null})));
    assert_eq!(result.errors.len(), 1);
    assert_eq!(
        result.errors[0].path(),
        [PathSegment::Key("items".into()), PathSegment::Index(1)],
    );
}

#[test]
fn property_functions_receive_the_three_argument_convention() {
    let schema = Arc::new(Schema::new(ObjectMeta::new(
        "Query",
        vec![string_field("greeting")],
    )));
    let document = query_doc(vec![Selection::field(Field::new("greeting"))]);
    let root = ObjectSource::new().func("greeting", |_args, _context, info| {
        MaybeAsync::Ready(Ok(ResolvedValue::scalar(format!(
            "hi from {}",
            info.field_name,
        ))))
    });

    let result = execute_sync(ExecutionArgs::new(schema, document).root_value(root)).unwrap();

    assert_eq!(result.data, Some(graphql_value!({"greeting": "hi from greeting"})));
}

#[test]
fn multiple_operations_require_a_name() {
    let schema = Arc::new(Schema::new(ObjectMeta::new("Query", vec![string_field("x")])));
    let document = vec![
        Definition::operation(
            Operation::query(vec![Selection::field(Field::new("x"))]).with_name("first"),
        ),
        Definition::operation(
            Operation::query(vec![Selection::field(Field::new("x"))]).with_name("second"),
        ),
    ];

    let result = execute_sync(ExecutionArgs::new(Arc::clone(&schema), document.clone())).unwrap();
    assert_eq!(result.data, None);
    assert_eq!(
        result.errors[0].error().message(),
        "Must provide operation name if query contains multiple operations.",
    );

    let named = execute_sync(
        ExecutionArgs::new(schema, document)
            .operation_name("second")
            .root_value(ObjectSource::new().property("x", "2")),
    )
    .unwrap();
    assert_eq!(named.data, Some(graphql_value!({"x": "2"})));
}

#[test]
fn unknown_operation_name_is_a_request_error() {
    let schema = Arc::new(Schema::new(ObjectMeta::new("Query", vec![string_field("x")])));
    let document = query_doc(vec![Selection::field(Field::new("x"))]);

    let result =
        execute_sync(ExecutionArgs::new(schema, document).operation_name("nope")).unwrap();

    assert_eq!(result.data, None);
    assert_eq!(
        result.errors[0].error().message(),
        "Unknown operation named \"nope\".",
    );
}

#[test]
fn empty_document_is_a_request_error() {
    let schema = Arc::new(Schema::new(ObjectMeta::new("Query", vec![string_field("x")])));

    let result = execute_sync(ExecutionArgs::new(schema, vec![])).unwrap();

    assert_eq!(result.data, None);
    assert_eq!(result.errors[0].error().message(), "Must provide an operation.");
}

#[test]
fn missing_required_variable_is_a_request_error() {
    let schema = Arc::new(Schema::new(ObjectMeta::new("Query", vec![string_field("x")])));
    let document = vec![Definition::operation(
        Operation::query(vec![Selection::field(Field::new("x"))]).with_variable(
            "v",
            Type::named("Int").wrap_non_null(),
            None,
        ),
    )];

    let result = execute_sync(ExecutionArgs::new(schema, document)).unwrap();

    assert_eq!(result.data, None);
    assert_eq!(
        result.errors[0].error().message(),
        "Variable \"$v\" of required type \"Int!\" was not provided.",
    );
}

#[test]
fn unconfigured_mutation_root_is_a_located_error() {
    let schema = Arc::new(Schema::new(ObjectMeta::new("Query", vec![string_field("x")])));
    let document = vec![Definition::operation(Operation::mutation(vec![
        Selection::field(Field::new("x")),
    ]))];

    let result = execute_sync(ExecutionArgs::new(schema, document)).unwrap();

    assert_eq!(result.data, Some(Value::Null));
    assert_eq!(
        result.errors[0].error().message(),
        "Schema is not configured to execute mutation operation.",
    );
}

#[test]
fn mutation_fields_execute_serially_in_collection_order() {
    use std::sync::Mutex;

    let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    let field = |name: &'static str, log: Arc<Mutex<Vec<&'static str>>>| {
        MetaField::new(name, Type::named("String")).resolver(move |_, _, _, _| {
            log.lock().unwrap().push(name);
            MaybeAsync::Ready(Ok(ResolvedValue::scalar(name)))
        })
    };
    let schema = Arc::new(
        Schema::new(ObjectMeta::new("Query", vec![string_field("q")])).with_mutation(
            ObjectMeta::new(
                "Mutation",
                vec![
                    field("a", Arc::clone(&log)),
                    field("b", Arc::clone(&log)),
                    field("c", Arc::clone(&log)),
                ],
            ),
        ),
    );
    let document = vec![Definition::operation(Operation::mutation(vec![
        Selection::field(Field::new("a")),
        Selection::field(Field::new("b")),
        Selection::field(Field::new("c")),
    ]))];

    let result = execute_sync(ExecutionArgs::new(schema, document)).unwrap();

    assert_eq!(*log.lock().unwrap(), ["a", "b", "c"]);
    assert_eq!(
        result.data,
        Some(graphql_value!({"a": "a", "b": "b", "c": "c"})),
    );
}

#[test]
fn pure_executions_are_idempotent() {
    let schema = Arc::new(Schema::new(ObjectMeta::new(
        "Query",
        vec![string_field("x"), string_field("y")],
    )));
    let document = query_doc(vec![
        Selection::field(Field::new("x")),
        Selection::field(Field::new("y")),
    ]);
    let root = ObjectSource::new().property("x", "1").property("y", "2");

    let first = execute_sync(
        ExecutionArgs::new(Arc::clone(&schema), document.clone()).root_value(root.clone()),
    )
    .unwrap();
    let second = execute_sync(ExecutionArgs::new(schema, document).root_value(root)).unwrap();

    assert_eq!(first, second);
}

#[test]
fn execute_returns_a_ready_outcome_for_sync_operations() {
    let schema = Arc::new(Schema::new(ObjectMeta::new("Query", vec![string_field("x")])));
    let document = query_doc(vec![Selection::field(Field::new("x"))]);

    let outcome = execute(
        ExecutionArgs::new(schema, document).root_value(ObjectSource::new().property("x", "a")),
    );

    assert!(!outcome.is_pending());
    let result = outcome
        .expect_ready("sync operation")
        .into_single()
        .unwrap();
    assert_eq!(result.data, Some(graphql_value!({"x": "a"})));
}

#[test]
fn execution_errors_serialize_with_one_based_locations() {
    let schema = Arc::new(Schema::new(ObjectMeta::new(
        "Query",
        vec![MetaField::new("n", Type::named("String").wrap_non_null())],
    )));
    let document = query_doc(vec![Selection::field(Field::new("n"))]);

    let result = execute_sync(ExecutionArgs::new(schema, document)).unwrap();
    let json = serde_json::to_value(&result).unwrap();

    assert_eq!(
        json,
        serde_json::json!({
            "errors": [{
                "message": "Cannot return null for non-nullable field Query.n.",
                "locations": [{"line": 1, "column": 1}],
                "path": ["n"],
            }],
            "data": null,
        }),
    );
}
