//! Incremental delivery through `@defer` and `@stream`.

use std::sync::Arc;

use futures::StreamExt as _;

use crate::{
    ast::{Definition, Directive, Document, Field, InputValue, Operation, Selection, Type},
    execute, graphql_value,
    meta::{Field as MetaField, ObjectMeta},
    AsyncExecutionResult, ExecutionArgs, ExecutionOutcome, ExecutionPatchResult, ExecutionResult,
    MaybeAsync, ObjectSource, PathSegment, ResolvedValue, ResponseStream, Schema, Value,
};

fn query_doc(selections: Vec<Selection>) -> Document {
    vec![Definition::operation(Operation::query(selections))]
}

fn stream_directive(initial_count: i32) -> Directive {
    Directive::new("stream").with_argument("initialCount", InputValue::scalar(initial_count))
}

async fn drive(outcome: MaybeAsync<ExecutionOutcome>) -> Vec<AsyncExecutionResult> {
    let stream = match outcome.await {
        ExecutionOutcome::Incremental(stream) => stream,
        ExecutionOutcome::Single(_) => panic!("expected an incremental response"),
    };
    stream.collect().await
}

fn expect_result(payload: &AsyncExecutionResult) -> &ExecutionResult {
    match payload {
        AsyncExecutionResult::Result(r) => r,
        AsyncExecutionResult::Patch(p) => panic!("expected a result, got patch at {:?}", p.path),
    }
}

fn expect_patch(payload: &AsyncExecutionResult) -> &ExecutionPatchResult {
    match payload {
        AsyncExecutionResult::Patch(p) => p,
        AsyncExecutionResult::Result(_) => panic!("expected a patch, got a result"),
    }
}

#[tokio::test]
async fn streamed_list_inlines_initial_count_and_patches_the_rest() {
    let schema = Arc::new(Schema::new(ObjectMeta::new(
        "Query",
        vec![MetaField::new(
            "items",
            Type::named("Int").wrap_non_null().wrap_list(),
        )],
    )));
    let document = query_doc(vec![Selection::field(
        Field::new("items").with_directive(stream_directive(2)),
    )]);
    let root = ObjectSource::new().property(
        "items",
        ResolvedValue::list([
            ResolvedValue::scalar(1),
            ResolvedValue::scalar(2),
            ResolvedValue::scalar(3),
            ResolvedValue::scalar(4),
        ]),
    );

    let outcome = execute(ExecutionArgs::new(schema, document).root_value(root));
    // The inlined part resolves synchronously; only delivery is asynchronous.
    assert!(!outcome.is_pending());

    let payloads = drive(outcome).await;
    assert_eq!(payloads.len(), 4);

    let initial = expect_result(&payloads[0]);
    assert_eq!(initial.data, Some(graphql_value!({"items": [1, 2]})));
    assert_eq!(initial.has_next, Some(true));

    let first = expect_patch(&payloads[1]);
    assert_eq!(
        first.path,
        [PathSegment::Key("items".into()), PathSegment::Index(2)],
    );
    assert_eq!(first.data, Some(Value::scalar(3)));
    assert!(first.has_next);

    let second = expect_patch(&payloads[2]);
    assert_eq!(
        second.path,
        [PathSegment::Key("items".into()), PathSegment::Index(3)],
    );
    assert_eq!(second.data, Some(Value::scalar(4)));
    assert!(second.has_next);

    let terminal = expect_result(&payloads[3]);
    assert_eq!(terminal.has_next, Some(false));
    assert_eq!(terminal.data, None);
}

#[tokio::test]
async fn stream_with_zero_initial_count_starts_empty() {
    let schema = Arc::new(Schema::new(ObjectMeta::new(
        "Query",
        vec![MetaField::new("items", Type::named("Int").wrap_list())],
    )));
    let document = query_doc(vec![Selection::field(
        Field::new("items").with_directive(stream_directive(0)),
    )]);
    let root = ObjectSource::new().property(
        "items",
        ResolvedValue::list([ResolvedValue::scalar(1), ResolvedValue::scalar(2)]),
    );

    let payloads = drive(execute(ExecutionArgs::new(schema, document).root_value(root))).await;

    let initial = expect_result(&payloads[0]);
    assert_eq!(initial.data, Some(graphql_value!({"items": []})));
    assert_eq!(payloads.len(), 4);
    assert_eq!(expect_patch(&payloads[1]).data, Some(Value::scalar(1)));
    assert_eq!(expect_patch(&payloads[2]).data, Some(Value::scalar(2)));
    assert_eq!(expect_result(&payloads[3]).has_next, Some(false));
}

#[tokio::test]
async fn stream_if_false_is_inert() {
    let schema = Arc::new(Schema::new(ObjectMeta::new(
        "Query",
        vec![MetaField::new("items", Type::named("Int").wrap_list())],
    )));
    let document = query_doc(vec![Selection::field(
        Field::new("items").with_directive(
            stream_directive(1).with_argument("if", InputValue::scalar(false)),
        ),
    )]);
    let root = ObjectSource::new().property(
        "items",
        ResolvedValue::list([ResolvedValue::scalar(1), ResolvedValue::scalar(2)]),
    );

    let result = crate::execute_sync(ExecutionArgs::new(schema, document).root_value(root)).unwrap();

    assert_eq!(result.data, Some(graphql_value!({"items": [1, 2]})));
}

#[tokio::test]
async fn negative_initial_count_is_a_field_error() {
    let schema = Arc::new(Schema::new(ObjectMeta::new(
        "Query",
        vec![MetaField::new("items", Type::named("Int").wrap_list())],
    )));
    let document = query_doc(vec![Selection::field(
        Field::new("items").with_directive(stream_directive(-1)),
    )]);
    let root = ObjectSource::new().property("items", ResolvedValue::list(Vec::new()));

    let result = crate::execute_sync(ExecutionArgs::new(schema, document).root_value(root)).unwrap();

    assert_eq!(result.data, Some(graphql_value!({"items": null})));
    assert_eq!(
        result.errors[0].error().message(),
        "initialCount must be a positive integer",
    );
}

#[tokio::test]
async fn streamed_async_sequence_keeps_pulling_through_the_dispatcher() {
    let nums = MetaField::new("nums", Type::named("Int").wrap_list()).resolver(|_, _, _, _| {
        MaybeAsync::Ready(Ok(ResolvedValue::stream(futures::stream::iter(vec![
            Ok(ResolvedValue::scalar(10)),
            Ok(ResolvedValue::scalar(20)),
            Ok(ResolvedValue::scalar(30)),
        ]))))
    });
    let schema = Arc::new(Schema::new(ObjectMeta::new("Query", vec![nums])));
    let document = query_doc(vec![Selection::field(
        Field::new("nums").with_directive(stream_directive(1)),
    )]);

    let payloads = drive(execute(ExecutionArgs::new(schema, document))).await;

    let initial = expect_result(&payloads[0]);
    assert_eq!(initial.data, Some(graphql_value!({"nums": [10]})));

    assert_eq!(payloads.len(), 4);
    let first = expect_patch(&payloads[1]);
    assert_eq!(
        first.path,
        [PathSegment::Key("nums".into()), PathSegment::Index(1)],
    );
    assert_eq!(first.data, Some(Value::scalar(20)));
    let second = expect_patch(&payloads[2]);
    assert_eq!(
        second.path,
        [PathSegment::Key("nums".into()), PathSegment::Index(2)],
    );
    assert_eq!(second.data, Some(Value::scalar(30)));
    assert_eq!(expect_result(&payloads[3]).has_next, Some(false));
}

#[tokio::test]
async fn stream_label_travels_on_every_patch() {
    let schema = Arc::new(Schema::new(ObjectMeta::new(
        "Query",
        vec![MetaField::new("items", Type::named("Int").wrap_list())],
    )));
    let document = query_doc(vec![Selection::field(
        Field::new("items").with_directive(
            stream_directive(1).with_argument("label", InputValue::scalar("tail")),
        ),
    )]);
    let root = ObjectSource::new().property(
        "items",
        ResolvedValue::list([ResolvedValue::scalar(1), ResolvedValue::scalar(2)]),
    );

    let payloads = drive(execute(ExecutionArgs::new(schema, document).root_value(root))).await;

    assert_eq!(expect_patch(&payloads[1]).label.as_deref(), Some("tail"));
}

#[tokio::test]
async fn deferred_fragment_is_absent_initially_and_patched_in() {
    let user = ObjectMeta::new(
        "User",
        vec![
            MetaField::new("name", Type::named("String")),
            MetaField::new("bio", Type::named("String")),
        ],
    );
    let schema = Arc::new(
        Schema::new(ObjectMeta::new(
            "Query",
            vec![MetaField::new("user", Type::named("User"))],
        ))
        .register(user.into_meta()),
    );
    let document = query_doc(vec![Selection::field(
        Field::new("user").with_selection_set(vec![
            Selection::field(Field::new("name")),
            Selection::inline_fragment(
                None,
                vec![Directive::new("defer").with_argument("label", InputValue::scalar("late"))],
                vec![Selection::field(Field::new("bio"))],
            ),
        ]),
    )]);
    let root = ObjectSource::new().property(
        "user",
        ObjectSource::new()
            .property("name", "Ada")
            .property("bio", "wrote the first program"),
    );

    let payloads = drive(execute(ExecutionArgs::new(schema, document).root_value(root))).await;

    let initial = expect_result(&payloads[0]);
    assert_eq!(initial.data, Some(graphql_value!({"user": {"name": "Ada"}})));
    assert_eq!(initial.has_next, Some(true));

    let patch = expect_patch(&payloads[1]);
    assert_eq!(patch.path, [PathSegment::Key("user".into())]);
    assert_eq!(patch.label.as_deref(), Some("late"));
    assert_eq!(patch.data, Some(graphql_value!({"bio": "wrote the first program"})));

    assert_eq!(expect_result(&payloads[2]).has_next, Some(false));
}

#[tokio::test]
async fn deferred_root_fragment_patches_at_the_empty_path() {
    let schema = Arc::new(Schema::new(ObjectMeta::new(
        "Query",
        vec![
            MetaField::new("fast", Type::named("String")),
            MetaField::new("slow", Type::named("String")),
        ],
    )));
    let document = query_doc(vec![
        Selection::field(Field::new("fast")),
        Selection::inline_fragment(
            None,
            vec![Directive::new("defer")],
            vec![Selection::field(Field::new("slow"))],
        ),
    ]);
    let root = ObjectSource::new()
        .property("fast", "f")
        .property("slow", "s");

    let payloads = drive(execute(ExecutionArgs::new(schema, document).root_value(root))).await;

    let initial = expect_result(&payloads[0]);
    assert_eq!(initial.data, Some(graphql_value!({"fast": "f"})));

    let patch = expect_patch(&payloads[1]);
    assert!(patch.path.is_empty());
    assert_eq!(patch.label, None);
    assert_eq!(patch.data, Some(graphql_value!({"slow": "s"})));
}

#[tokio::test]
async fn patch_failures_stay_scoped_to_the_patch() {
    let user = ObjectMeta::new(
        "User",
        vec![
            MetaField::new("name", Type::named("String")),
            MetaField::new("bio", Type::named("String").wrap_non_null()),
        ],
    );
    let schema = Arc::new(
        Schema::new(ObjectMeta::new(
            "Query",
            vec![MetaField::new("user", Type::named("User"))],
        ))
        .register(user.into_meta()),
    );
    let document = query_doc(vec![Selection::field(
        Field::new("user").with_selection_set(vec![
            Selection::field(Field::new("name")),
            Selection::inline_fragment(
                None,
                vec![Directive::new("defer")],
                vec![Selection::field(Field::new("bio"))],
            ),
        ]),
    )]);
    // `bio` is absent, so the deferred fragment trips the non-null check.
    let root = ObjectSource::new().property("user", ObjectSource::new().property("name", "Ada"));

    let payloads = drive(execute(ExecutionArgs::new(schema, document).root_value(root))).await;

    let initial = expect_result(&payloads[0]);
    assert!(initial.errors.is_empty());
    assert_eq!(initial.data, Some(graphql_value!({"user": {"name": "Ada"}})));

    let patch = expect_patch(&payloads[1]);
    assert_eq!(patch.data, Some(Value::Null));
    assert_eq!(patch.errors.len(), 1);
    assert_eq!(
        patch.errors[0].path(),
        [
            PathSegment::Key("user".into()),
            PathSegment::Key("bio".into()),
        ],
    );
}

#[tokio::test]
async fn incremental_payloads_serialize_in_transport_shape() {
    let schema = Arc::new(Schema::new(ObjectMeta::new(
        "Query",
        vec![MetaField::new("items", Type::named("Int").wrap_list())],
    )));
    let document = query_doc(vec![Selection::field(
        Field::new("items").with_directive(stream_directive(1)),
    )]);
    let root = ObjectSource::new().property(
        "items",
        ResolvedValue::list([ResolvedValue::scalar(1), ResolvedValue::scalar(2)]),
    );

    let payloads = drive(execute(ExecutionArgs::new(schema, document).root_value(root))).await;

    assert_eq!(
        serde_json::to_value(&payloads[1]).unwrap(),
        serde_json::json!({"data": 2, "path": ["items", 1], "hasNext": true}),
    );
    assert_eq!(
        serde_json::to_value(&payloads[2]).unwrap(),
        serde_json::json!({"hasNext": false}),
    );
}

#[tokio::test]
async fn dropping_the_stream_midway_is_safe() {
    let schema = Arc::new(Schema::new(ObjectMeta::new(
        "Query",
        vec![MetaField::new("items", Type::named("Int").wrap_list())],
    )));
    let document = query_doc(vec![Selection::field(
        Field::new("items").with_directive(stream_directive(0)),
    )]);
    let root = ObjectSource::new().property(
        "items",
        ResolvedValue::list([ResolvedValue::scalar(1), ResolvedValue::scalar(2)]),
    );

    let mut stream: ResponseStream = execute(ExecutionArgs::new(schema, document).root_value(root))
        .await
        .into_stream()
        .unwrap();

    let first = stream.next().await.unwrap();
    assert_eq!(expect_result(&first).has_next, Some(true));
    drop(stream);
}
