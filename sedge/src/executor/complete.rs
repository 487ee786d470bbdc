//! Type-directed completion of resolver values.
//!
//! `complete_value` turns the raw value a resolver produced into a
//! response-shaped value by recursing on the field's declared output type:
//! non-`null` wrappers re-raise inner `null`s, lists complete element-wise
//! (splitting off `@stream`ed tails), leaves serialize, abstract types
//! resolve their runtime type first, and objects collect and execute their
//! subfields.
//!
//! Errors travel as `Err` until a nullable position absorbs them:
//! [`handle_field_error`] is the single authority deciding between
//! null-and-log and re-raising across a non-`null` boundary.

use std::sync::Arc;

use futures::StreamExt as _;
use indexmap::IndexMap;

use crate::{
    ast::{FieldNode, InputValue, Type, TypeModifier},
    executor::{
        collect::{self, stream_directive},
        incremental, new_error_sink, Arguments, Completion, ErrorSink, ExecutionContext,
        ExecutionError, FieldError, ResponsePath, Variables,
    },
    maybe_async::MaybeAsync,
    resolver::{ResolveInfo, ResolvedValue, StreamSource},
    schema::meta::{Field as FieldDef, MetaType},
    value::Value,
};

/// Resolves and completes one grouped field on `parent_type`.
///
/// Returns [`None`] when the field has no definition on the parent type and
/// must be omitted from the result. The returned completion never leaks an
/// error past this field unless the field's type is non-`null`.
pub(crate) fn execute_field(
    ctx: &Arc<ExecutionContext>,
    parent_type: &Arc<MetaType>,
    source: ResolvedValue,
    field_nodes: &Arc<Vec<FieldNode>>,
    parent_path: &ResponsePath,
    errors: &ErrorSink,
) -> Option<Completion> {
    let node = &field_nodes[0];
    let field_name = node.item.name.item.as_str();
    let path = parent_path.append_key(node.item.response_name(), Some(parent_type.name()));

    // `__typename` is served on every type without consulting the field
    // table.
    if field_name == "__typename" {
        return Some(MaybeAsync::Ready(Ok(Value::scalar(parent_type.name()))));
    }

    let field_def = if (field_name == "__schema" || field_name == "__type")
        && parent_type.name() == ctx.schema.query_type_name()
    {
        ctx.schema.meta_field(field_name)
    } else {
        parent_type.field_by_name(field_name)
    };
    let field_def = field_def?;

    let field_type = field_def.field_type.clone();
    let is_non_null = field_type.is_non_null();

    let args = match coerce_argument_values(field_def, node, &ctx.variables) {
        Ok(args) => args,
        Err(error) => {
            let located = located_error(error, field_nodes, &path);
            return Some(MaybeAsync::Ready(handle_field_error(
                located,
                is_non_null,
                errors,
            )));
        }
    };

    let info = Arc::new(ResolveInfo {
        field_name: field_name.to_owned(),
        field_nodes: Arc::clone(field_nodes),
        return_type: field_type.clone(),
        parent_type: parent_type.name().to_owned(),
        path: path.clone(),
        ctx: Arc::clone(ctx),
    });

    let resolver = field_def
        .resolver
        .clone()
        .unwrap_or_else(|| Arc::clone(&ctx.field_resolver));
    let resolved = resolver(&source, &args, &ctx.context_value, &info);

    let completion = match resolved {
        MaybeAsync::Ready(Ok(raw)) => {
            complete_value(ctx, &field_type, field_nodes, &info, &path, raw, errors)
        }
        MaybeAsync::Ready(Err(error)) => {
            MaybeAsync::Ready(Err(located_error(error, field_nodes, &path)))
        }
        MaybeAsync::Pending(fut) => {
            let ctx = Arc::clone(ctx);
            let field_type = field_type.clone();
            let field_nodes = Arc::clone(field_nodes);
            let info = Arc::clone(&info);
            let path = path.clone();
            let errors = Arc::clone(errors);
            MaybeAsync::pending(async move {
                match fut.await {
                    Ok(raw) => {
                        complete_value(&ctx, &field_type, &field_nodes, &info, &path, raw, &errors)
                            .await
                    }
                    Err(error) => Err(located_error(error, &field_nodes, &path)),
                }
            })
        }
    };

    let sink = Arc::clone(errors);
    Some(completion.map(move |result| match result {
        Ok(value) => Ok(value),
        Err(error) => handle_field_error(error, is_non_null, &sink),
    }))
}

/// Coerces the field's arguments against its definition and the variable
/// scope.
pub(crate) fn coerce_argument_values(
    field_def: &FieldDef,
    node: &FieldNode,
    variables: &Variables,
) -> Result<Arguments, FieldError> {
    let mut coerced = IndexMap::new();
    let Some(arg_defs) = &field_def.arguments else {
        return Ok(Arguments::new(coerced));
    };

    for def in arg_defs {
        let provided = node
            .item
            .arguments
            .as_ref()
            .and_then(|args| args.item.get(&def.name));

        match provided {
            None => {
                if let Some(default) = &def.default_value {
                    coerced.insert(def.name.clone(), default.clone());
                } else if def.arg_type.is_non_null() {
                    return Err(format!(
                        "Argument \"{}\" of required type \"{}\" was not provided.",
                        def.name, def.arg_type,
                    )
                    .into());
                }
            }
            Some(value) => match &value.item {
                InputValue::Variable(var_name) => match variables.get(var_name) {
                    Some(var_value) if var_value.is_null() => {
                        if def.arg_type.is_non_null() {
                            return Err(format!(
                                "Argument \"{}\" of non-null type \"{}\" must not be null.",
                                def.name, def.arg_type,
                            )
                            .into());
                        }
                        coerced.insert(def.name.clone(), InputValue::Null);
                    }
                    Some(var_value) => {
                        coerced.insert(def.name.clone(), var_value.clone());
                    }
                    None => {
                        if let Some(default) = &def.default_value {
                            coerced.insert(def.name.clone(), default.clone());
                        } else if def.arg_type.is_non_null() {
                            return Err(format!(
                                "Argument \"{}\" of required type \"{}\" was provided the \
                                 variable \"${var_name}\" which was not provided a runtime value.",
                                def.name, def.arg_type,
                            )
                            .into());
                        }
                    }
                },
                value_item if value_item.is_null() && def.arg_type.is_non_null() => {
                    return Err(format!(
                        "Argument \"{}\" of non-null type \"{}\" must not be null.",
                        def.name, def.arg_type,
                    )
                    .into());
                }
                value_item => {
                    coerced.insert(def.name.clone(), value_item.clone().into_const(variables));
                }
            },
        }
    }

    Ok(Arguments::new(coerced))
}

/// Attaches the failing field's source location and response path to an
/// error.
pub(crate) fn located_error(
    error: FieldError,
    field_nodes: &[FieldNode],
    path: &ResponsePath,
) -> ExecutionError {
    let location = field_nodes
        .first()
        .map(|n| n.span.start)
        .unwrap_or_default();
    ExecutionError::new(location, path, error)
}

/// The single source of truth for null bubbling.
///
/// Under a non-`null` type the error is re-raised so it reaches the nearest
/// nullable ancestor; otherwise it is recorded and the position becomes
/// `null`.
pub(crate) fn handle_field_error(
    error: ExecutionError,
    is_non_null: bool,
    errors: &ErrorSink,
) -> Result<Value, ExecutionError> {
    if is_non_null {
        return Err(error);
    }
    tracing::debug!(message = error.error().message(), "field resolved to error");
    errors.write().unwrap().push(error);
    Ok(Value::Null)
}

/// Completes a raw resolver value against the field's declared output type.
pub(crate) fn complete_value(
    ctx: &Arc<ExecutionContext>,
    return_type: &Type,
    field_nodes: &Arc<Vec<FieldNode>>,
    info: &Arc<ResolveInfo>,
    path: &ResponsePath,
    resolved: ResolvedValue,
    errors: &ErrorSink,
) -> Completion {
    match return_type.modifier() {
        Some(TypeModifier::NonNull) => {
            let inner = return_type.inner();
            let completed = complete_value(ctx, &inner, field_nodes, info, path, resolved, errors);

            let parent_type = info.parent_type.clone();
            let field_name = info.field_name.clone();
            let location = field_nodes[0].span.start;
            let path = path.clone();
            completed.map(move |result| match result {
                Ok(Value::Null) => Err(ExecutionError::new(
                    location,
                    &path,
                    format!(
                        "Cannot return null for non-nullable field {parent_type}.{field_name}.",
                    )
                    .into(),
                )),
                other => other,
            })
        }

        _ if resolved.is_null() => MaybeAsync::Ready(Ok(Value::Null)),

        Some(TypeModifier::List) => {
            let item_type = return_type.inner();
            match resolved {
                ResolvedValue::Stream(source) => {
                    complete_stream_value(ctx, item_type, field_nodes, info, path, source, errors)
                }
                ResolvedValue::List(items) => {
                    complete_list_value(ctx, item_type, field_nodes, info, path, items, errors)
                }
                _ => MaybeAsync::Ready(Err(located_error(
                    format!(
                        "Expected Iterable, but did not find one for field \"{}.{}\".",
                        info.parent_type, info.field_name,
                    )
                    .into(),
                    field_nodes,
                    path,
                ))),
            }
        }

        None => {
            let Some(meta) = ctx.schema.type_by_name(return_type.innermost_name()) else {
                return MaybeAsync::Ready(Err(located_error(
                    format!(
                        "Cannot complete value of unknown type \"{}\".",
                        return_type.innermost_name(),
                    )
                    .into(),
                    field_nodes,
                    path,
                )));
            };
            let meta = Arc::clone(meta);

            match meta.as_ref() {
                MetaType::Scalar(_) | MetaType::Enum(_) => {
                    complete_leaf_value(&meta, field_nodes, path, resolved)
                }
                MetaType::Object(_) => {
                    complete_object_value(ctx, meta.clone(), field_nodes, info, path, resolved, errors)
                }
                MetaType::Interface(_) | MetaType::Union(_) => {
                    complete_abstract_value(ctx, meta.clone(), field_nodes, info, path, resolved, errors)
                }
            }
        }
    }
}

/// Serializes a raw value through a scalar or enum type.
///
/// Leaf serialization must be total for non-`null` inputs; a rejected value
/// is a field error.
fn complete_leaf_value(
    meta: &MetaType,
    field_nodes: &[FieldNode],
    path: &ResponsePath,
    resolved: ResolvedValue,
) -> Completion {
    match meta.serialize_leaf(&resolved) {
        Some(value) => MaybeAsync::Ready(Ok(value)),
        None => MaybeAsync::Ready(Err(located_error(
            format!(
                "Expected a value of type \"{}\" but received: {resolved:?}",
                meta.name(),
            )
            .into(),
            field_nodes,
            path,
        ))),
    }
}

/// Completes the elements of a finite list, handing indices at and past an
/// active `@stream`'s `initialCount` to the dispatcher.
fn complete_list_value(
    ctx: &Arc<ExecutionContext>,
    item_type: Type,
    field_nodes: &Arc<Vec<FieldNode>>,
    info: &Arc<ResolveInfo>,
    path: &ResponsePath,
    items: Vec<ResolvedValue>,
    errors: &ErrorSink,
) -> Completion {
    let stream = match stream_directive(&field_nodes[0], &ctx.variables) {
        Ok(stream) => stream,
        Err(error) => {
            return MaybeAsync::Ready(Err(located_error(error, field_nodes, path)));
        }
    };

    let item_is_non_null = item_type.is_non_null();
    let mut completed = Vec::with_capacity(items.len());

    for (index, item) in items.into_iter().enumerate() {
        let item_path = path.append_index(index);

        if let Some(stream) = &stream {
            if index >= stream.initial_count {
                incremental::add_value(
                    ctx,
                    item_path,
                    item,
                    Arc::clone(field_nodes),
                    Arc::clone(info),
                    item_type.clone(),
                    stream.label.clone(),
                );
                continue;
            }
        }

        let completion = complete_value(ctx, &item_type, field_nodes, info, &item_path, item, errors);
        let sink = Arc::clone(errors);
        completed.push(completion.map(move |result| match result {
            Ok(value) => Ok(value),
            Err(error) => handle_field_error(error, item_is_non_null, &sink),
        }));
    }

    MaybeAsync::all(completed).map(|results| {
        let mut values = Vec::with_capacity(results.len());
        for result in results {
            values.push(result?);
        }
        Ok(Value::List(values))
    })
}

/// Completes a resolver-provided asynchronous sequence.
///
/// Inline pulling stops at an active `@stream`'s `initialCount`; the
/// dispatcher keeps pulling the rest. One failing element terminates the
/// inline portion with whatever accumulated before it.
fn complete_stream_value(
    ctx: &Arc<ExecutionContext>,
    item_type: Type,
    field_nodes: &Arc<Vec<FieldNode>>,
    info: &Arc<ResolveInfo>,
    path: &ResponsePath,
    source: StreamSource,
    errors: &ErrorSink,
) -> Completion {
    let stream_args = match stream_directive(&field_nodes[0], &ctx.variables) {
        Ok(args) => args,
        Err(error) => {
            return MaybeAsync::Ready(Err(located_error(error, field_nodes, path)));
        }
    };

    let Some(mut stream) = source.take() else {
        return MaybeAsync::Ready(Err(located_error(
            format!(
                "Async stream for field \"{}.{}\" has already been consumed.",
                info.parent_type, info.field_name,
            )
            .into(),
            field_nodes,
            path,
        )));
    };

    // With nothing to inline, the field resolves synchronously to an empty
    // list and the dispatcher owns the sequence from the start.
    if let Some(args) = &stream_args {
        if args.initial_count == 0 {
            incremental::add_async_stream_value(
                ctx,
                0,
                stream,
                Arc::clone(field_nodes),
                Arc::clone(info),
                item_type,
                path.clone(),
                args.label.clone(),
            );
            return MaybeAsync::Ready(Ok(Value::List(Vec::new())));
        }
    }

    let ctx = Arc::clone(ctx);
    let field_nodes = Arc::clone(field_nodes);
    let info = Arc::clone(info);
    let path = path.clone();
    let errors = Arc::clone(errors);
    let item_is_non_null = item_type.is_non_null();

    MaybeAsync::pending(async move {
        let mut completed = Vec::new();
        let mut index = 0;

        loop {
            if let Some(args) = &stream_args {
                if index >= args.initial_count {
                    incremental::add_async_stream_value(
                        &ctx,
                        index,
                        stream,
                        field_nodes,
                        info,
                        item_type,
                        path,
                        args.label.clone(),
                    );
                    break;
                }
            }

            match stream.next().await {
                None => break,
                Some(Ok(item)) => {
                    let item_path = path.append_index(index);
                    match complete_value(
                        &ctx,
                        &item_type,
                        &field_nodes,
                        &info,
                        &item_path,
                        item,
                        &errors,
                    )
                    .await
                    {
                        Ok(value) => completed.push(value),
                        Err(error) => {
                            completed.push(handle_field_error(error, item_is_non_null, &errors)?);
                            break;
                        }
                    }
                }
                Some(Err(error)) => {
                    let item_path = path.append_index(index);
                    let located = located_error(error, &field_nodes, &item_path);
                    completed.push(handle_field_error(located, item_is_non_null, &errors)?);
                    break;
                }
            }

            index += 1;
        }

        Ok(Value::List(completed))
    })
}

/// Completes a value of interface or union type by resolving its concrete
/// runtime type first.
fn complete_abstract_value(
    ctx: &Arc<ExecutionContext>,
    abstract_type: Arc<MetaType>,
    field_nodes: &Arc<Vec<FieldNode>>,
    info: &Arc<ResolveInfo>,
    path: &ResponsePath,
    resolved: ResolvedValue,
    errors: &ErrorSink,
) -> Completion {
    let type_name = match abstract_type.resolve_type_fn() {
        Some(resolve_type) => resolve_type(&resolved, &ctx.context_value, info, abstract_type.name()),
        None => (ctx.type_resolver)(&resolved, &ctx.context_value, info, abstract_type.name()),
    };

    let ctx = Arc::clone(ctx);
    let field_nodes = Arc::clone(field_nodes);
    let info = Arc::clone(info);
    let path = path.clone();
    let errors = Arc::clone(errors);

    type_name.and_then(move |result| match result {
        Err(error) => MaybeAsync::Ready(Err(located_error(error, &field_nodes, &path))),
        Ok(name) => {
            match ensure_valid_runtime_type(&ctx, &name, &abstract_type, &field_nodes, &path) {
                Err(error) => MaybeAsync::Ready(Err(error)),
                Ok(runtime_type) => complete_object_value(
                    &ctx,
                    runtime_type,
                    &field_nodes,
                    &info,
                    &path,
                    resolved,
                    &errors,
                ),
            }
        }
    })
}

/// Validates a resolved runtime type name: it must name a schema type, that
/// type must be an object, and it must be a possible subtype of the abstract
/// type.
fn ensure_valid_runtime_type(
    ctx: &Arc<ExecutionContext>,
    name: &str,
    abstract_type: &MetaType,
    field_nodes: &[FieldNode],
    path: &ResponsePath,
) -> Result<Arc<MetaType>, ExecutionError> {
    let Some(runtime_type) = ctx.schema.type_by_name(name) else {
        return Err(located_error(
            format!(
                "Abstract type \"{}\" was resolved to a type \"{name}\" that does not exist \
                 inside the schema.",
                abstract_type.name(),
            )
            .into(),
            field_nodes,
            path,
        ));
    };

    let MetaType::Object(object) = runtime_type.as_ref() else {
        return Err(located_error(
            format!(
                "Abstract type \"{}\" was resolved to a non-object type \"{name}\".",
                abstract_type.name(),
            )
            .into(),
            field_nodes,
            path,
        ));
    };

    if !ctx.schema.is_possible_type(abstract_type.name(), object) {
        return Err(located_error(
            format!(
                "Runtime Object type \"{name}\" is not a possible type for \"{}\".",
                abstract_type.name(),
            )
            .into(),
            field_nodes,
            path,
        ));
    }

    Ok(Arc::clone(runtime_type))
}

/// Completes a value of object type: runs the type's `is_type_of` guard, then
/// collects and executes its subfields.
fn complete_object_value(
    ctx: &Arc<ExecutionContext>,
    object_type: Arc<MetaType>,
    field_nodes: &Arc<Vec<FieldNode>>,
    info: &Arc<ResolveInfo>,
    path: &ResponsePath,
    resolved: ResolvedValue,
    errors: &ErrorSink,
) -> Completion {
    let is_type_of = match object_type.as_ref() {
        MetaType::Object(object) => object.is_type_of.clone(),
        _ => None,
    };

    let Some(is_type_of) = is_type_of else {
        return collect_and_execute_subfields(ctx, &object_type, field_nodes, path, resolved, errors);
    };

    match is_type_of(&resolved, &ctx.context_value) {
        MaybeAsync::Ready(true) => {
            collect_and_execute_subfields(ctx, &object_type, field_nodes, path, resolved, errors)
        }
        MaybeAsync::Ready(false) => MaybeAsync::Ready(Err(invalid_return_type_error(
            &object_type,
            &resolved,
            field_nodes,
            path,
        ))),
        MaybeAsync::Pending(check) => {
            let ctx = Arc::clone(ctx);
            let field_nodes = Arc::clone(field_nodes);
            let path = path.clone();
            let errors = Arc::clone(errors);
            MaybeAsync::pending(async move {
                if check.await {
                    collect_and_execute_subfields(
                        &ctx,
                        &object_type,
                        &field_nodes,
                        &path,
                        resolved,
                        &errors,
                    )
                    .await
                } else {
                    Err(invalid_return_type_error(
                        &object_type,
                        &resolved,
                        &field_nodes,
                        &path,
                    ))
                }
            })
        }
    }
}

fn invalid_return_type_error(
    object_type: &MetaType,
    resolved: &ResolvedValue,
    field_nodes: &[FieldNode],
    path: &ResponsePath,
) -> ExecutionError {
    located_error(
        format!(
            "Expected value of type \"{}\" but got: {resolved:?}.",
            object_type.name(),
        )
        .into(),
        field_nodes,
        path,
    )
}

/// Collects the object's subfields (memoized per field-node list), executes
/// them in parallel, and registers any deferred sub-patches with the
/// dispatcher.
fn collect_and_execute_subfields(
    ctx: &Arc<ExecutionContext>,
    object_type: &Arc<MetaType>,
    field_nodes: &Arc<Vec<FieldNode>>,
    path: &ResponsePath,
    resolved: ResolvedValue,
    errors: &ErrorSink,
) -> Completion {
    let collected = collect::collect_subfields(ctx, object_type, field_nodes);

    let result = super::execute_fields(
        ctx,
        object_type,
        resolved.clone(),
        path,
        &collected.fields,
        errors,
    );

    for patch in &collected.patches {
        let patch_errors = new_error_sink();
        let value = super::execute_fields(
            ctx,
            object_type,
            resolved.clone(),
            path,
            &patch.fields,
            &patch_errors,
        );
        ctx.dispatcher
            .add_fields(value, patch_errors, patch.label.clone(), path);
    }

    result
}
