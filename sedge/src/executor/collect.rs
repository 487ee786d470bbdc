//! Grouping of selection sets into executable field sets.
//!
//! Walks selections in source order, evaluates `@skip`/`@include`, matches
//! fragment type conditions against the concrete runtime type, and splits
//! `@defer`red fragments off into patch records instead of inlining them.
//!
//! Per-object subfield collection is memoized by the identity of the grouped
//! field-node list: list completion passes the same list object for every
//! element, so a list of a thousand objects collects its subfields once.

use std::{collections::HashSet, sync::Arc};

use indexmap::IndexMap;

use crate::{
    ast::{Directive, FieldNode, Selection},
    executor::{ExecutionContext, FieldError, Variables},
    parser::Spanning,
    schema::meta::{MetaType, ObjectMeta},
};

/// An ordered mapping from response keys to the merged selection nodes that
/// produce them.
pub(crate) type GroupedFieldSet = IndexMap<String, Arc<Vec<FieldNode>>>;

/// A deferred sub-selection, to be executed out-of-band.
pub(crate) struct PatchFields {
    pub label: Option<String>,
    pub fields: GroupedFieldSet,
}

/// The outcome of collecting one selection set: the inline field groups plus
/// any deferred patches discovered along the way.
pub(crate) struct CollectedFields {
    pub fields: GroupedFieldSet,
    pub patches: Vec<PatchFields>,
}

type FieldBuilder = IndexMap<String, Vec<FieldNode>>;

/// Collects the grouped field set of `selection_set` as seen by the concrete
/// type `runtime_type`.
pub(crate) fn collect_fields(
    ctx: &ExecutionContext,
    runtime_type: &Arc<MetaType>,
    selection_set: &[Selection],
) -> CollectedFields {
    let mut fields = FieldBuilder::new();
    let mut patches = Vec::new();
    let mut visited = HashSet::new();

    if let MetaType::Object(object) = runtime_type.as_ref() {
        collect_fields_into(
            ctx,
            object,
            selection_set,
            &mut visited,
            &mut fields,
            &mut patches,
        );
    }

    finalize(fields, patches)
}

/// Collects the merged subfields of every node in a field group, memoized by
/// `(return type, field-node list)` identity within the context.
pub(crate) fn collect_subfields(
    ctx: &ExecutionContext,
    return_type: &Arc<MetaType>,
    field_nodes: &Arc<Vec<FieldNode>>,
) -> Arc<CollectedFields> {
    let type_key = Arc::as_ptr(return_type) as usize;
    let nodes_key = Arc::as_ptr(field_nodes) as usize;

    let mut memo = ctx.subfields_memo.lock().unwrap();
    let per_type = memo.entry(type_key).or_default();
    if let Some(hit) = per_type.get(&nodes_key) {
        return Arc::clone(hit);
    }

    let mut fields = FieldBuilder::new();
    let mut patches = Vec::new();
    let mut visited = HashSet::new();

    if let MetaType::Object(object) = return_type.as_ref() {
        for node in field_nodes.iter() {
            if let Some(selection_set) = &node.item.selection_set {
                collect_fields_into(
                    ctx,
                    object,
                    selection_set,
                    &mut visited,
                    &mut fields,
                    &mut patches,
                );
            }
        }
    }

    let collected = Arc::new(finalize(fields, patches));
    per_type.insert(nodes_key, Arc::clone(&collected));
    collected
}

fn finalize(fields: FieldBuilder, patches: Vec<(Option<String>, FieldBuilder)>) -> CollectedFields {
    CollectedFields {
        fields: fields
            .into_iter()
            .map(|(k, nodes)| (k, Arc::new(nodes)))
            .collect(),
        patches: patches
            .into_iter()
            .map(|(label, fields)| PatchFields {
                label,
                fields: fields
                    .into_iter()
                    .map(|(k, nodes)| (k, Arc::new(nodes)))
                    .collect(),
            })
            .collect(),
    }
}

fn collect_fields_into(
    ctx: &ExecutionContext,
    runtime_type: &ObjectMeta,
    selection_set: &[Selection],
    visited: &mut HashSet<String>,
    fields: &mut FieldBuilder,
    patches: &mut Vec<(Option<String>, FieldBuilder)>,
) {
    let vars = &ctx.variables;
    for selection in selection_set {
        match selection {
            Selection::Field(node) => {
                if is_excluded(&node.item.directives, vars) {
                    continue;
                }
                fields
                    .entry(node.item.response_name().to_owned())
                    .or_default()
                    .push(Arc::clone(node));
            }

            Selection::FragmentSpread(Spanning { item: spread, .. }) => {
                if is_excluded(&spread.directives, vars) {
                    continue;
                }
                let deferred = defer_label(&spread.directives, vars);
                if deferred.is_none() && visited.contains(&spread.name.item) {
                    continue;
                }
                visited.insert(spread.name.item.clone());

                let Some(fragment) = ctx.fragments.get(&spread.name.item) else {
                    continue;
                };
                if !ctx
                    .schema
                    .fragment_condition_matches(&fragment.type_condition.item, runtime_type)
                {
                    continue;
                }

                match deferred {
                    Some(label) => {
                        let mut patch_fields = FieldBuilder::new();
                        collect_fields_into(
                            ctx,
                            runtime_type,
                            &fragment.selection_set,
                            visited,
                            &mut patch_fields,
                            patches,
                        );
                        patches.push((label, patch_fields));
                    }
                    None => collect_fields_into(
                        ctx,
                        runtime_type,
                        &fragment.selection_set,
                        visited,
                        fields,
                        patches,
                    ),
                }
            }

            Selection::InlineFragment(Spanning { item: fragment, .. }) => {
                if is_excluded(&fragment.directives, vars) {
                    continue;
                }
                if let Some(condition) = &fragment.type_condition {
                    if !ctx
                        .schema
                        .fragment_condition_matches(&condition.item, runtime_type)
                    {
                        continue;
                    }
                }

                match defer_label(&fragment.directives, vars) {
                    Some(label) => {
                        let mut patch_fields = FieldBuilder::new();
                        collect_fields_into(
                            ctx,
                            runtime_type,
                            &fragment.selection_set,
                            visited,
                            &mut patch_fields,
                            patches,
                        );
                        patches.push((label, patch_fields));
                    }
                    None => collect_fields_into(
                        ctx,
                        runtime_type,
                        &fragment.selection_set,
                        visited,
                        fields,
                        patches,
                    ),
                }
            }
        }
    }
}

/// Evaluates `@skip` and `@include` against the variable scope.
fn is_excluded(directives: &Option<Vec<Spanning<Directive>>>, vars: &Variables) -> bool {
    if let Some(directives) = directives {
        for Spanning {
            item: directive, ..
        } in directives
        {
            let condition = directive
                .argument("if", vars)
                .and_then(|v| v.convert::<bool>());

            if (directive.name.item == "skip" && condition == Some(true))
                || (directive.name.item == "include" && condition == Some(false))
            {
                return true;
            }
        }
    }
    false
}

/// Checks for an active `@defer` on a fragment.
///
/// Returns `Some(label)` when the fragment should be split off as a patch;
/// `@defer(if: false)` leaves the fragment inline.
fn defer_label(
    directives: &Option<Vec<Spanning<Directive>>>,
    vars: &Variables,
) -> Option<Option<String>> {
    let directive = directives
        .as_ref()?
        .iter()
        .find(|d| d.item.name.item == "defer")?;

    if directive.item.argument("if", vars).and_then(|v| v.convert()) == Some(false) {
        return None;
    }
    Some(
        directive
            .item
            .argument("label", vars)
            .and_then(|v| v.convert()),
    )
}

/// The parsed arguments of an active `@stream` directive.
pub(crate) struct StreamDirective {
    pub initial_count: usize,
    pub label: Option<String>,
}

/// Checks for an active `@stream` on the first node of a field group.
///
/// Validation guarantees equivalent stream arguments across merged aliases,
/// so only the first node is inspected.
pub(crate) fn stream_directive(
    node: &FieldNode,
    vars: &Variables,
) -> Result<Option<StreamDirective>, FieldError> {
    let Some(directive) = node
        .item
        .directives
        .as_ref()
        .and_then(|ds| ds.iter().find(|d| d.item.name.item == "stream"))
    else {
        return Ok(None);
    };

    if directive.item.argument("if", vars).and_then(|v| v.convert()) == Some(false) {
        return Ok(None);
    }

    let initial_count = directive
        .item
        .argument("initialCount", vars)
        .and_then(|v| v.convert::<i32>())
        .filter(|n| *n >= 0)
        .ok_or_else(|| FieldError::from("initialCount must be a positive integer"))?;

    Ok(Some(StreamDirective {
        initial_count: initial_count as usize,
        label: directive
            .item
            .argument("label", vars)
            .and_then(|v| v.convert()),
    }))
}
