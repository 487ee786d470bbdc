/*!

# sedge

*sedge* is the query execution core of a GraphQL runtime: given a validated
schema, a parsed operation document, variable bindings, and a root value, it
produces the response tree shaped by the operation's selection set.

It resolves fields through synchronous or asynchronous resolvers, completes
values according to their declared output type (non-`null`, list, scalar/enum,
interface/union, object) with precise null-bubbling, and delivers
`@defer`red / `@stream`ed selections as an asynchronous sequence of
incremental payloads.

sedge does not parse or validate documents, construct schemas, or speak any
transport. Those live in sibling crates; this one consumes their output
through the [`ast`] and [`schema`] modules.

## Execution

```rust
use std::sync::Arc;

use sedge::{
    ast::{self, Type},
    graphql_value,
    meta::{Field, ObjectMeta},
    execute_sync, ExecutionArgs, ObjectSource, Schema,
};

let schema = Arc::new(Schema::new(ObjectMeta::new(
    "Query",
    vec![Field::new("hello", Type::named("String"))],
)));

let document = vec![ast::Definition::operation(ast::Operation::query(vec![
    ast::Selection::field(ast::Field::new("hello")),
]))];

let root = ObjectSource::new().property("hello", "world");

let result = execute_sync(
    ExecutionArgs::new(schema, document).root_value(root),
)
.unwrap();

assert_eq!(result.data, Some(graphql_value!({"hello": "world"})));
```

An operation whose resolvers all answer synchronously completes without
scheduling a single task; [`execute_sync`] turns any violation of that
guarantee into an error instead of a response.

*/
#![warn(missing_docs)]

use std::fmt;

#[macro_use]
pub mod value;
pub mod ast;
mod executor;
mod maybe_async;
pub mod parser;
mod resolver;
pub mod schema;

#[cfg(test)]
mod executor_tests;

pub use crate::{
    ast::{Document, FromInputValue, InputValue},
    executor::{
        Arguments, AsyncExecutionResult, ExecutionArgs, ExecutionContext, ExecutionError,
        ExecutionOutcome, ExecutionPatchResult, ExecutionResult, FieldError, FieldResult,
        PathSegment, ResponsePath, ResponseStream, Variables,
    },
    maybe_async::MaybeAsync,
    resolver::{
        default_field_resolver, default_type_resolver, ContextValue, FieldResolverFn, IsTypeOfFn,
        ObjectSource, Property, PropertyFn, ResolveInfo, ResolvedStream, ResolvedValue,
        ResolverResult, StreamSource, TypeResolverFn,
    },
    schema::{meta, Schema},
    value::{Object, ScalarValue, Value},
};

/// An error that prevented query execution at the host level.
///
/// Per-field failures are not host errors; they are reported inside the
/// response. This type covers the contract violations a caller must handle
/// out-of-band.
#[derive(Debug, Eq, PartialEq)]
pub enum GraphQLError {
    /// [`execute_sync`] was called, but at least one resolver suspended or
    /// the operation requires incremental delivery.
    NotSynchronous,
}

impl fmt::Display for GraphQLError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotSynchronous => f.write_str("GraphQL execution failed to complete synchronously."),
        }
    }
}

impl std::error::Error for GraphQLError {}

/// Executes a validated operation against a schema.
///
/// The result is ready when no resolver suspended. When the operation
/// contains active `@defer`/`@stream` selections, the outcome is an
/// asynchronous sequence: the initial result first, incremental patches after
/// it, in completion order.
pub fn execute(args: ExecutionArgs) -> MaybeAsync<ExecutionOutcome> {
    executor::execute_request(args)
}

/// Executes a validated operation, requiring a synchronous answer.
///
/// Fails with [`GraphQLError::NotSynchronous`] whenever [`execute`] would
/// have returned a pending result or an incremental sequence.
pub fn execute_sync(args: ExecutionArgs) -> Result<ExecutionResult, GraphQLError> {
    match execute(args) {
        MaybeAsync::Ready(ExecutionOutcome::Single(result)) => Ok(result),
        MaybeAsync::Ready(ExecutionOutcome::Incremental(_)) | MaybeAsync::Pending(_) => {
            Err(GraphQLError::NotSynchronous)
        }
    }
}
