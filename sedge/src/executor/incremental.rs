//! Queuing and delivery of incremental payloads.
//!
//! Deferred fragments and streamed list tails become *patch tasks*: futures
//! that settle into an out-of-band payload. The dispatcher accumulates them
//! during execution; the response stream races whatever is outstanding and
//! emits payloads in completion order, finishing with a `hasNext: false`
//! marker once the queue runs dry.

use std::{
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex},
    task::{Context, Poll},
};

use futures::{future::BoxFuture, stream::Stream, StreamExt as _};

use crate::{
    ast::{FieldNode, Type},
    executor::{
        complete, drain_errors, new_error_sink, AsyncExecutionResult, Completion, ErrorSink,
        ExecutionContext, ExecutionPatchResult, ExecutionResult, ResponsePath,
    },
    resolver::{ResolveInfo, ResolvedStream, ResolvedValue},
    value::Value,
};

/// A queued unit of incremental work.
///
/// `payload` is absent for bookkeeping completions that deliver nothing, e.g.
/// an exhausted stream reporting its end. `followup` is the pipelined
/// continuation a stream pull schedules for the next element.
pub(crate) struct PatchItem {
    pub payload: Option<ExecutionPatchResult>,
    pub followup: Option<PatchTask>,
}

pub(crate) type PatchTask = BoxFuture<'static, PatchItem>;

/// The per-request queue of outstanding patch tasks.
///
/// Append-only until the response stream drains it; emission order is decided
/// by the race in [`ResponseStream`], not by submission order.
pub(crate) struct Dispatcher {
    pending: Mutex<Vec<PatchTask>>,
}

impl Dispatcher {
    pub(crate) fn new() -> Self {
        Self {
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Whether any incremental work is outstanding.
    pub(crate) fn has_pending(&self) -> bool {
        !self.pending.lock().unwrap().is_empty()
    }

    fn enqueue(&self, task: PatchTask) {
        self.pending.lock().unwrap().push(task);
    }

    pub(crate) fn drain(&self) -> Vec<PatchTask> {
        std::mem::take(&mut *self.pending.lock().unwrap())
    }

    /// Schedules a patch wrapping an already-launched field-set execution,
    /// i.e. a `@defer`red fragment.
    pub(crate) fn add_fields(
        &self,
        value: Completion,
        errors: ErrorSink,
        label: Option<String>,
        path: &ResponsePath,
    ) {
        let path = path.linearize();
        self.enqueue(Box::pin(async move {
            let data = match value.await {
                Ok(value) => value,
                Err(error) => {
                    errors.write().unwrap().push(error);
                    Value::Null
                }
            };
            tracing::trace!(?path, "deferred patch completed");
            PatchItem {
                payload: Some(ExecutionPatchResult {
                    data: Some(data),
                    path,
                    label,
                    errors: drain_errors(&errors),
                    has_next: true,
                    extensions: None,
                }),
                followup: None,
            }
        }));
    }
}

/// Schedules completion of a single raw list element as its own patch, i.e.
/// one `@stream`ed element of a finite list.
pub(crate) fn add_value(
    ctx: &Arc<ExecutionContext>,
    item_path: ResponsePath,
    item: ResolvedValue,
    field_nodes: Arc<Vec<FieldNode>>,
    info: Arc<ResolveInfo>,
    item_type: Type,
    label: Option<String>,
) {
    let task_ctx = Arc::clone(ctx);
    ctx.dispatcher.enqueue(Box::pin(async move {
        let errors = new_error_sink();
        let data = match complete::complete_value(
            &task_ctx,
            &item_type,
            &field_nodes,
            &info,
            &item_path,
            item,
            &errors,
        )
        .await
        {
            Ok(value) => value,
            Err(error) => {
                errors.write().unwrap().push(error);
                Value::Null
            }
        };
        PatchItem {
            payload: Some(ExecutionPatchResult {
                data: Some(data),
                path: item_path.linearize(),
                label,
                errors: drain_errors(&errors),
                has_next: true,
                extensions: None,
            }),
            followup: None,
        }
    }));
}

/// Schedules pulling of an asynchronous sequence from `start_index` on.
///
/// Each successful pull emits its element as a patch and schedules the next
/// pull; when the sequence reports its end, no further pulls are scheduled.
#[allow(clippy::too_many_arguments)]
pub(crate) fn add_async_stream_value(
    ctx: &Arc<ExecutionContext>,
    start_index: usize,
    stream: ResolvedStream,
    field_nodes: Arc<Vec<FieldNode>>,
    info: Arc<ResolveInfo>,
    item_type: Type,
    path: ResponsePath,
    label: Option<String>,
) {
    let task = stream_pull(
        Arc::clone(ctx),
        start_index,
        stream,
        field_nodes,
        info,
        item_type,
        path,
        label,
    );
    ctx.dispatcher.enqueue(task);
}

#[allow(clippy::too_many_arguments)]
fn stream_pull(
    ctx: Arc<ExecutionContext>,
    index: usize,
    mut stream: ResolvedStream,
    field_nodes: Arc<Vec<FieldNode>>,
    info: Arc<ResolveInfo>,
    item_type: Type,
    path: ResponsePath,
    label: Option<String>,
) -> PatchTask {
    Box::pin(async move {
        match stream.next().await {
            None => PatchItem {
                payload: None,
                followup: None,
            },
            Some(pulled) => {
                let item_path = path.append_index(index);
                let errors = new_error_sink();

                let completed = match pulled {
                    Ok(item) => {
                        complete::complete_value(
                            &ctx,
                            &item_type,
                            &field_nodes,
                            &info,
                            &item_path,
                            item,
                            &errors,
                        )
                        .await
                    }
                    Err(error) => Err(complete::located_error(error, &field_nodes, &item_path)),
                };

                let (data, exhausted) = match completed {
                    Ok(value) => (value, false),
                    Err(error) => {
                        errors.write().unwrap().push(error);
                        (Value::Null, true)
                    }
                };

                let payload = ExecutionPatchResult {
                    data: Some(data),
                    path: item_path.linearize(),
                    label: label.clone(),
                    errors: drain_errors(&errors),
                    has_next: true,
                    extensions: None,
                };
                let followup = (!exhausted).then(|| {
                    stream_pull(
                        ctx,
                        index + 1,
                        stream,
                        field_nodes,
                        info,
                        item_type,
                        path,
                        label,
                    )
                });
                PatchItem {
                    payload: Some(payload),
                    followup,
                }
            }
        }
    })
}

/// The asynchronous sequence of results an incremental execution delivers.
///
/// The first item is the initial result with `hasNext: true`; every later
/// item is whichever outstanding patch settles first. The winning task is
/// removed from the race by identity before its payload is read, and its
/// pipelined continuation (if any) joins the race. The terminal
/// `{hasNext: false}` marker is itself outstanding work, so every real patch
/// carries `hasNext: true` and a final bare payload ends the sequence once
/// the queue runs dry.
pub struct ResponseStream {
    ctx: Arc<ExecutionContext>,
    initial: Option<ExecutionResult>,
    racing: Vec<PatchTask>,
    done: bool,
}

impl ResponseStream {
    pub(crate) fn new(ctx: Arc<ExecutionContext>, initial: ExecutionResult) -> Self {
        Self {
            ctx,
            initial: Some(initial),
            racing: Vec::new(),
            done: false,
        }
    }

    fn adopt_pending(&mut self) {
        self.racing.append(&mut self.ctx.dispatcher.drain());
    }

    /// Polls every outstanding task in queue order; the first ready one wins
    /// the race and is spliced out by position.
    fn race(&mut self, cx: &mut Context<'_>) -> Poll<PatchItem> {
        let mut winner = None;
        for (index, task) in self.racing.iter_mut().enumerate() {
            if let Poll::Ready(item) = task.as_mut().poll(cx) {
                winner = Some((index, item));
                break;
            }
        }
        match winner {
            Some((index, item)) => {
                self.racing.remove(index);
                Poll::Ready(item)
            }
            None => Poll::Pending,
        }
    }
}

impl Stream for ResponseStream {
    type Item = AsyncExecutionResult;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if this.done {
            return Poll::Ready(None);
        }
        this.adopt_pending();

        if let Some(mut initial) = this.initial.take() {
            initial.has_next = Some(true);
            return Poll::Ready(Some(AsyncExecutionResult::Result(initial)));
        }

        loop {
            if this.racing.is_empty() {
                this.done = true;
                return Poll::Ready(Some(AsyncExecutionResult::Result(
                    ExecutionResult::terminal(),
                )));
            }

            match this.race(cx) {
                Poll::Ready(item) => {
                    if let Some(followup) = item.followup {
                        this.racing.push(followup);
                    }
                    // Completing a patch may itself have registered nested
                    // patches.
                    this.adopt_pending();

                    if let Some(payload) = item.payload {
                        tracing::trace!(path = ?payload.path, "emitting patch");
                        return Poll::Ready(Some(AsyncExecutionResult::Patch(payload)));
                    }
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
