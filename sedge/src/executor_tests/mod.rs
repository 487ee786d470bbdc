mod executor;
mod incremental;
