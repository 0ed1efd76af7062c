pub(crate) mod async_task;
pub mod convert;
