pub mod blocklist;
pub mod config;
pub mod limits;
pub mod run;
pub mod user;

/// Runtime for commands that talk to the API.
pub(crate) fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Runtime::new()?)
}
