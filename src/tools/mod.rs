/// Tool Plugins
///
/// Each submodule exposes a `tool() -> Arc<dyn Tool>` constructor. Plugins
/// are registered against the Foundation at startup (see `main.rs`); the
/// Registry and protocol handlers never depend on a specific plugin.
pub mod browser_navigate;
pub mod echo;
