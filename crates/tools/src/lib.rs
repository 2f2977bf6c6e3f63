//! Tool implementations for websage.
//!
//! The agent has exactly one capability: searching the web. Tools are
//! registered in a [`ToolRegistry`] and made available to the agent loop.

pub mod web_search;

pub use web_search::WebSearchTool;

use websage_core::tool::ToolRegistry;

/// Create the default tool registry.
pub fn default_registry(max_results: usize) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(
        WebSearchTool::new().with_max_results(max_results),
    ));
    registry
}
