//! Tool catalog, dispatch and the built-in editor tools

mod dispatcher;
mod editor;
mod registry;

pub use dispatcher::{DispatchError, ToolDispatcher, ToolInvocation};
pub use editor::{EditorTool, default_registry};
pub use registry::{ParamType, Parameter, ToolDefinition, ToolHandler, ToolRegistry, ToolSpec};
