//! Addressing facade: system, module and status-variable handles.

pub mod module;
pub mod status_variable;
pub mod system;

pub use module::ModuleBinding;
pub use status_variable::{BindingCounts, BindingGuard, PendingOp, VariableBinding};
pub use system::{parse_module_id, SystemBinding};
