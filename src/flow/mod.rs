//! Flow editing and addressing: aliases, templates, graph store, layout and plugins.

pub mod alias;
pub mod editor;
pub mod graph;
pub mod layout;
pub mod plugins;
pub mod template;

pub use alias::{AliasRegistry, LOOP_SEGMENT};
pub use editor::FlowEditor;
pub use graph::FlowGraph;
pub use layout::{LayoutDirection, layout};
pub use template::{TemplateRef, TemplateScope, TemplateValidation};
