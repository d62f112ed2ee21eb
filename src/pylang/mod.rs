//! Python analyses: statement-level control flow, sub-expression control
//! flow and intraprocedural data flow.

pub mod cfg;
pub mod dataflow;

pub use cfg::{ControlFlowVisitor, SubControlFlowVisitor};
pub use dataflow::DataFlowVisitor;
