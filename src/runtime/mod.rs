//! Execution runtime: values, scopes, loop contexts, output records and the
//! interpreter that runs compiled programs

pub mod builtins;
pub mod errors;
pub mod escape;
pub mod format;
pub mod interp;
pub mod loops;
pub mod methods;
pub mod ops;
pub mod record;
pub mod scope;
pub mod value;

pub use builtins::builtins;
pub use errors::{EvalError, EvalResult};
pub use escape::EscapeMode;
pub use interp::{Flow, Machine, bind_params};
pub use loops::LoopContext;
pub use record::OutputRecord;
pub use scope::Scope;
pub use value::{Args, Object, Value};
