pub mod dispatcher;
pub mod model;
pub mod program;
pub mod results;
pub mod solver;

pub use dispatcher::*;
pub use model::*;
pub use program::*;
pub use results::*;
pub use solver::*;
