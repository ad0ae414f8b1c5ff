pub mod bus;
pub mod flow;
pub mod node;
pub mod time_grid;

pub use bus::*;
pub use flow::*;
pub use node::*;
pub use time_grid::*;
