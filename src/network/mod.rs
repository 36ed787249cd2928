pub mod model;
pub mod network;
pub mod spec;

pub use model::{Mode, Model, ModelState, ParamMut};
pub use network::Network;
pub use spec::NetworkSpec;
