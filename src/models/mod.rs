pub mod migration;
pub mod note;
pub mod settings;

pub use migration::*;
pub use note::*;
pub use settings::*;
