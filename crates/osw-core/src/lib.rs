pub mod ids;
pub mod lane;
pub mod plan;
pub mod run;
pub mod semver;
pub mod stage;

pub use ids::*;
pub use lane::*;
pub use plan::*;
pub use run::*;
pub use semver::*;
pub use stage::*;
