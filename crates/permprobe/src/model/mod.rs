pub mod case;
pub mod config;
pub mod ids;
pub mod permission;
pub mod run;

pub use case::*;
pub use config::*;
pub use ids::{RunId, SessionId};
pub use permission::*;
pub use run::*;
