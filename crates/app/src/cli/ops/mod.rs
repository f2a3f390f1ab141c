pub mod health;
pub mod init;
pub mod migrate;
pub mod plan;
pub mod version;

pub use health::Health;
pub use init::Init;
pub use migrate::Migrate;
pub use plan::Plan;
pub use version::Version;
