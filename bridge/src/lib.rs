pub mod http;
pub mod mqtt;
pub mod relay;
pub mod room;
pub mod sensor;
pub mod store;
pub mod supervisor;
pub mod telemetry;
pub mod weather;

mod daemon;

pub use daemon::run;
