//! External API integrations

pub mod clock;
pub mod earth_engine;
pub mod expression;
pub mod remote_sensing;
pub mod token;

pub use clock::{Clock, ClockSkewProbe, SystemClock};
pub use earth_engine::EarthEngineClient;
pub use remote_sensing::RemoteSensing;
pub use token::{ServiceAccount, TokenAcquirer, TokenAcquirerConfig};
