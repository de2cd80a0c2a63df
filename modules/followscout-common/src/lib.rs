pub mod config;
pub mod error;
pub mod types;

pub use config::{
    load_file_config, Config, DelayRange, FileConfig, HarvestConfig, HourlyLimitPolicy,
    ThrottleConfig,
};
pub use error::FollowScoutError;
pub use types::*;
